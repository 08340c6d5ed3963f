//! Planning-state and scenario-versioning engine for project planning.
//!
//! Builds fully materialized planning sessions over a project order and
//! keeps scheduling facts versioned per scenario: scenarios branch from
//! one another, share an order's data until they first change it, and
//! fork a private copy-on-write version at that point.
//!
//! # Modules
//!
//! - **`models`**: Domain types — `Order`, `TaskElement`, `Scenario`,
//!   `OrderVersion`, `Resource`, `ResourceAllocation`, `Calendar`
//! - **`planning`**: Session lifecycle — `PlanningStateBuilder`,
//!   `PlanningState`, `SessionContext`, scenario-ownership state machine,
//!   task-source synchronization
//! - **`criteria`**: Composable predicates over resource allocations
//! - **`stores`**: Collaborator traits for persistence, plus an
//!   in-memory implementation for tests
//! - **`validation`**: Input integrity checks (duplicate IDs, DAG cycles,
//!   allocation refs)
//! - **`error`**: The crate-wide error taxonomy
//!
//! # Architecture
//!
//! The planning core never reaches a store after construction: a
//! builder loads the order, the resource catalog, and every referenced
//! calendar up front, and a resolve pass verifies the loaded subgraphs
//! are complete. Saves go back through narrow store traits; scenario
//! forks and promotions are handled by the ownership state machine in
//! [`planning::scenario_info`].

pub mod criteria;
pub mod error;
pub mod models;
pub mod planning;
pub mod stores;
pub mod validation;

pub use error::{PlanningError, Result};
pub use planning::{PlanningState, PlanningStateBuilder, SessionContext};
