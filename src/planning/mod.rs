//! Planning-session lifecycle.
//!
//! A planning session is built by [`PlanningStateBuilder`], lives in a
//! [`SessionContext`], and is saved through
//! [`PlanningState::synchronize_trees`]. [`scenario_info`] holds the
//! scenario-ownership state machine; [`sync`] computes and applies the
//! task-source diff a save writes.

pub mod scenario_info;
pub mod state;
pub mod sync;

pub use scenario_info::{AssignmentsOnResource, ScenarioInfo};
pub use state::{
    PlannerConfiguration, PlanningState, PlanningStateBuilder, SaveCommand, SessionContext,
};
pub use sync::{synchronizations_needed, TaskSourcePersistence, TaskSourceSynchronization};
