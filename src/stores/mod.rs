//! External collaborator interfaces.
//!
//! The planning core consumes persistence through these narrow traits
//! and never sees transaction boundaries or mapping details. The
//! materialization contract is explicit: a store hands back fully
//! materialized subgraphs; the resolve pass at planning-state
//! construction verifies completeness instead of probing lazy proxies.
//!
//! [`memory`] provides an in-memory implementation used by this
//! crate's own tests and usable as a test double by consumers.

pub mod memory;

use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    Calendar, Criterion, Order, OrderVersion, Resource, Scenario, TaskElement, TaskSource,
};

/// Resource and criterion catalog access.
pub trait ResourceStore: Send + Sync {
    /// Every resource in the catalog.
    fn list_all_resources(&self) -> Vec<Resource>;
    /// Every criterion in the catalog.
    fn list_all_criteria(&self) -> Vec<Criterion>;
    /// Reattaches a resource to the active persistence session.
    fn reattach_resource(&self, resource: &Resource);
}

/// Order retrieval.
pub trait OrderStore: Send + Sync {
    /// Loads an order with its fully materialized trees.
    fn find_by_id(&self, id: &str) -> Result<Order>;
    /// Whether an order with the given name exists.
    fn exists_by_name(&self, name: &str) -> bool;
    /// Reattaches an order to the active persistence session.
    fn reattach_order(&self, order: &Order);
}

/// Schedule-tree access.
pub trait TaskStore: Send + Sync {
    /// The materialized children of a task group.
    fn find_children_of(&self, group_id: &str) -> Vec<TaskElement>;
    /// Reattaches a tree element to the active persistence session.
    fn reattach_task(&self, element: &TaskElement);
}

/// Task-source persistence.
pub trait TaskSourceStore: Send + Sync {
    /// Writes a task source.
    fn persist(&self, source: &TaskSource);
    /// Deletes a task source.
    fn remove(&self, source_id: &str);
    /// Reattaches a task source to the active persistence session.
    fn reattach_source(&self, source: &TaskSource);
}

/// Scenario tree access.
pub trait ScenarioStore: Send + Sync {
    /// The caller's current scenario.
    fn current(&self) -> Scenario;
    /// Repoints scenarios derived from `scenario_id` at `new_version`.
    ///
    /// With `previous_version_id` set, only derived scenarios still on
    /// that version move; with `None` (a brand-new order), derived
    /// scenarios with no version for the order adopt the new one. The
    /// originating scenario's own mapping is published as well.
    fn update_derived_scenarios_with_new_version(
        &self,
        previous_version_id: Option<&str>,
        order_id: &str,
        scenario_id: &str,
        new_version: &OrderVersion,
    );
}

/// Calendar materialization.
pub trait CalendarResolver: Send + Sync {
    /// Loads a calendar's full definition.
    fn resolve(&self, calendar_id: &str) -> Result<Calendar>;
}

/// The collaborator bundle a planning-state builder works against.
#[derive(Clone)]
pub struct Stores {
    /// Resource/criterion catalog.
    pub resources: Arc<dyn ResourceStore>,
    /// Order retrieval.
    pub orders: Arc<dyn OrderStore>,
    /// Schedule-tree access.
    pub tasks: Arc<dyn TaskStore>,
    /// Task-source persistence.
    pub task_sources: Arc<dyn TaskSourceStore>,
    /// Scenario tree access.
    pub scenarios: Arc<dyn ScenarioStore>,
    /// Calendar materialization.
    pub calendars: Arc<dyn CalendarResolver>,
}
