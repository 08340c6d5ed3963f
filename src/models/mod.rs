//! Planning domain models.
//!
//! Core data types for project-planning state: the schedule tree,
//! resource allocations and their day assignments, the resource and
//! criterion catalog surface, calendars, orders with their
//! work-breakdown elements, and the scenario/version pair that scopes
//! scheduling facts to a timeline branch.
//!
//! # Domain Mappings
//!
//! | u-plan | Project planning | Manufacturing |
//! |--------|-----------------|---------------|
//! | Order | Project | Production order |
//! | TaskElement | Schedule node | Routing step |
//! | ResourceAllocation | Staffing decision | Machine booking |
//! | Scenario | What-if timeline | Plan revision |

mod allocation;
mod calendar;
mod order;
mod resource;
mod scenario;
mod task;

pub use allocation::{
    AllocationKind, AssignmentFunction, DayAssignment, DerivedAllocation, ResourceAllocation,
    Stretch, StretchesFunction,
};
pub use calendar::{Calendar, DateWindow};
pub use order::{Label, Order, OrderElement, TaskSource, VersionInfo};
pub use resource::{Criterion, CriterionSatisfaction, Resource, ResourceCatalog};
pub use scenario::{OrderVersion, Scenario};
pub use task::{
    just_tasks, Dependency, DependencyIndex, DependencyKind, Task, TaskElement, TaskGroup,
    TaskMilestone,
};

/// Generates a fresh entity identity.
pub(crate) fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
