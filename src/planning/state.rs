//! Planning-state construction, caching, and lifecycle.
//!
//! [`PlanningStateBuilder`] loads an order and everything a planning
//! session needs up front: the full schedule tree, every resource with
//! its satisfactions and assignments, and every referenced calendar. A
//! resolve pass verifies the loaded subgraphs are complete so that no
//! later operation has to reach back to a store. [`SessionContext`]
//! carries at most one cached [`PlanningState`] per session, reused
//! across retrievals of the same order and rebuilt for any other.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, info, warn};

use crate::error::{PlanningError, Result};
use crate::models::{
    just_tasks, Calendar, Criterion, Label, Order, Resource, ResourceAllocation, ResourceCatalog,
    Scenario, Task, TaskElement,
};
use crate::criteria::AllocationCriteria;
use crate::planning::scenario_info::{AssignmentsOnResource, ScenarioInfo};
use crate::planning::sync::{self, TaskSourcePersistence, TaskSourceSynchronization};
use crate::stores::Stores;

/// Scheduling parameters derived once from the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfiguration {
    /// Ids of the top-level schedule elements.
    pub initial_task_ids: Vec<String>,
    /// Earliest allowed start, from the order.
    pub not_before: Option<chrono::NaiveDate>,
    /// Latest allowed end, from the order.
    pub not_after: Option<chrono::NaiveDate>,
    /// Whether dependency constraints win over calendar constraints.
    pub dependencies_constraints_have_priority: bool,
    /// Whether scheduling runs backwards from the deadline.
    pub schedule_backwards: bool,
}

/// A prepared save: what a commit of this state would write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveCommand {
    /// The order being saved.
    pub order_id: String,
    /// The scenario the save writes under.
    pub scenario_id: String,
    /// The version the save writes to.
    pub version_id: String,
    /// Task-source synchronizations the save will apply.
    pub pending_synchronizations: usize,
    /// Persisted tree elements queued for deletion.
    pub pending_removals: usize,
}

/// Session-scoped slot holding at most one cached planning state.
#[derive(Default)]
pub struct SessionContext {
    slot: Option<(String, PlanningState)>,
}

impl SessionContext {
    /// An empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached state, if one exists for `order_id`.
    pub fn get(&self, order_id: &str) -> Option<&PlanningState> {
        self.slot
            .as_ref()
            .filter(|(id, _)| id == order_id)
            .map(|(_, state)| state)
    }

    /// The order id currently occupying the slot.
    pub fn occupied_by(&self) -> Option<&str> {
        self.slot.as_ref().map(|(id, _)| id.as_str())
    }

    /// Drops the cached state, forcing the next retrieval to rebuild.
    pub fn clear(&mut self) {
        self.slot = None;
    }
}

/// Builds planning states against a fixed collaborator bundle.
#[derive(Clone)]
pub struct PlanningStateBuilder {
    stores: Stores,
    code_digits: usize,
}

impl PlanningStateBuilder {
    /// A builder over the given stores.
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            code_digits: 4,
        }
    }

    /// Number of digits used when generating order-element codes.
    pub fn with_code_digits(mut self, digits: usize) -> Self {
        self.code_digits = digits;
        self
    }

    /// Loads the order and builds a fresh, fully materialized planning
    /// state bound to the current scenario.
    pub fn create_planning(&self, order_id: &str) -> Result<PlanningState> {
        if order_id.is_empty() {
            return Err(PlanningError::Precondition("order id must not be empty"));
        }
        let mut order = self.stores.orders.find_by_id(order_id)?;
        let current = self.stores.scenarios.current();
        info!(order = %order.id, scenario = %current.id, "creating planning state");

        // A never-versioned order is claimed by the current scenario
        // as owner on the spot.
        if order.has_no_versions() {
            let mut scenario = current.clone();
            let version = scenario.add_order(order.id.clone());
            order.set_version_for_scenario(scenario.id.clone(), version);
            order.use_scheduling_data_for(&scenario);
        } else {
            order.use_scheduling_data_for(&current);
        }

        let calendars = self.resolve_calendars(&order)?;
        let resources = self.stores.resources.list_all_resources();
        let criteria = self.stores.resources.list_all_criteria();
        let mut catalog = ResourceCatalog::new(resources);
        catalog.use_scenario_for_all(&current.id);
        resolve(&order, &catalog, &criteria, &self.stores)?;

        let scenario_info = ScenarioInfo::build(&mut order, &current)?;

        let mut hours = HashMap::new();
        let mut labels: HashMap<String, Vec<Label>> = HashMap::new();
        if let Some(root) = &order.root {
            for element in root.children.iter().flat_map(|c| c.descendants()) {
                let Some(element_id) = element.order_element_id() else {
                    continue;
                };
                if let Some(order_element) = order.find_element(element_id) {
                    hours.insert(element.id().to_string(), order_element.total_work_hours());
                    labels.insert(element.id().to_string(), order_element.labels.clone());
                }
            }
        }

        let initial = order
            .root
            .as_ref()
            .map(|root| root.children.iter().map(|c| c.id().to_string()).collect())
            .unwrap_or_default();

        Ok(PlanningState {
            order,
            catalog,
            calendars,
            criteria,
            scenario_info,
            initial,
            to_remove: Vec::new(),
            hours,
            labels,
            cached_configuration: None,
            cached_save: None,
            code_digits: self.code_digits,
            stores: self.stores.clone(),
        })
    }

    /// Returns the session's cached state for `order_id`, refreshed
    /// in place, or builds and caches a new one.
    ///
    /// A failed build leaves the session slot untouched.
    pub fn retrieve_or_create<'s>(
        &self,
        session: &'s mut SessionContext,
        order_id: &str,
    ) -> Result<&'s mut PlanningState> {
        self.retrieve_or_create_with(session, order_id, |_| {})
    }

    /// Like [`Self::retrieve_or_create`], running `on_retrieval` on
    /// the state (cached or fresh) before handing it back.
    pub fn retrieve_or_create_with<'s>(
        &self,
        session: &'s mut SessionContext,
        order_id: &str,
        on_retrieval: impl FnOnce(&mut PlanningState),
    ) -> Result<&'s mut PlanningState> {
        if order_id.is_empty() {
            return Err(PlanningError::Precondition("order id must not be empty"));
        }
        let cached = session
            .slot
            .as_ref()
            .is_some_and(|(id, _)| id == order_id);
        if !cached {
            debug!(order = %order_id, "no cached planning state, building");
            let state = self.create_planning(order_id)?;
            session.slot = Some((order_id.to_string(), state));
        }
        // The slot is guaranteed occupied by this order now.
        let (_, state) = session
            .slot
            .as_mut()
            .ok_or_else(|| PlanningError::illegal_state("session slot vanished"))?;
        state.on_retrieval();
        on_retrieval(state);
        Ok(state)
    }

    fn resolve_calendars(&self, order: &Order) -> Result<HashMap<String, Calendar>> {
        let mut wanted: HashSet<&str> = HashSet::new();
        if let Some(id) = order.calendar_id.as_deref() {
            wanted.insert(id);
        }
        if let Some(root) = &order.root {
            for element in root.children.iter().flat_map(|c| c.descendants()) {
                if let Some(id) = element.calendar_id() {
                    wanted.insert(id);
                }
            }
        }
        let mut calendars = HashMap::new();
        for id in wanted {
            calendars.insert(id.to_string(), self.stores.calendars.resolve(id)?);
        }
        Ok(calendars)
    }
}

/// Verifies that the loaded subgraphs are complete: every reference the
/// tree carries resolves against what was loaded, and the materialized
/// children of each group match what the store holds.
fn resolve(
    order: &Order,
    catalog: &ResourceCatalog,
    criteria: &[Criterion],
    stores: &Stores,
) -> Result<()> {
    let criterion_ids: HashSet<&str> = criteria.iter().map(|c| c.id.as_str()).collect();
    let root_element = order.associated_task_element();
    let root_element = match &root_element {
        Some(e) => e,
        None => return Ok(()),
    };

    let mut groups = Vec::new();
    for element in root_element.descendants() {
        if let TaskElement::Group(group) = element {
            groups.push((group.id.as_str(), &group.children));
        }
    }
    for (group_id, children) in groups {
        let stored = stores.tasks.find_children_of(group_id);
        let loaded: HashSet<&str> = children.iter().map(|c| c.id()).collect();
        let persisted: HashSet<&str> = stored.iter().map(|c| c.id()).collect();
        if loaded != persisted {
            warn!(group = group_id, "partially materialized task group");
            return Err(PlanningError::illegal_state(format!(
                "task group '{group_id}' is not fully materialized"
            )));
        }
    }

    for element in root_element.descendants() {
        for dependency in element.dependencies() {
            for endpoint in [&dependency.origin_id, &dependency.destination_id] {
                if root_element.find(endpoint).is_none() {
                    return Err(PlanningError::not_found("task", endpoint.clone()));
                }
            }
        }
        let TaskElement::Task(task) = element else {
            continue;
        };
        for allocation in &task.allocations {
            match &allocation.kind {
                crate::models::AllocationKind::Specific { resource_id } => {
                    if !catalog.contains(resource_id) {
                        return Err(PlanningError::not_found("resource", resource_id.clone()));
                    }
                }
                crate::models::AllocationKind::Generic { criteria } => {
                    for criterion_id in criteria {
                        if !criterion_ids.contains(criterion_id.as_str()) {
                            return Err(PlanningError::not_found(
                                "criterion",
                                criterion_id.clone(),
                            ));
                        }
                    }
                }
            }
            for assignment in &allocation.assignments {
                if !catalog.contains(&assignment.resource_id) {
                    return Err(PlanningError::not_found(
                        "resource",
                        assignment.resource_id.clone(),
                    ));
                }
            }
            for derived in &allocation.derived {
                if !catalog.contains(&derived.resource_id) {
                    return Err(PlanningError::not_found(
                        "resource",
                        derived.resource_id.clone(),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// A fully materialized planning session over one order.
///
/// Owns the order (and through it the schedule tree), a snapshot of
/// the resource catalog bound to the current scenario, the resolved
/// calendars, and the scenario binding. No method here reaches back to
/// a store except [`Self::synchronize_trees`], [`Self::reattach`], and
/// [`Self::reassociate_resources_with_session`].
pub struct PlanningState {
    order: Order,
    catalog: ResourceCatalog,
    calendars: HashMap<String, Calendar>,
    criteria: Vec<Criterion>,
    scenario_info: ScenarioInfo,
    initial: Vec<String>,
    to_remove: Vec<TaskElement>,
    hours: HashMap<String, u32>,
    labels: HashMap<String, Vec<Label>>,
    cached_configuration: Option<PlannerConfiguration>,
    cached_save: Option<SaveCommand>,
    code_digits: usize,
    stores: Stores,
}

// Stores holds trait objects, so Debug cannot be derived.
impl fmt::Debug for PlanningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanningState")
            .field("order", &self.order.id)
            .field("scenario", &self.scenario_info.current_scenario().id)
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

impl PlanningState {
    /// The order under planning.
    pub fn order(&self) -> &Order {
        &self.order
    }

    /// Mutable access to the order; invalidates derived caches.
    pub fn order_mut(&mut self) -> &mut Order {
        self.cached_configuration = None;
        self.cached_save = None;
        &mut self.order
    }

    /// Whether the order has no schedule tree at all.
    pub fn is_empty(&self) -> bool {
        self.order.root.is_none()
    }

    /// The top-level schedule elements.
    pub fn initial(&self) -> Vec<&TaskElement> {
        self.order
            .root
            .as_ref()
            .map(|root| root.children.iter().collect())
            .unwrap_or_default()
    }

    /// Every leaf task in the tree, depth first.
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.order
            .root
            .as_ref()
            .map(|root| {
                let elements: Vec<&TaskElement> = root
                    .children
                    .iter()
                    .flat_map(|c| c.descendants())
                    .collect();
                just_tasks(elements)
            })
            .unwrap_or_default()
    }

    /// The scenario binding of this session.
    pub fn scenario_info(&self) -> &ScenarioInfo {
        &self.scenario_info
    }

    /// The scenario the session's edits belong to.
    pub fn current_scenario(&self) -> &Scenario {
        self.scenario_info.current_scenario()
    }

    /// How resource assignments are read back in this session.
    pub fn assignments_calculator(&self) -> &AssignmentsOnResource {
        self.scenario_info.assignments_calculator()
    }

    /// The visible assignments of a resource under this session's
    /// calculator.
    pub fn assignments_for(&self, resource_id: &str) -> Vec<crate::models::DayAssignment> {
        self.catalog
            .get(resource_id)
            .map(|r| self.assignments_calculator().assignments(r))
            .unwrap_or_default()
    }

    /// The resource catalog snapshot.
    pub fn resources(&self) -> &ResourceCatalog {
        &self.catalog
    }

    /// Mutable access to the resource catalog snapshot.
    pub fn resources_mut(&mut self) -> &mut ResourceCatalog {
        &mut self.catalog
    }

    /// The criteria known to this session.
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// A resolved calendar, if the order references it.
    pub fn calendar(&self, calendar_id: &str) -> Option<&Calendar> {
        self.calendars.get(calendar_id)
    }

    /// Total scheduled hours for a tree element, if known.
    pub fn hours_for(&self, task_id: &str) -> Option<u32> {
        self.hours.get(task_id).copied()
    }

    /// Labels of the work-breakdown element a tree element schedules.
    pub fn labels_for(&self, task_id: &str) -> &[Label] {
        self.labels.get(task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Scheduling parameters, computed once per retrieval.
    pub fn configuration(&mut self) -> &PlannerConfiguration {
        if self.cached_configuration.is_none() {
            self.cached_configuration = Some(PlannerConfiguration {
                initial_task_ids: self.initial.clone(),
                not_before: self.order.init_date,
                not_after: self.order.deadline,
                dependencies_constraints_have_priority: self
                    .order
                    .dependencies_constraints_have_priority,
                schedule_backwards: self.order.schedule_backwards,
            });
        }
        // Unreachable None: just filled above.
        self.cached_configuration
            .as_ref()
            .unwrap_or(&EMPTY_CONFIGURATION)
    }

    /// The prepared save for this state, computed once per retrieval.
    pub fn save_command(&mut self) -> Option<&SaveCommand> {
        if self.cached_save.is_none() {
            let info = self.order.current_version_info()?;
            self.cached_save = Some(SaveCommand {
                order_id: self.order.id.clone(),
                scenario_id: info.scenario_id.clone(),
                version_id: info.version.id.clone(),
                pending_synchronizations: sync::synchronizations_needed(&self.order).len(),
                pending_removals: self.to_remove.len(),
            });
        }
        self.cached_save.as_ref()
    }

    /// Detaches an element anywhere in the tree. Persisted top-level
    /// elements are queued for deletion at the next save; milestones
    /// count as top level wherever they sit. Everything else vanishes
    /// outright.
    pub fn removed(&mut self, task_id: &str) -> Result<()> {
        let root = self
            .order
            .root
            .as_mut()
            .ok_or_else(|| PlanningError::illegal_state("the order has no schedule tree"))?;
        let (detached, top_level) = match root.children.iter().position(|c| c.id() == task_id) {
            Some(position) => (root.children.remove(position), true),
            None => {
                let detached = root
                    .children
                    .iter_mut()
                    .find_map(|child| child.detach(task_id))
                    .ok_or_else(|| PlanningError::not_found("task", task_id))?;
                (detached, false)
            }
        };
        self.initial.retain(|id| id != task_id);
        self.cached_configuration = None;
        self.cached_save = None;
        if (top_level || detached.is_milestone()) && detached.stored_id().is_some() {
            debug!(task = task_id, "queueing persisted element for removal");
            self.to_remove.push(detached);
        }
        Ok(())
    }

    /// Elements removed from the tree that still exist in the store.
    pub fn to_remove(&self) -> Vec<&TaskElement> {
        self.to_remove
            .iter()
            .filter(|e| e.stored_id().is_some())
            .collect()
    }

    /// Saves versioning bookkeeping, synchronizes task sources, and
    /// publishes the session's day assignments onto the catalog. On
    /// success a forked session is promoted to owner.
    pub fn synchronize_trees(&mut self) -> Result<()> {
        self.scenario_info
            .save_versioning_info(&mut self.order, &self.stores)?;

        let to_publish: Vec<crate::models::DayAssignment> = self
            .order
            .day_assignments()
            .into_iter()
            .cloned()
            .collect();
        for assignment in to_publish {
            if let Some(resource) = self.catalog.get_mut(&assignment.resource_id) {
                if !resource.assignments.iter().any(|a| a.id == assignment.id) {
                    resource.add_assignment(assignment);
                }
            }
        }

        self.to_remove.clear();
        self.cached_save = None;
        self.scenario_info.after_commit();
        Ok(())
    }

    /// Reattaches the order and its tree to the active persistence
    /// session.
    pub fn reattach(&self) {
        self.stores.orders.reattach_order(&self.order);
        if let Some(element) = self.order.associated_task_element() {
            self.stores.tasks.reattach_task(&element);
        }
    }

    /// Reattaches every catalog resource and folds in resources
    /// created since the catalog snapshot was taken.
    pub fn reassociate_resources_with_session(&mut self) {
        for resource in self.catalog.iter() {
            self.stores.resources.reattach_resource(resource);
        }
        let scenario_id = self.current_scenario().id.clone();
        for mut resource in self.stores.resources.list_all_resources() {
            if !self.catalog.contains(&resource.id) {
                resource.use_scenario(scenario_id.clone());
                self.catalog.insert(resource);
            }
        }
    }

    /// The distinct resources touched by any allocation in the tree.
    pub fn resources_related_with_allocations(&self) -> Vec<&Resource> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for task in self.all_tasks() {
            for allocation in &task.allocations {
                for resource_id in allocation.related_resources() {
                    if seen.insert(resource_id.to_string()) {
                        if let Some(resource) = self.catalog.get(resource_id) {
                            result.push(resource);
                        }
                    }
                }
            }
        }
        result
    }

    /// Replaces, inside an externally queried allocation set, the
    /// entries belonging to this order with the session's own current
    /// allocations that satisfy `criteria`. Entries for other orders
    /// pass through untouched.
    pub fn replace_by_current_ones(
        &self,
        queried: Vec<ResourceAllocation>,
        criteria: &dyn AllocationCriteria,
    ) -> Vec<ResourceAllocation> {
        let in_session: HashSet<String> = self.order.all_task_ids();
        let mut result: Vec<ResourceAllocation> = queried
            .into_iter()
            .filter(|a| !in_session.contains(&a.task_id))
            .collect();
        for task in self.all_tasks() {
            for allocation in &task.allocations {
                if criteria.is_satisfied_by(allocation) {
                    result.push(allocation.clone());
                }
            }
        }
        result
    }

    /// Refreshes a cached state on retrieval: caches are invalidated,
    /// scheduling data is re-synchronized in memory without touching
    /// the store, and missing order-element codes are generated.
    fn on_retrieval(&mut self) {
        self.cached_configuration = None;
        self.cached_save = None;
        let actions = sync::synchronizations_needed(&self.order);
        if !actions.is_empty() {
            sync::apply(&mut self.order, actions, &TaskSourcePersistence::no_persist());
        }
        self.order.generate_order_element_codes(self.code_digits);
        self.initial = self
            .order
            .root
            .as_ref()
            .map(|root| root.children.iter().map(|c| c.id().to_string()).collect())
            .unwrap_or_default();
    }

    /// The synchronizations a save of this state would apply.
    pub fn pending_synchronizations(&self) -> Vec<TaskSourceSynchronization> {
        sync::synchronizations_needed(&self.order)
    }
}

static EMPTY_CONFIGURATION: PlannerConfiguration = PlannerConfiguration {
    initial_task_ids: Vec::new(),
    not_before: None,
    not_after: None,
    dependencies_constraints_have_priority: false,
    schedule_backwards: false,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::OnInterval;
    use crate::models::{DayAssignment, Resource, Task, TaskGroup, TaskMilestone, TaskSource};
    use crate::stores::memory::InMemoryStores;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn seeded() -> (Arc<InMemoryStores>, PlanningStateBuilder) {
        let backing = Arc::new(InMemoryStores::new());
        backing.add_resource(Resource::new("W1").with_name("Worker"));
        let order = Order::new("O1")
            .with_name("Refit")
            .with_init_date(day(1))
            .with_root(
                TaskGroup::new("root")
                    .with_child(TaskElement::Task(
                        Task::new("T1")
                            .with_task_source(TaskSource::new("T1", "E1", 40))
                            .with_stored_id(1),
                    ))
                    .with_child(TaskElement::Task(
                        Task::new("T2").with_task_source(TaskSource::new("T2", "E2", 20)),
                    )),
            );
        backing.add_order(order);
        let builder = PlanningStateBuilder::new(backing.stores());
        (backing, builder)
    }

    #[test]
    fn test_create_claims_unversioned_order_for_current_scenario() {
        let (_, builder) = seeded();
        let state = builder.create_planning("O1").unwrap();
        assert!(state.scenario_info().is_using_the_owner_scenario());
        let info = state.order().current_version_info().unwrap();
        assert_eq!(info.scenario_id, "master");
        assert!(info.version.is_owned_by("master"));
    }

    #[test]
    fn test_create_rejects_unknown_order() {
        let (_, builder) = seeded();
        let err = builder.create_planning("missing").unwrap_err();
        assert!(matches!(err, PlanningError::NotFound { kind: "order", .. }));
    }

    #[test]
    fn test_create_rejects_empty_order_id() {
        let (_, builder) = seeded();
        let err = builder.create_planning("").unwrap_err();
        assert!(matches!(err, PlanningError::Precondition(_)));
    }

    #[test]
    fn test_resolve_rejects_allocation_on_unknown_resource() {
        let backing = Arc::new(InMemoryStores::new());
        let order = Order::new("O1").with_root(TaskGroup::new("root").with_child(
            TaskElement::Task(Task::new("T1").with_allocation(ResourceAllocation::specific(
                "T1", "ghost", 1.0, day(1), day(2), "master",
            ))),
        ));
        backing.add_order(order);
        let builder = PlanningStateBuilder::new(backing.stores());
        let err = builder.create_planning("O1").unwrap_err();
        assert!(matches!(
            err,
            PlanningError::NotFound {
                kind: "resource",
                ..
            }
        ));
    }

    #[test]
    fn test_state_operations_need_no_further_store_calls() {
        let (backing, builder) = seeded();
        let mut state = builder.create_planning("O1").unwrap();
        let after_build = backing.call_count();

        let _ = state.is_empty();
        let _ = state.initial();
        let _ = state.all_tasks();
        let _ = state.assignments_for("W1");
        let _ = state.configuration();
        let _ = state.save_command();
        let _ = state.resources_related_with_allocations();
        assert_eq!(backing.call_count(), after_build);
    }

    #[test]
    fn test_configuration_reflects_order_bounds() {
        let (_, builder) = seeded();
        let mut state = builder.create_planning("O1").unwrap();
        let configuration = state.configuration().clone();
        assert_eq!(configuration.not_before, Some(day(1)));
        assert_eq!(configuration.initial_task_ids, vec!["T1", "T2"]);
    }

    #[test]
    fn test_session_reuses_state_for_same_order() {
        let (_, builder) = seeded();
        let mut session = SessionContext::new();
        builder.retrieve_or_create(&mut session, "O1").unwrap();
        assert_eq!(session.occupied_by(), Some("O1"));
        // Mark the cached state, retrieve again, marker survives.
        session.slot.as_mut().unwrap().1.code_digits = 9;
        let state = builder.retrieve_or_create(&mut session, "O1").unwrap();
        assert_eq!(state.code_digits, 9);
    }

    #[test]
    fn test_session_rebuilds_for_different_order() {
        let (backing, builder) = seeded();
        backing.add_order(Order::new("O2").with_name("Other"));
        let mut session = SessionContext::new();
        builder.retrieve_or_create(&mut session, "O1").unwrap();
        let state = builder.retrieve_or_create(&mut session, "O2").unwrap();
        assert_eq!(state.order().id, "O2");
        assert_eq!(session.occupied_by(), Some("O2"));
    }

    #[test]
    fn test_failed_retrieval_leaves_session_untouched() {
        let (_, builder) = seeded();
        let mut session = SessionContext::new();
        builder.retrieve_or_create(&mut session, "O1").unwrap();
        let err = builder.retrieve_or_create(&mut session, "missing");
        assert!(err.is_err());
        assert_eq!(session.occupied_by(), Some("O1"));
    }

    #[test]
    fn test_removed_queues_persisted_and_drops_fresh() {
        let (_, builder) = seeded();
        let mut state = builder.create_planning("O1").unwrap();

        state.removed("T1").unwrap(); // stored_id set
        state.removed("T2").unwrap(); // never persisted
        assert_eq!(state.to_remove().len(), 1);
        assert_eq!(state.to_remove()[0].id(), "T1");
        assert!(state.initial().is_empty());
    }

    #[test]
    fn test_removed_detaches_nested_without_queueing() {
        let backing = Arc::new(InMemoryStores::new());
        let nested = TaskGroup::new("g1")
            .with_child(TaskElement::Task(Task::new("T1").with_stored_id(7)))
            .with_child(TaskElement::Milestone(
                TaskMilestone::new("M1").with_stored_id(8),
            ));
        backing.add_order(
            Order::new("O1").with_root(TaskGroup::new("root").with_child(TaskElement::Group(nested))),
        );
        let builder = PlanningStateBuilder::new(backing.stores());
        let mut state = builder.create_planning("O1").unwrap();

        // A nested task detaches but is never queued, persisted or not.
        state.removed("T1").unwrap();
        assert!(state.to_remove().is_empty());
        assert!(state.all_tasks().is_empty());

        // A nested milestone counts as top level and is queued.
        state.removed("M1").unwrap();
        assert_eq!(state.to_remove().len(), 1);
        assert_eq!(state.to_remove()[0].id(), "M1");

        assert!(matches!(
            state.removed("ghost"),
            Err(PlanningError::NotFound { .. })
        ));
    }

    #[test]
    fn test_synchronize_trees_persists_and_promotes() {
        let (backing, builder) = seeded();
        let mut state = builder.create_planning("O1").unwrap();
        state.synchronize_trees().unwrap();
        assert_eq!(backing.persisted_source_ids().len(), 2);
        assert!(state.scenario_info().is_using_the_owner_scenario());
        assert!(state
            .order()
            .current_version_info()
            .unwrap()
            .version
            .saved_through_owner);
    }

    #[test]
    fn test_synchronize_trees_publishes_assignments_to_catalog() {
        let (backing, builder) = seeded();
        {
            let mut order = backing.stores().orders.find_by_id("O1").unwrap();
            if let Some(TaskElement::Task(task)) =
                order.root.as_mut().unwrap().children.first_mut()
            {
                task.allocations.push(
                    ResourceAllocation::specific("T1", "W1", 1.0, day(1), day(2), "master")
                        .with_assignment(DayAssignment::new("W1", day(1), 1.0, "master")),
                );
            }
            backing.add_order(order);
        }
        let mut state = builder.create_planning("O1").unwrap();
        assert!(state.assignments_for("W1").is_empty());
        state.synchronize_trees().unwrap();
        assert_eq!(state.assignments_for("W1").len(), 1);
    }

    #[test]
    fn test_replace_by_current_ones_keeps_foreign_entries() {
        let (backing, builder) = seeded();
        {
            let mut order = backing.stores().orders.find_by_id("O1").unwrap();
            if let Some(TaskElement::Task(task)) =
                order.root.as_mut().unwrap().children.first_mut()
            {
                task.allocations.push(ResourceAllocation::specific(
                    "T1", "W1", 1.0, day(1), day(2), "master",
                ));
            }
            backing.add_order(order);
        }
        let state = builder.create_planning("O1").unwrap();

        let foreign = ResourceAllocation::specific("X9", "W1", 0.5, day(1), day(2), "master");
        let stale_own = ResourceAllocation::specific("T1", "W1", 0.25, day(5), day(6), "master");
        let everything = OnInterval::new(None, None);
        let result =
            state.replace_by_current_ones(vec![foreign.clone(), stale_own], &everything);

        // The foreign entry survives; the stale own entry is replaced
        // by the session's current allocation.
        assert_eq!(result.len(), 2);
        assert!(result.iter().any(|a| a.id == foreign.id));
        assert!(result
            .iter()
            .any(|a| a.task_id == "T1" && (a.percentage - 1.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_derived_scenario_forks_once_and_then_saves_as_owner() {
        let (backing, builder) = seeded();

        // First session under master claims the order and commits.
        let mut state = builder.create_planning("O1").unwrap();
        state.synchronize_trees().unwrap();
        let v1 = state.order().versions["master"].clone();
        backing.add_order(state.order().clone());

        // A scenario derived from master inherits master's version.
        let branch = backing.scenario("master").unwrap().derive("branch", "Branch");
        assert_eq!(branch.order_version("O1"), Some(&v1));
        backing.add_scenario(branch);
        backing.set_current_scenario("branch");

        // Building under branch forks a private version.
        let mut state = builder.create_planning("O1").unwrap();
        assert!(!state.scenario_info().is_using_the_owner_scenario());
        let v2 = state.order().versions["branch"].clone();
        assert_ne!(v1.id, v2.id);
        assert!(v2.is_owned_by("branch"));
        assert_eq!(state.order().versions["master"], v1);

        // First commit publishes the fork and promotes to owner.
        state.synchronize_trees().unwrap();
        assert!(state.scenario_info().is_using_the_owner_scenario());
        assert_eq!(
            backing.scenario("branch").unwrap().order_version("O1"),
            Some(&v2)
        );
        assert_eq!(
            backing.scenario("master").unwrap().order_version("O1"),
            Some(&v1)
        );

        // A second commit saves in place without another fork.
        state.synchronize_trees().unwrap();
        let bound = state.order().current_version_info().unwrap();
        assert_eq!(bound.version.id, v2.id);
        assert!(bound.version.saved_through_owner);
    }

    #[test]
    fn test_reassociate_folds_in_new_resources() {
        let (backing, builder) = seeded();
        let mut state = builder.create_planning("O1").unwrap();
        backing.add_resource(Resource::new("W2"));
        let before = backing.reattach_count();
        state.reassociate_resources_with_session();
        assert!(backing.reattach_count() > before);
        assert!(state.resources().contains("W2"));
        assert_eq!(
            state.resources().get("W2").unwrap().active_scenario.as_deref(),
            Some("master")
        );
    }

    #[test]
    fn test_forked_commit_keeps_its_own_assignments_visible() {
        let (backing, builder) = seeded();
        let shared = DayAssignment::new("W1", day(1), 1.0, "master");
        {
            let mut worker = Resource::new("W1").with_name("Worker");
            worker.add_assignment(shared.clone());
            backing.add_resource(worker);
            let mut order = backing.stores().orders.find_by_id("O1").unwrap();
            if let Some(TaskElement::Task(task)) =
                order.root.as_mut().unwrap().children.first_mut()
            {
                task.allocations.push(
                    ResourceAllocation::specific("T1", "W1", 1.0, day(1), day(2), "master")
                        .with_assignment(shared),
                );
            }
            backing.add_order(order);
        }

        // Claim and commit under master, then derive a branch.
        let mut state = builder.create_planning("O1").unwrap();
        state.synchronize_trees().unwrap();
        backing.add_order(state.order().clone());
        let branch = backing.scenario("master").unwrap().derive("branch", "Branch");
        backing.add_scenario(branch);
        backing.set_current_scenario("branch");

        // The fork's first commit publishes the carried facts under
        // fresh identities; only the resource's pre-fork copy is
        // hidden by the stale filter.
        let mut state = builder.create_planning("O1").unwrap();
        state.synchronize_trees().unwrap();
        assert_eq!(state.assignments_for("W1").len(), 1);
    }

    #[test]
    fn test_retrieval_forks_under_derived_scenario() {
        let (backing, builder) = seeded();
        let mut session = SessionContext::new();
        let state = builder.retrieve_or_create(&mut session, "O1").unwrap();
        state.synchronize_trees().unwrap();
        let v1 = state.order().versions["master"].clone();
        backing.add_order(state.order().clone());

        let branch = backing.scenario("master").unwrap().derive("branch", "Branch");
        backing.add_scenario(branch);
        backing.set_current_scenario("branch");

        // A fresh session retrieving the same order under branch
        // builds a forked state rather than reusing master's.
        let mut session = SessionContext::new();
        let state = builder.retrieve_or_create(&mut session, "O1").unwrap();
        assert!(!state.scenario_info().is_using_the_owner_scenario());
        let v2 = state.order().versions["branch"].clone();
        assert_ne!(v1.id, v2.id);
        assert!(v2.is_owned_by("branch"));

        state.synchronize_trees().unwrap();
        assert!(state.scenario_info().is_using_the_owner_scenario());
        assert_eq!(
            backing.scenario("branch").unwrap().order_version("O1"),
            Some(&v2)
        );
    }

    #[test]
    fn test_state_debug_names_order_and_scenario() {
        let (_, builder) = seeded();
        let state = builder.create_planning("O1").unwrap();
        let rendered = format!("{state:?}");
        assert!(rendered.contains("PlanningState"));
        assert!(rendered.contains("O1"));
        assert!(rendered.contains("master"));
    }

    #[test]
    fn test_reattach_touches_order_and_tree() {
        let (backing, builder) = seeded();
        let state = builder.create_planning("O1").unwrap();
        let before = backing.reattach_count();
        state.reattach();
        assert_eq!(backing.reattach_count(), before + 2);
    }
}
