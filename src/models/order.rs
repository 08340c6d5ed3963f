//! Order model: the project whose schedule is being planned.
//!
//! An order carries its work-breakdown tree of [`OrderElement`]s, the
//! root [`TaskGroup`] of its schedule, and the versioning bookkeeping
//! that scopes scheduling facts to scenarios: a scenario → version map,
//! the version currently being read/written, and the task sources
//! recorded per version. Identity-bearing fields (id, name, element
//! tree) are never touched by a fork; only the scheduling-fact set is
//! rewritten into the new version.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{fresh_id, DayAssignment, OrderVersion, Scenario, TaskElement, TaskGroup};

/// A label attached to an order element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label type grouping.
    pub type_name: String,
}

impl Label {
    /// Creates a label.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A work-breakdown node the schedule tree elements point at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderElement {
    /// Unique element identifier.
    pub id: String,
    /// Business code; regenerated when empty.
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// Budgeted work hours for this element alone.
    pub work_hours: u32,
    /// Labels attached to this element.
    pub labels: Vec<Label>,
    /// Child elements.
    pub children: Vec<OrderElement>,
}

impl OrderElement {
    /// Creates a new element.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: String::new(),
            name: String::new(),
            work_hours: 0,
            labels: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the budgeted work hours.
    pub fn with_work_hours(mut self, hours: u32) -> Self {
        self.work_hours = hours;
        self
    }

    /// Attaches a label.
    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// Adds a child element.
    pub fn with_child(mut self, child: OrderElement) -> Self {
        self.children.push(child);
        self
    }

    /// This element and all descendants, depth-first.
    pub fn descendants(&self) -> Vec<&OrderElement> {
        let mut result = vec![self];
        for child in &self.children {
            result.extend(child.descendants());
        }
        result
    }

    /// Budgeted hours for this element and all descendants.
    pub fn total_work_hours(&self) -> u32 {
        self.descendants().iter().map(|e| e.work_hours).sum()
    }
}

/// The persisted record linking a schedule element to the order
/// element it schedules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSource {
    /// Source identity.
    pub id: String,
    /// Schedule element this source belongs to.
    pub task_id: String,
    /// Order element being scheduled.
    pub order_element_id: String,
    /// Total scheduled hours.
    pub total_hours: u32,
}

impl TaskSource {
    /// Creates a task source with a fresh identity.
    pub fn new(
        task_id: impl Into<String>,
        order_element_id: impl Into<String>,
        total_hours: u32,
    ) -> Self {
        Self {
            id: fresh_id(),
            task_id: task_id.into(),
            order_element_id: order_element_id.into(),
            total_hours,
        }
    }
}

/// Which version the order is currently being read/written under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// The scenario the data is scoped to.
    pub scenario_id: String,
    /// The version holding the scheduling facts.
    pub version: OrderVersion,
}

/// A project order: identity, work breakdown, schedule tree, and
/// scenario-scoped version bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Earliest allowed start.
    pub init_date: Option<NaiveDate>,
    /// Latest allowed end.
    pub deadline: Option<NaiveDate>,
    /// Shared calendar reference.
    pub calendar_id: Option<String>,
    /// Whether dependency constraints win over calendar constraints.
    pub dependencies_constraints_have_priority: bool,
    /// Whether scheduling runs backwards from the deadline.
    pub schedule_backwards: bool,
    /// Root of the schedule tree; `None` when nothing is scheduled.
    pub root: Option<TaskGroup>,
    /// Top-level work-breakdown elements.
    pub elements: Vec<OrderElement>,
    /// Scenario → version map for this order.
    pub versions: HashMap<String, OrderVersion>,
    /// Version currently in use; `None` before any scenario binding.
    pub current: Option<VersionInfo>,
    /// Task sources recorded per version id.
    pub recorded_sources: HashMap<String, HashMap<String, TaskSource>>,
    /// Whether the order has never been committed.
    pub new_object: bool,
}

impl Order {
    /// Creates a new, never-committed order.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            init_date: None,
            deadline: None,
            calendar_id: None,
            dependencies_constraints_have_priority: true,
            schedule_backwards: false,
            root: None,
            elements: Vec::new(),
            versions: HashMap::new(),
            current: None,
            recorded_sources: HashMap::new(),
            new_object: true,
        }
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the earliest allowed start.
    pub fn with_init_date(mut self, date: NaiveDate) -> Self {
        self.init_date = Some(date);
        self
    }

    /// Sets the latest allowed end.
    pub fn with_deadline(mut self, date: NaiveDate) -> Self {
        self.deadline = Some(date);
        self
    }

    /// Sets the calendar reference.
    pub fn with_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = Some(calendar_id.into());
        self
    }

    /// Sets the schedule root.
    pub fn with_root(mut self, root: TaskGroup) -> Self {
        self.root = Some(root);
        self
    }

    /// Adds a top-level work-breakdown element.
    pub fn with_element(mut self, element: OrderElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Marks the order as already committed once.
    pub fn persisted(mut self) -> Self {
        self.new_object = false;
        self
    }

    /// Whether the order has never been scheduled under any scenario.
    pub fn has_no_versions(&self) -> bool {
        self.versions.is_empty()
    }

    /// Records the version an order uses under a scenario.
    pub fn set_version_for_scenario(
        &mut self,
        scenario_id: impl Into<String>,
        version: OrderVersion,
    ) {
        self.versions.insert(scenario_id.into(), version);
    }

    /// Binds reads/writes to the version the given scenario maps for
    /// this order. Leaves the binding untouched when the scenario has
    /// no version for it yet.
    pub fn use_scheduling_data_for(&mut self, scenario: &Scenario) {
        let version = scenario
            .order_version(&self.id)
            .or_else(|| self.versions.get(&scenario.id))
            .cloned();
        if let Some(version) = version {
            self.versions.insert(scenario.id.clone(), version.clone());
            self.current = Some(VersionInfo {
                scenario_id: scenario.id.clone(),
                version,
            });
        }
    }

    /// The version binding currently in effect.
    pub fn current_version_info(&self) -> Option<&VersionInfo> {
        self.current.as_ref()
    }

    /// Whether the bound scenario owns the version it reads.
    pub fn is_using_the_owner_scenario(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|info| info.version.is_owned_by(&info.scenario_id))
    }

    /// Rewrites the scheduling-fact set into a fresh version for a
    /// scenario: the recorded task sources of the previously bound
    /// version are carried over, identity-bearing fields untouched.
    pub fn write_scheduling_data_changes_to(
        &mut self,
        scenario_id: impl Into<String>,
        new_version: OrderVersion,
    ) {
        let scenario_id = scenario_id.into();
        let carried = self
            .current
            .as_ref()
            .and_then(|info| self.recorded_sources.get(&info.version.id))
            .cloned()
            .unwrap_or_default();
        self.recorded_sources
            .insert(new_version.id.clone(), carried);
        self.versions
            .insert(scenario_id.clone(), new_version.clone());
        self.current = Some(VersionInfo {
            scenario_id,
            version: new_version,
        });
    }

    /// Finalizes in-memory scheduling changes for the bound version
    /// after a save.
    pub fn write_scheduling_data_changes(&mut self) {
        self.new_object = false;
    }

    /// Root of the schedule tree as a task element, if any.
    pub fn associated_task_element(&self) -> Option<TaskElement> {
        self.root.clone().map(TaskElement::Group)
    }

    /// Schedule elements below the root (the root itself excluded).
    pub fn all_children_task_elements(&self) -> Vec<&TaskElement> {
        match &self.root {
            None => Vec::new(),
            Some(root) => root
                .children
                .iter()
                .flat_map(|c| c.descendants())
                .collect(),
        }
    }

    /// Ids of every task element below the root.
    pub fn all_task_ids(&self) -> HashSet<String> {
        self.all_children_task_elements()
            .iter()
            .map(|e| e.id().to_string())
            .collect()
    }

    /// Ids of every work-breakdown element.
    pub fn all_element_ids(&self) -> HashSet<String> {
        self.elements
            .iter()
            .flat_map(|e| e.descendants())
            .map(|e| e.id.clone())
            .collect()
    }

    /// Looks up a work-breakdown element by id.
    pub fn find_element(&self, id: &str) -> Option<&OrderElement> {
        self.elements
            .iter()
            .flat_map(|e| e.descendants())
            .find(|e| e.id == id)
    }

    /// Every day assignment currently under the order's tree,
    /// including derived allocations.
    pub fn day_assignments(&self) -> Vec<&DayAssignment> {
        let mut result = Vec::new();
        if let Some(root) = &self.root {
            for child in &root.children {
                for allocation in child.all_allocations() {
                    result.extend(allocation.assignments.iter());
                    for derived in &allocation.derived {
                        result.extend(derived.assignments.iter());
                    }
                }
            }
        }
        result
    }

    /// Task sources in the tree, children before parents.
    pub fn tree_sources_bottom_up(&self) -> Vec<&TaskSource> {
        fn collect<'a>(element: &'a TaskElement, out: &mut Vec<&'a TaskSource>) {
            for child in element.children() {
                collect(child, out);
            }
            if let Some(source) = element.task_source() {
                out.push(source);
            }
        }
        let mut result = Vec::new();
        if let Some(root) = &self.root {
            for child in &root.children {
                collect(child, &mut result);
            }
            if let Some(source) = &root.task_source {
                result.push(source);
            }
        }
        result
    }

    /// Task sources across every version, tree sources first (bottom
    /// to top), then recorded sources not present in the tree.
    pub fn all_task_sources_bottom_up(&self) -> Vec<&TaskSource> {
        let mut result = self.tree_sources_bottom_up();
        let seen: HashSet<&str> = result.iter().map(|s| s.id.as_str()).collect();
        for recorded in self.recorded_sources.values() {
            for source in recorded.values() {
                if !seen.contains(source.id.as_str()) {
                    result.push(source);
                }
            }
        }
        result
    }

    /// Task sources recorded for a version.
    pub fn recorded_sources_for(&self, version_id: &str) -> Option<&HashMap<String, TaskSource>> {
        self.recorded_sources.get(version_id)
    }

    /// Records a task source under a version.
    pub fn record_source(&mut self, version_id: &str, source: TaskSource) {
        self.recorded_sources
            .entry(version_id.to_string())
            .or_default()
            .insert(source.task_id.clone(), source);
    }

    /// Drops a recorded task source from a version.
    pub fn unrecord_source(&mut self, version_id: &str, task_id: &str) {
        if let Some(recorded) = self.recorded_sources.get_mut(version_id) {
            recorded.remove(task_id);
        }
    }

    /// Regenerates codes for every work-breakdown element missing one,
    /// numbering depth-first with the given digit width.
    pub fn generate_order_element_codes(&mut self, digits: usize) {
        fn assign(element: &mut OrderElement, prefix: &str, next: &mut usize, digits: usize) {
            if element.code.is_empty() {
                element.code = format!("{prefix}-{:0width$}", *next, width = digits);
            }
            *next += 1;
            for child in &mut element.children {
                assign(child, prefix, next, digits);
            }
        }
        let prefix = self.id.clone();
        let mut next = 1;
        for element in &mut self.elements {
            assign(element, &prefix, &mut next, digits);
        }
    }
}
