//! Task graph: the ordered tree of schedule elements.
//!
//! Three closed variants: leaf [`Task`]s carrying resource allocations,
//! [`TaskGroup`]s owning children and deriving their span from them, and
//! zero-duration [`TaskMilestone`]s. Parents own children; calendars are
//! shared by reference. Dependency edges are owned by their origin task;
//! the destination side is served by a [`DependencyIndex`] built over a
//! tree.
//!
//! The engine never silently rewrites caller-set date bounds. Whether a
//! caller-set span respects the dependency edges can be checked with
//! [`DependencyIndex::unrespected`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ResourceAllocation, TaskSource};

/// Dependency edge type between two task elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Destination starts after origin ends.
    EndStart,
    /// Destination starts no earlier than origin starts.
    StartStart,
    /// Destination ends no earlier than origin ends.
    EndEnd,
    /// Destination ends after origin starts.
    StartEnd,
}

/// A directed edge between two task elements.
///
/// Owned by the origin task; destinations reach their incoming edges
/// through a [`DependencyIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Task the edge starts from.
    pub origin_id: String,
    /// Task the edge points at.
    pub destination_id: String,
    /// Edge type.
    pub kind: DependencyKind,
}

impl Dependency {
    /// Creates an end-to-start dependency.
    pub fn end_start(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin_id: origin.into(),
            destination_id: destination.into(),
            kind: DependencyKind::EndStart,
        }
    }

    /// Creates a dependency of the given kind.
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        kind: DependencyKind,
    ) -> Self {
        Self {
            origin_id: origin.into(),
            destination_id: destination.into(),
            kind,
        }
    }

    /// Whether two spans respect this edge.
    ///
    /// `None` components mean the bound is unset, which never violates.
    pub fn is_respected(
        &self,
        origin: (Option<NaiveDate>, Option<NaiveDate>),
        destination: (Option<NaiveDate>, Option<NaiveDate>),
    ) -> bool {
        let (o_start, o_end) = origin;
        let (d_start, d_end) = destination;
        match self.kind {
            DependencyKind::EndStart => match (o_end, d_start) {
                (Some(oe), Some(ds)) => ds >= oe,
                _ => true,
            },
            DependencyKind::StartStart => match (o_start, d_start) {
                (Some(os), Some(ds)) => ds >= os,
                _ => true,
            },
            DependencyKind::EndEnd => match (o_end, d_end) {
                (Some(oe), Some(de)) => de >= oe,
                _ => true,
            },
            DependencyKind::StartEnd => match (o_start, d_end) {
                (Some(os), Some(de)) => de >= os,
                _ => true,
            },
        }
    }
}

/// A leaf task holding resource allocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Start bound, if scheduled.
    pub start: Option<NaiveDate>,
    /// End bound, if scheduled.
    pub end: Option<NaiveDate>,
    /// Shared calendar reference.
    pub calendar_id: Option<String>,
    /// The work-breakdown unit this task schedules.
    pub order_element_id: Option<String>,
    /// Link to the persisted scheduling record.
    pub task_source: Option<TaskSource>,
    /// Outgoing dependency edges (this task is the origin).
    pub dependencies: Vec<Dependency>,
    /// Resource allocations on this task.
    pub allocations: Vec<ResourceAllocation>,
    /// Persistence identity; `None` until first committed.
    pub stored_id: Option<u64>,
}

/// A container deriving its span from its children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    /// Unique task identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Shared calendar reference.
    pub calendar_id: Option<String>,
    /// The work-breakdown unit this group schedules.
    pub order_element_id: Option<String>,
    /// Link to the persisted scheduling record.
    pub task_source: Option<TaskSource>,
    /// Outgoing dependency edges.
    pub dependencies: Vec<Dependency>,
    /// Owned children, in schedule order.
    pub children: Vec<TaskElement>,
    /// Persistence identity; `None` until first committed.
    pub stored_id: Option<u64>,
}

/// A zero-duration marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMilestone {
    /// Unique task identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// The marked day.
    pub date: Option<NaiveDate>,
    /// Outgoing dependency edges.
    pub dependencies: Vec<Dependency>,
    /// Persistence identity; `None` until first committed.
    pub stored_id: Option<u64>,
}

impl Task {
    /// Creates a new leaf task.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            start: None,
            end: None,
            calendar_id: None,
            order_element_id: None,
            task_source: None,
            dependencies: Vec::new(),
            allocations: Vec::new(),
            stored_id: None,
        }
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the date bounds.
    pub fn with_span(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Sets the calendar reference.
    pub fn with_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = Some(calendar_id.into());
        self
    }

    /// Sets the scheduled order element.
    pub fn with_order_element(mut self, order_element_id: impl Into<String>) -> Self {
        self.order_element_id = Some(order_element_id.into());
        self
    }

    /// Sets the task source link.
    pub fn with_task_source(mut self, source: TaskSource) -> Self {
        self.task_source = Some(source);
        self
    }

    /// Adds an outgoing dependency.
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Adds a resource allocation.
    pub fn with_allocation(mut self, allocation: ResourceAllocation) -> Self {
        self.allocations.push(allocation);
        self
    }

    /// Marks the task as already persisted.
    pub fn with_stored_id(mut self, stored_id: u64) -> Self {
        self.stored_id = Some(stored_id);
        self
    }
}

impl TaskGroup {
    /// Creates a new empty group.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            calendar_id: None,
            order_element_id: None,
            task_source: None,
            dependencies: Vec::new(),
            children: Vec::new(),
            stored_id: None,
        }
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the scheduled order element.
    pub fn with_order_element(mut self, order_element_id: impl Into<String>) -> Self {
        self.order_element_id = Some(order_element_id.into());
        self
    }

    /// Sets the task source link.
    pub fn with_task_source(mut self, source: TaskSource) -> Self {
        self.task_source = Some(source);
        self
    }

    /// Adds a child element.
    pub fn with_child(mut self, child: TaskElement) -> Self {
        self.children.push(child);
        self
    }

    /// Marks the group as already persisted.
    pub fn with_stored_id(mut self, stored_id: u64) -> Self {
        self.stored_id = Some(stored_id);
        self
    }

    /// Span derived from children: earliest start to latest end.
    pub fn derived_span(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let mut start: Option<NaiveDate> = None;
        let mut end: Option<NaiveDate> = None;
        for child in &self.children {
            let (s, e) = child.span();
            if let Some(s) = s {
                start = Some(start.map_or(s, |cur| cur.min(s)));
            }
            if let Some(e) = e {
                end = Some(end.map_or(e, |cur| cur.max(e)));
            }
        }
        (start, end)
    }
}

impl TaskMilestone {
    /// Creates a new milestone.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            date: None,
            dependencies: Vec::new(),
            stored_id: None,
        }
    }

    /// Sets the marked day.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Marks the milestone as already persisted.
    pub fn with_stored_id(mut self, stored_id: u64) -> Self {
        self.stored_id = Some(stored_id);
        self
    }
}

/// A node in the schedule tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskElement {
    /// Leaf task, holds allocations.
    Task(Task),
    /// Container, derives its span from children.
    Group(TaskGroup),
    /// Zero-duration marker.
    Milestone(TaskMilestone),
}

impl TaskElement {
    /// Element identifier.
    pub fn id(&self) -> &str {
        match self {
            TaskElement::Task(t) => &t.id,
            TaskElement::Group(g) => &g.id,
            TaskElement::Milestone(m) => &m.id,
        }
    }

    /// Element name.
    pub fn name(&self) -> &str {
        match self {
            TaskElement::Task(t) => &t.name,
            TaskElement::Group(g) => &g.name,
            TaskElement::Milestone(m) => &m.name,
        }
    }

    /// Whether this is a leaf task.
    pub fn is_leaf(&self) -> bool {
        matches!(self, TaskElement::Task(_))
    }

    /// Whether this is a milestone.
    pub fn is_milestone(&self) -> bool {
        matches!(self, TaskElement::Milestone(_))
    }

    /// Persistence identity, if any.
    pub fn stored_id(&self) -> Option<u64> {
        match self {
            TaskElement::Task(t) => t.stored_id,
            TaskElement::Group(g) => g.stored_id,
            TaskElement::Milestone(m) => m.stored_id,
        }
    }

    /// Scheduled order element, if any.
    pub fn order_element_id(&self) -> Option<&str> {
        match self {
            TaskElement::Task(t) => t.order_element_id.as_deref(),
            TaskElement::Group(g) => g.order_element_id.as_deref(),
            TaskElement::Milestone(_) => None,
        }
    }

    /// Calendar reference, if any.
    pub fn calendar_id(&self) -> Option<&str> {
        match self {
            TaskElement::Task(t) => t.calendar_id.as_deref(),
            TaskElement::Group(g) => g.calendar_id.as_deref(),
            TaskElement::Milestone(_) => None,
        }
    }

    /// Task source link, if any.
    pub fn task_source(&self) -> Option<&TaskSource> {
        match self {
            TaskElement::Task(t) => t.task_source.as_ref(),
            TaskElement::Group(g) => g.task_source.as_ref(),
            TaskElement::Milestone(_) => None,
        }
    }

    /// Outgoing dependency edges of this element.
    pub fn dependencies(&self) -> &[Dependency] {
        match self {
            TaskElement::Task(t) => &t.dependencies,
            TaskElement::Group(g) => &g.dependencies,
            TaskElement::Milestone(m) => &m.dependencies,
        }
    }

    /// Children of this element; empty for leaves and milestones.
    pub fn children(&self) -> &[TaskElement] {
        match self {
            TaskElement::Group(g) => &g.children,
            _ => &[],
        }
    }

    /// Effective span: own bounds for leaves, derived for groups,
    /// the marked day twice for milestones.
    pub fn span(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match self {
            TaskElement::Task(t) => (t.start, t.end),
            TaskElement::Group(g) => g.derived_span(),
            TaskElement::Milestone(m) => (m.date, m.date),
        }
    }

    /// Depth-first iteration over this element and all descendants.
    pub fn descendants(&self) -> Vec<&TaskElement> {
        let mut result = vec![self];
        if let TaskElement::Group(g) = self {
            for child in &g.children {
                result.extend(child.descendants());
            }
        }
        result
    }

    /// Finds an element by id in this subtree.
    pub fn find(&self, id: &str) -> Option<&TaskElement> {
        self.descendants().into_iter().find(|e| e.id() == id)
    }

    /// All allocations in this subtree.
    pub fn all_allocations(&self) -> Vec<&ResourceAllocation> {
        self.descendants()
            .into_iter()
            .filter_map(|e| match e {
                TaskElement::Task(t) => Some(t.allocations.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Mutable visit of every allocation in this subtree.
    pub fn for_each_allocation_mut(&mut self, f: &mut impl FnMut(&mut ResourceAllocation)) {
        match self {
            TaskElement::Task(t) => {
                for allocation in &mut t.allocations {
                    f(allocation);
                }
            }
            TaskElement::Group(g) => {
                for child in &mut g.children {
                    child.for_each_allocation_mut(f);
                }
            }
            TaskElement::Milestone(_) => {}
        }
    }

    /// The group whose direct children contain the given id, searched
    /// from this subtree. `None` for `self` and for unknown ids.
    pub fn parent_of(&self, id: &str) -> Option<&TaskGroup> {
        self.descendants().into_iter().find_map(|e| match e {
            TaskElement::Group(g) if g.children.iter().any(|c| c.id() == id) => Some(g),
            _ => None,
        })
    }

    /// Removes and returns the element with the given id from this
    /// subtree. Does not match `self`.
    pub fn detach(&mut self, id: &str) -> Option<TaskElement> {
        if let TaskElement::Group(g) = self {
            if let Some(pos) = g.children.iter().position(|c| c.id() == id) {
                return Some(g.children.remove(pos));
            }
            for child in &mut g.children {
                if let Some(found) = child.detach(id) {
                    return Some(found);
                }
            }
        }
        None
    }
}

/// Filters a set of elements down to leaf tasks.
pub fn just_tasks<'a>(elements: impl IntoIterator<Item = &'a TaskElement>) -> Vec<&'a Task> {
    elements
        .into_iter()
        .filter_map(|e| match e {
            TaskElement::Task(t) => Some(t),
            _ => None,
        })
        .collect()
}

/// Destination-side index over the dependency edges of a tree.
///
/// Edges are owned by their origin; this index supplies the back
/// references so both directions stay consistent by construction.
#[derive(Debug, Clone, Default)]
pub struct DependencyIndex {
    incoming: HashMap<String, Vec<Dependency>>,
}

impl DependencyIndex {
    /// Builds the index from a tree root.
    pub fn build(root: &TaskElement) -> Self {
        let mut incoming: HashMap<String, Vec<Dependency>> = HashMap::new();
        for element in root.descendants() {
            for dep in element.dependencies() {
                incoming
                    .entry(dep.destination_id.clone())
                    .or_default()
                    .push(dep.clone());
            }
        }
        Self { incoming }
    }

    /// Dependencies arriving at a given element.
    pub fn incoming(&self, destination_id: &str) -> &[Dependency] {
        self.incoming
            .get(destination_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Edges whose endpoint spans do not respect the edge.
    pub fn unrespected<'a>(&self, root: &'a TaskElement) -> Vec<&'a Dependency> {
        let mut spans: HashMap<&str, (Option<NaiveDate>, Option<NaiveDate>)> = HashMap::new();
        for element in root.descendants() {
            spans.insert(element.id(), element.span());
        }
        let mut result = Vec::new();
        for element in root.descendants() {
            for dep in element.dependencies() {
                let origin = spans.get(dep.origin_id.as_str()).copied();
                let destination = spans.get(dep.destination_id.as_str()).copied();
                if let (Some(o), Some(d)) = (origin, destination) {
                    if !dep.is_respected(o, d) {
                        result.push(dep);
                    }
                }
            }
        }
        result
    }
}
