//! In-memory store implementation.
//!
//! One struct implements every collaborator trait so a single
//! `Arc<InMemoryStores>` can back a whole [`Stores`] bundle. Every
//! trait call bumps a counter, which is how tests assert that a
//! constructed planning state answers traversals without further
//! store access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    CalendarResolver, OrderStore, ResourceStore, ScenarioStore, Stores, TaskSourceStore, TaskStore,
};
use crate::error::{PlanningError, Result};
use crate::models::{
    Calendar, Criterion, Order, OrderVersion, Resource, Scenario, TaskElement, TaskSource,
};

#[derive(Default)]
struct Inner {
    resources: Vec<Resource>,
    criteria: Vec<Criterion>,
    calendars: HashMap<String, Calendar>,
    orders: HashMap<String, Order>,
    scenarios: HashMap<String, Scenario>,
    current_scenario: Option<String>,
    persisted_sources: HashMap<String, TaskSource>,
    removed_sources: Vec<String>,
    reattached: usize,
}

/// In-memory implementation of every store trait.
pub struct InMemoryStores {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
}

impl Default for InMemoryStores {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStores {
    /// Creates empty stores with the main scenario current.
    pub fn new() -> Self {
        let mut inner = Inner::default();
        let main = Scenario::main();
        inner.current_scenario = Some(main.id.clone());
        inner.scenarios.insert(main.id.clone(), main);
        Self {
            inner: Mutex::new(inner),
            calls: AtomicUsize::new(0),
        }
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// How many trait calls have been served.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Seeds a resource.
    pub fn add_resource(&self, resource: Resource) {
        self.inner.lock().unwrap().resources.push(resource);
    }

    /// Seeds a criterion.
    pub fn add_criterion(&self, criterion: Criterion) {
        self.inner.lock().unwrap().criteria.push(criterion);
    }

    /// Seeds a calendar.
    pub fn add_calendar(&self, calendar: Calendar) {
        self.inner
            .lock()
            .unwrap()
            .calendars
            .insert(calendar.id.clone(), calendar);
    }

    /// Seeds an order.
    pub fn add_order(&self, order: Order) {
        self.inner.lock().unwrap().orders.insert(order.id.clone(), order);
    }

    /// Seeds a scenario.
    pub fn add_scenario(&self, scenario: Scenario) {
        self.inner
            .lock()
            .unwrap()
            .scenarios
            .insert(scenario.id.clone(), scenario);
    }

    /// Switches the current scenario.
    pub fn set_current_scenario(&self, scenario_id: &str) {
        self.inner.lock().unwrap().current_scenario = Some(scenario_id.to_string());
    }

    /// Snapshot of a stored scenario, for assertions.
    pub fn scenario(&self, id: &str) -> Option<Scenario> {
        self.inner.lock().unwrap().scenarios.get(id).cloned()
    }

    /// Ids of every persisted task source, for assertions.
    pub fn persisted_source_ids(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.persisted_sources.keys().cloned().collect()
    }

    /// Ids of removed task sources, in removal order.
    pub fn removed_source_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().removed_sources.clone()
    }

    /// How many reattach calls of any kind have been served.
    pub fn reattach_count(&self) -> usize {
        self.inner.lock().unwrap().reattached
    }

    /// Builds a [`Stores`] bundle sharing this instance.
    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            resources: Arc::clone(self) as Arc<dyn ResourceStore>,
            orders: Arc::clone(self) as Arc<dyn OrderStore>,
            tasks: Arc::clone(self) as Arc<dyn TaskStore>,
            task_sources: Arc::clone(self) as Arc<dyn TaskSourceStore>,
            scenarios: Arc::clone(self) as Arc<dyn ScenarioStore>,
            calendars: Arc::clone(self) as Arc<dyn CalendarResolver>,
        }
    }
}

impl ResourceStore for InMemoryStores {
    fn list_all_resources(&self) -> Vec<Resource> {
        self.touch();
        self.inner.lock().unwrap().resources.clone()
    }

    fn list_all_criteria(&self) -> Vec<Criterion> {
        self.touch();
        self.inner.lock().unwrap().criteria.clone()
    }

    fn reattach_resource(&self, _resource: &Resource) {
        self.touch();
        self.inner.lock().unwrap().reattached += 1;
    }
}

impl OrderStore for InMemoryStores {
    fn find_by_id(&self, id: &str) -> Result<Order> {
        self.touch();
        self.inner
            .lock()
            .unwrap()
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| PlanningError::not_found("order", id))
    }

    fn exists_by_name(&self, name: &str) -> bool {
        self.touch();
        self.inner
            .lock()
            .unwrap()
            .orders
            .values()
            .any(|o| o.name == name)
    }

    fn reattach_order(&self, _order: &Order) {
        self.touch();
        self.inner.lock().unwrap().reattached += 1;
    }
}

impl TaskStore for InMemoryStores {
    fn find_children_of(&self, group_id: &str) -> Vec<TaskElement> {
        self.touch();
        let inner = self.inner.lock().unwrap();
        for order in inner.orders.values() {
            let Some(root) = &order.root else { continue };
            if root.id == group_id {
                return root.children.clone();
            }
            let root = TaskElement::Group(root.clone());
            if let Some(TaskElement::Group(found)) = root.find(group_id) {
                return found.children.clone();
            }
        }
        Vec::new()
    }

    fn reattach_task(&self, _element: &TaskElement) {
        self.touch();
        self.inner.lock().unwrap().reattached += 1;
    }
}

impl TaskSourceStore for InMemoryStores {
    fn persist(&self, source: &TaskSource) {
        self.touch();
        self.inner
            .lock()
            .unwrap()
            .persisted_sources
            .insert(source.id.clone(), source.clone());
    }

    fn remove(&self, source_id: &str) {
        self.touch();
        let mut inner = self.inner.lock().unwrap();
        inner.persisted_sources.remove(source_id);
        inner.removed_sources.push(source_id.to_string());
    }

    fn reattach_source(&self, _source: &TaskSource) {
        self.touch();
        self.inner.lock().unwrap().reattached += 1;
    }
}

impl ScenarioStore for InMemoryStores {
    fn current(&self) -> Scenario {
        self.touch();
        let inner = self.inner.lock().unwrap();
        let id = inner
            .current_scenario
            .as_ref()
            .expect("a current scenario is always seeded");
        inner.scenarios[id].clone()
    }

    fn update_derived_scenarios_with_new_version(
        &self,
        previous_version_id: Option<&str>,
        order_id: &str,
        scenario_id: &str,
        new_version: &OrderVersion,
    ) {
        self.touch();
        let mut inner = self.inner.lock().unwrap();

        // Transitive descendants of the originating scenario.
        let mut derived: Vec<String> = Vec::new();
        let mut frontier = vec![scenario_id.to_string()];
        while let Some(current) = frontier.pop() {
            for s in inner.scenarios.values() {
                if s.parent_id.as_deref() == Some(current.as_str()) {
                    derived.push(s.id.clone());
                    frontier.push(s.id.clone());
                }
            }
        }

        for id in derived {
            let scenario = inner.scenarios.get_mut(&id).unwrap();
            let moves = match previous_version_id {
                Some(previous) => scenario
                    .order_version(order_id)
                    .is_some_and(|v| v.id == previous),
                None => scenario.order_version(order_id).is_none(),
            };
            if moves {
                scenario.set_order_version(order_id, new_version.clone());
            }
        }

        // Publish the originating scenario's own mapping.
        if let Some(scenario) = inner.scenarios.get_mut(scenario_id) {
            scenario.set_order_version(order_id, new_version.clone());
        }
    }
}

impl CalendarResolver for InMemoryStores {
    fn resolve(&self, calendar_id: &str) -> Result<Calendar> {
        self.touch();
        self.inner
            .lock()
            .unwrap()
            .calendars
            .get(calendar_id)
            .cloned()
            .ok_or_else(|| PlanningError::not_found("calendar", calendar_id))
    }
}
