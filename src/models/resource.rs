//! Resource and criterion models.
//!
//! Resources are the entities allocations consume capacity from:
//! workers, machines, rooms. Criteria are catalog tags a resource
//! satisfies over date intervals; generic allocations resolve their
//! concrete resources through criterion satisfaction.
//!
//! The catalog itself (creating resources and criteria) is an external
//! collaborator; this module only reads it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::DayAssignment;

/// A catalog tag that resources satisfy over time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Criterion {
    /// Unique criterion identifier.
    pub id: String,
    /// Human-readable name (e.g. "welder", "crane operator").
    pub name: String,
    /// Criterion type grouping (e.g. "SKILL", "LOCATION").
    pub type_name: String,
}

impl Criterion {
    /// Creates a new criterion.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            type_name: String::new(),
        }
    }

    /// Sets the criterion type grouping.
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }
}

/// An interval during which a resource satisfies a criterion.
///
/// `end` is exclusive; `None` means the satisfaction is open-ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionSatisfaction {
    /// Satisfied criterion.
    pub criterion_id: String,
    /// First day of satisfaction (inclusive).
    pub start: NaiveDate,
    /// Day the satisfaction stops (exclusive). `None` = open-ended.
    pub end: Option<NaiveDate>,
}

impl CriterionSatisfaction {
    /// Creates an open-ended satisfaction starting at `start`.
    pub fn from_date(criterion_id: impl Into<String>, start: NaiveDate) -> Self {
        Self {
            criterion_id: criterion_id.into(),
            start,
            end: None,
        }
    }

    /// Creates a bounded satisfaction over [start, end).
    pub fn between(criterion_id: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            criterion_id: criterion_id.into(),
            start,
            end: Some(end),
        }
    }

    /// Whether the satisfaction is active on a given day.
    pub fn active_at(&self, day: NaiveDate) -> bool {
        day >= self.start && self.end.is_none_or(|e| day < e)
    }

    /// Whether the satisfaction overlaps [start, end_exclusive).
    ///
    /// Open bounds on the query side mean unbounded.
    pub fn overlaps(&self, start: Option<NaiveDate>, end_exclusive: Option<NaiveDate>) -> bool {
        let starts_before_query_end = match end_exclusive {
            Some(e) => self.start < e,
            None => true,
        };
        let ends_after_query_start = match (self.end, start) {
            (Some(own_end), Some(s)) => own_end > s,
            _ => true,
        };
        starts_before_query_end && ends_after_query_start
    }
}

/// A resource allocations consume capacity from.
///
/// Besides catalog data, a resource carries the day assignments that
/// reference it across all orders and scenarios, plus the scenario it
/// is currently being read under. Scenario-scoped reads go through
/// [`Resource::assignments_for_scenario`]; the raw index is what the
/// stale-assignment filter of a freshly forked scenario operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Unique resource identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Availability calendar reference.
    pub calendar_id: Option<String>,
    /// Criterion satisfaction intervals.
    pub satisfactions: Vec<CriterionSatisfaction>,
    /// Every day assignment referencing this resource.
    pub assignments: Vec<DayAssignment>,
    /// Scenario this resource is currently read under.
    pub active_scenario: Option<String>,
}

impl Resource {
    /// Creates a new resource.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            calendar_id: None,
            satisfactions: Vec::new(),
            assignments: Vec::new(),
            active_scenario: None,
        }
    }

    /// Sets the resource name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the calendar reference.
    pub fn with_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = Some(calendar_id.into());
        self
    }

    /// Adds a criterion satisfaction interval.
    pub fn with_satisfaction(mut self, satisfaction: CriterionSatisfaction) -> Self {
        self.satisfactions.push(satisfaction);
        self
    }

    /// Binds this resource to a scenario for subsequent reads.
    pub fn use_scenario(&mut self, scenario_id: impl Into<String>) {
        self.active_scenario = Some(scenario_id.into());
    }

    /// Records a day assignment on this resource.
    pub fn add_assignment(&mut self, assignment: DayAssignment) {
        self.assignments.push(assignment);
    }

    /// Day assignments scoped to the active scenario.
    ///
    /// With no active scenario bound, every assignment counts.
    pub fn assignments_for_scenario(&self) -> Vec<&DayAssignment> {
        match &self.active_scenario {
            None => self.assignments.iter().collect(),
            Some(scenario) => self
                .assignments
                .iter()
                .filter(|a| a.scenario_id == *scenario)
                .collect(),
        }
    }

    /// Whether this resource satisfies a criterion on a given day.
    pub fn satisfies(&self, criterion_id: &str, day: NaiveDate) -> bool {
        self.satisfactions
            .iter()
            .any(|s| s.criterion_id == criterion_id && s.active_at(day))
    }

    /// Whether this resource satisfies a criterion at some point
    /// within [start, end_exclusive). Open bounds mean unbounded.
    pub fn satisfies_during(
        &self,
        criterion_id: &str,
        start: Option<NaiveDate>,
        end_exclusive: Option<NaiveDate>,
    ) -> bool {
        self.satisfactions
            .iter()
            .any(|s| s.criterion_id == criterion_id && s.overlaps(start, end_exclusive))
    }
}

/// Id-indexed snapshot of resources.
///
/// Built once per planning state from the catalog collaborator; the
/// filter predicates and the resolve pass look resources up here
/// instead of calling back into the store.
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    resources: HashMap<String, Resource>,
}

impl ResourceCatalog {
    /// Builds a catalog from a resource list.
    pub fn new(resources: impl IntoIterator<Item = Resource>) -> Self {
        Self {
            resources: resources.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// Looks up a resource by id.
    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    /// Whether the catalog contains a resource.
    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    /// Inserts or replaces a resource.
    pub fn insert(&mut self, resource: Resource) {
        self.resources.insert(resource.id.clone(), resource);
    }

    /// Iterates over all resources.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Mutable iteration.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Binds every resource to a scenario for subsequent reads.
    pub fn use_scenario_for_all(&mut self, scenario_id: &str) {
        for resource in self.resources.values_mut() {
            resource.use_scenario(scenario_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_satisfaction_active_at() {
        let open = CriterionSatisfaction::from_date("welder", d(2024, 1, 1));
        assert!(open.active_at(d(2024, 1, 1)));
        assert!(open.active_at(d(2030, 6, 1)));
        assert!(!open.active_at(d(2023, 12, 31)));

        let bounded = CriterionSatisfaction::between("welder", d(2024, 1, 1), d(2024, 2, 1));
        assert!(bounded.active_at(d(2024, 1, 31)));
        assert!(!bounded.active_at(d(2024, 2, 1))); // exclusive end
    }

    #[test]
    fn test_satisfaction_overlap_open_bounds() {
        let s = CriterionSatisfaction::between("c", d(2024, 1, 10), d(2024, 1, 20));
        assert!(s.overlaps(None, None));
        assert!(s.overlaps(Some(d(2024, 1, 15)), None));
        assert!(s.overlaps(None, Some(d(2024, 1, 11))));
        assert!(!s.overlaps(Some(d(2024, 1, 20)), None)); // ends before query
        assert!(!s.overlaps(None, Some(d(2024, 1, 10)))); // starts after query
    }

    #[test]
    fn test_resource_satisfies() {
        let r = Resource::new("R1")
            .with_name("Alice")
            .with_satisfaction(CriterionSatisfaction::between(
                "welder",
                d(2024, 1, 1),
                d(2024, 6, 1),
            ));

        assert!(r.satisfies("welder", d(2024, 3, 1)));
        assert!(!r.satisfies("welder", d(2024, 6, 1)));
        assert!(!r.satisfies("crane", d(2024, 3, 1)));

        assert!(r.satisfies_during("welder", Some(d(2024, 5, 1)), Some(d(2024, 7, 1))));
        assert!(!r.satisfies_during("welder", Some(d(2024, 6, 1)), None));
    }

    #[test]
    fn test_scenario_scoped_assignments() {
        let mut r = Resource::new("R1");
        r.add_assignment(DayAssignment::new("R1", d(2024, 1, 2), 0.5, "s1"));
        r.add_assignment(DayAssignment::new("R1", d(2024, 1, 3), 0.5, "s2"));

        assert_eq!(r.assignments_for_scenario().len(), 2);

        r.use_scenario("s1");
        let scoped = r.assignments_for_scenario();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].day, d(2024, 1, 2));
    }

    #[test]
    fn test_catalog_lookup_and_scenario_binding() {
        let mut catalog = ResourceCatalog::new(vec![Resource::new("R1"), Resource::new("R2")]);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("R1"));
        assert!(catalog.get("R3").is_none());

        catalog.use_scenario_for_all("main");
        assert!(catalog
            .iter()
            .all(|r| r.active_scenario.as_deref() == Some("main")));
    }
}
