//! Resource allocation model.
//!
//! An allocation binds a task to a fraction of resource capacity over a
//! date span, and owns the day assignments produced from it. Two closed
//! variants exist: *specific* (one named resource) and *generic* (a
//! criterion-matched pool resolved dynamically). Operations dispatch by
//! exhaustive match on [`AllocationKind`]; there is no open subclassing.
//!
//! Day assignments carry their own identity and the scenario their
//! facts belong to. When a derived scenario forks an order, every
//! allocation under the order's tree is switched to the new scenario
//! (see [`ResourceAllocation::switch_to_scenario`]).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use super::fresh_id;

/// A (resource, day, quantity) record produced by an allocation.
///
/// `quantity` is a 0..=1 fraction of the resource's daily capacity.
/// Identity is the generated `id`: the stale-assignment filter of a
/// freshly forked scenario works on assignment identity, not value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAssignment {
    /// Generated assignment identity.
    pub id: String,
    /// Resource the capacity is taken from.
    pub resource_id: String,
    /// Calendar day.
    pub day: NaiveDate,
    /// Fraction of the resource's daily capacity (0..=1).
    pub quantity: f64,
    /// Scenario these facts belong to.
    pub scenario_id: String,
}

impl DayAssignment {
    /// Creates a new day assignment with a fresh identity.
    pub fn new(
        resource_id: impl Into<String>,
        day: NaiveDate,
        quantity: f64,
        scenario_id: impl Into<String>,
    ) -> Self {
        Self {
            id: fresh_id(),
            resource_id: resource_id.into(),
            day,
            quantity,
            scenario_id: scenario_id.into(),
        }
    }

    /// Groups assignments by resource id.
    pub fn by_resource<'a>(
        assignments: impl IntoIterator<Item = &'a DayAssignment>,
    ) -> HashMap<String, Vec<&'a DayAssignment>> {
        let mut result: HashMap<String, Vec<&DayAssignment>> = HashMap::new();
        for each in assignments {
            result.entry(each.resource_id.clone()).or_default().push(each);
        }
        result
    }
}

impl PartialEq for DayAssignment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DayAssignment {}

impl Hash for DayAssignment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Which resources an allocation draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationKind {
    /// Bound to exactly one named resource.
    Specific {
        /// The allocated resource.
        resource_id: String,
    },
    /// Bound to a criterion set; concrete resources are resolved
    /// dynamically and may change as resource attributes change.
    Generic {
        /// Criteria the pooled resources must satisfy.
        criteria: BTreeSet<String>,
    },
}

/// A named curve shaping day assignments over the allocation span.
///
/// The numeric behavior of the curve is owned by the allocation
/// engine that produces day assignments; this model stores and serves
/// the definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignmentFunction {
    /// Uniform distribution over the span.
    Flat,
    /// Piecewise distribution defined by stretch points.
    Stretches(StretchesFunction),
}

/// A stretch curve: cumulative (date, work) proportion points.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StretchesFunction {
    /// Curve points, expected in increasing date order.
    pub stretches: Vec<Stretch>,
}

/// One point of a stretch curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stretch {
    /// Cumulative proportion of the span elapsed (0..=1).
    pub date_proportion: f64,
    /// Cumulative proportion of work done by that point (0..=1).
    pub work_proportion: f64,
}

impl StretchesFunction {
    /// Creates a stretch function from points.
    pub fn new(stretches: Vec<Stretch>) -> Self {
        Self { stretches }
    }

    /// Whether the points form a valid cumulative curve: every
    /// proportion in 0..=1 and both axes non-decreasing.
    pub fn is_well_formed(&self) -> bool {
        let in_range = self.stretches.iter().all(|s| {
            (0.0..=1.0).contains(&s.date_proportion) && (0.0..=1.0).contains(&s.work_proportion)
        });
        let monotonic = self.stretches.windows(2).all(|pair| {
            pair[0].date_proportion <= pair[1].date_proportion
                && pair[0].work_proportion <= pair[1].work_proportion
        });
        in_range && monotonic
    }
}

/// An allocation on a dependent, indirect resource (e.g. a machine
/// tied to the worker actually allocated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedAllocation {
    /// Generated identity.
    pub id: String,
    /// The indirect resource.
    pub resource_id: String,
    /// Day assignments on the indirect resource.
    pub assignments: Vec<DayAssignment>,
}

impl DerivedAllocation {
    /// Creates a derived allocation on a resource.
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            id: fresh_id(),
            resource_id: resource_id.into(),
            assignments: Vec::new(),
        }
    }

    /// Adds a day assignment.
    pub fn with_assignment(mut self, assignment: DayAssignment) -> Self {
        self.assignments.push(assignment);
        self
    }
}

/// "This task consumes `percentage` of resource capacity from `start`
/// to `end`", together with the day assignments produced from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAllocation {
    /// Allocation identity.
    pub id: String,
    /// The task this allocation belongs to.
    pub task_id: String,
    /// Fraction of resource capacity consumed (0..=1, not 0..=100).
    pub percentage: f64,
    /// First allocated day (inclusive).
    pub start: NaiveDate,
    /// Last allocated day (inclusive).
    pub end: NaiveDate,
    /// Scenario these scheduling facts belong to.
    pub scenario_id: String,
    /// Specific or generic binding.
    pub kind: AllocationKind,
    /// Owned day assignments.
    pub assignments: Vec<DayAssignment>,
    /// Optional curve shaping the assignments over the span.
    pub function: Option<AssignmentFunction>,
    /// Allocations on dependent, indirect resources.
    pub derived: Vec<DerivedAllocation>,
}

impl ResourceAllocation {
    /// Creates a specific allocation bound to one named resource.
    pub fn specific(
        task_id: impl Into<String>,
        resource_id: impl Into<String>,
        percentage: f64,
        start: NaiveDate,
        end: NaiveDate,
        scenario_id: impl Into<String>,
    ) -> Self {
        Self {
            id: fresh_id(),
            task_id: task_id.into(),
            percentage,
            start,
            end,
            scenario_id: scenario_id.into(),
            kind: AllocationKind::Specific {
                resource_id: resource_id.into(),
            },
            assignments: Vec::new(),
            function: None,
            derived: Vec::new(),
        }
    }

    /// Creates a generic allocation bound to a criterion set.
    pub fn generic(
        task_id: impl Into<String>,
        criteria: impl IntoIterator<Item = String>,
        percentage: f64,
        start: NaiveDate,
        end: NaiveDate,
        scenario_id: impl Into<String>,
    ) -> Self {
        Self {
            id: fresh_id(),
            task_id: task_id.into(),
            percentage,
            start,
            end,
            scenario_id: scenario_id.into(),
            kind: AllocationKind::Generic {
                criteria: criteria.into_iter().collect(),
            },
            assignments: Vec::new(),
            function: None,
            derived: Vec::new(),
        }
    }

    /// Sets the assignment function.
    pub fn with_function(mut self, function: AssignmentFunction) -> Self {
        self.function = Some(function);
        self
    }

    /// Adds a day assignment.
    pub fn with_assignment(mut self, assignment: DayAssignment) -> Self {
        self.assignments.push(assignment);
        self
    }

    /// Adds a derived allocation.
    pub fn with_derived(mut self, derived: DerivedAllocation) -> Self {
        self.derived.push(derived);
        self
    }

    /// Whether this is a generic allocation.
    pub fn is_generic(&self) -> bool {
        matches!(self.kind, AllocationKind::Generic { .. })
    }

    /// Whether this is a specific allocation.
    pub fn is_specific(&self) -> bool {
        matches!(self.kind, AllocationKind::Specific { .. })
    }

    /// Criterion set of a generic allocation; `None` for specific.
    pub fn criteria(&self) -> Option<&BTreeSet<String>> {
        match &self.kind {
            AllocationKind::Generic { criteria } => Some(criteria),
            AllocationKind::Specific { .. } => None,
        }
    }

    /// Whether the allocation span overlaps [start, end], both bounds
    /// inclusive, either bound open (unbounded).
    pub fn overlaps(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
        if let Some(s) = start {
            if self.end < s {
                return false;
            }
        }
        if let Some(e) = end {
            if self.start > e {
                return false;
            }
        }
        true
    }

    /// Distinct resources this allocation currently draws from.
    ///
    /// Specific: the one bound resource. Generic: the resources its
    /// resolved day assignments currently name.
    pub fn related_resources(&self) -> Vec<&str> {
        match &self.kind {
            AllocationKind::Specific { resource_id } => vec![resource_id.as_str()],
            AllocationKind::Generic { .. } => {
                let mut seen = BTreeSet::new();
                for each in &self.assignments {
                    seen.insert(each.resource_id.as_str());
                }
                seen.into_iter().collect()
            }
        }
    }

    /// Whether the resolved day assignments currently include a resource.
    pub fn assigns_resource(&self, resource_id: &str) -> bool {
        match &self.kind {
            AllocationKind::Specific { resource_id: own } => own == resource_id,
            AllocationKind::Generic { .. } => self
                .assignments
                .iter()
                .any(|a| a.resource_id == resource_id),
        }
    }

    /// Day assignments falling on a given day.
    pub fn assignments_on(&self, day: NaiveDate) -> Vec<&DayAssignment> {
        self.assignments.iter().filter(|a| a.day == day).collect()
    }

    /// Summed quantity on a day for one resource.
    pub fn quantity_on(&self, resource_id: &str, day: NaiveDate) -> f64 {
        self.assignments
            .iter()
            .filter(|a| a.resource_id == resource_id && a.day == day)
            .map(|a| a.quantity)
            .sum()
    }

    /// Whether any day exceeds 100% of a resource's daily capacity.
    ///
    /// Callers are expected to run this at save time; it is not a
    /// structural guarantee of the model.
    pub fn utilization_exceeded(&self) -> bool {
        let mut per_day: HashMap<(&str, NaiveDate), f64> = HashMap::new();
        for a in &self.assignments {
            *per_day.entry((a.resource_id.as_str(), a.day)).or_insert(0.0) += a.quantity;
        }
        per_day.values().any(|&q| q > 1.0 + 1e-9)
    }

    /// Rewrites this allocation's scenario binding, including its day
    /// assignments and derived allocations.
    ///
    /// Each assignment takes a fresh identity: any copy of it still
    /// held under the previous scenario (e.g. on a resource) keeps the
    /// old id, so a forked scenario's stale-assignment filter excludes
    /// only those copies, never the switched facts themselves.
    pub fn switch_to_scenario(&mut self, scenario_id: &str) {
        self.scenario_id = scenario_id.to_string();
        for each in &mut self.assignments {
            each.id = fresh_id();
            each.scenario_id = scenario_id.to_string();
        }
        for derived in &mut self.derived {
            for each in &mut derived.assignments {
                each.id = fresh_id();
                each.scenario_id = scenario_id.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn specific() -> ResourceAllocation {
        ResourceAllocation::specific("T1", "R1", 0.5, d(2024, 1, 1), d(2024, 1, 10), "main")
    }

    #[test]
    fn test_day_assignment_identity() {
        let a = DayAssignment::new("R1", d(2024, 1, 1), 0.5, "main");
        let b = DayAssignment::new("R1", d(2024, 1, 1), 0.5, "main");
        assert_ne!(a, b); // same value, distinct identity
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_by_resource_grouping() {
        let assignments = vec![
            DayAssignment::new("R1", d(2024, 1, 1), 0.5, "main"),
            DayAssignment::new("R1", d(2024, 1, 2), 0.5, "main"),
            DayAssignment::new("R2", d(2024, 1, 1), 1.0, "main"),
        ];
        let grouped = DayAssignment::by_resource(&assignments);
        assert_eq!(grouped["R1"].len(), 2);
        assert_eq!(grouped["R2"].len(), 1);
    }

    #[test]
    fn test_overlap_open_bounds() {
        let a = specific(); // spans Jan 1 - Jan 10
        assert!(a.overlaps(None, None));
        assert!(a.overlaps(Some(d(2024, 1, 10)), None)); // inclusive end
        assert!(a.overlaps(None, Some(d(2024, 1, 1)))); // inclusive start
        assert!(!a.overlaps(Some(d(2024, 1, 11)), None));
        assert!(!a.overlaps(None, Some(d(2023, 12, 31))));
    }

    #[test]
    fn test_related_resources_specific() {
        let a = specific();
        assert_eq!(a.related_resources(), vec!["R1"]);
        assert!(a.assigns_resource("R1"));
        assert!(!a.assigns_resource("R2"));
    }

    #[test]
    fn test_related_resources_generic_follow_assignments() {
        let a = ResourceAllocation::generic(
            "T1",
            vec!["welder".to_string()],
            1.0,
            d(2024, 1, 1),
            d(2024, 1, 5),
            "main",
        )
        .with_assignment(DayAssignment::new("R2", d(2024, 1, 1), 1.0, "main"))
        .with_assignment(DayAssignment::new("R3", d(2024, 1, 2), 1.0, "main"))
        .with_assignment(DayAssignment::new("R2", d(2024, 1, 3), 1.0, "main"));

        assert_eq!(a.related_resources(), vec!["R2", "R3"]);
        assert!(a.assigns_resource("R3"));
        assert!(!a.assigns_resource("R1"));
    }

    #[test]
    fn test_utilization_check() {
        let ok = specific()
            .with_assignment(DayAssignment::new("R1", d(2024, 1, 1), 0.5, "main"))
            .with_assignment(DayAssignment::new("R1", d(2024, 1, 1), 0.5, "main"));
        assert!(!ok.utilization_exceeded());
        assert!((ok.quantity_on("R1", d(2024, 1, 1)) - 1.0).abs() < 1e-10);

        let over = specific()
            .with_assignment(DayAssignment::new("R1", d(2024, 1, 1), 0.7, "main"))
            .with_assignment(DayAssignment::new("R1", d(2024, 1, 1), 0.7, "main"));
        assert!(over.utilization_exceeded());
    }

    #[test]
    fn test_switch_to_scenario_rewrites_everything() {
        let mut a = specific()
            .with_assignment(DayAssignment::new("R1", d(2024, 1, 1), 0.5, "main"))
            .with_derived(
                DerivedAllocation::new("M1")
                    .with_assignment(DayAssignment::new("M1", d(2024, 1, 1), 0.2, "main")),
            );
        let old_id = a.assignments[0].id.clone();
        let old_derived_id = a.derived[0].assignments[0].id.clone();

        a.switch_to_scenario("branch");
        assert_eq!(a.scenario_id, "branch");
        assert!(a.assignments.iter().all(|x| x.scenario_id == "branch"));
        assert!(a
            .derived
            .iter()
            .flat_map(|der| der.assignments.iter())
            .all(|x| x.scenario_id == "branch"));
        // Switched assignments are new facts, not relabeled old ones.
        assert_ne!(a.assignments[0].id, old_id);
        assert_ne!(a.derived[0].assignments[0].id, old_derived_id);
    }

    #[test]
    fn test_stretches_well_formed() {
        let good = StretchesFunction::new(vec![
            Stretch {
                date_proportion: 0.3,
                work_proportion: 0.2,
            },
            Stretch {
                date_proportion: 1.0,
                work_proportion: 1.0,
            },
        ]);
        assert!(good.is_well_formed());

        let decreasing = StretchesFunction::new(vec![
            Stretch {
                date_proportion: 0.5,
                work_proportion: 0.6,
            },
            Stretch {
                date_proportion: 0.4,
                work_proportion: 0.8,
            },
        ]);
        assert!(!decreasing.is_well_formed());

        let out_of_range = StretchesFunction::new(vec![Stretch {
            date_proportion: 1.5,
            work_proportion: 0.5,
        }]);
        assert!(!out_of_range.is_well_formed());
    }

    #[test]
    fn test_serde_roundtrip() {
        let a = specific().with_function(AssignmentFunction::Stretches(StretchesFunction::new(
            vec![Stretch {
                date_proportion: 1.0,
                work_proportion: 1.0,
            }],
        )));
        let json = serde_json::to_string(&a).unwrap();
        let back: ResourceAllocation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, a.id);
        assert_eq!(back.kind, a.kind);
        assert_eq!(back.function, a.function);
    }
}
