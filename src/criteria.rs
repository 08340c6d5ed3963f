//! Allocation filter predicates.
//!
//! A small predicate algebra over [`ResourceAllocation`]s, used to
//! recompute resource-load views: select by time interval, by
//! criterion membership, or by resource identity, and compose with
//! [`and`]. Dispatch over specific/generic allocations is an
//! exhaustive match on [`AllocationKind`](crate::models::AllocationKind).

use chrono::{Days, NaiveDate};
use std::fmt::Debug;
use std::sync::Arc;

use crate::models::{ResourceAllocation, ResourceCatalog};

/// A predicate selecting resource allocations.
pub trait AllocationCriteria: Send + Sync + Debug {
    /// Whether the allocation matches.
    fn is_satisfied_by(&self, allocation: &ResourceAllocation) -> bool;
}

/// Matches allocations whose span overlaps `[start, end]`.
///
/// Both bounds inclusive; either bound may be open (unbounded).
#[derive(Debug, Clone)]
pub struct OnInterval {
    /// Earliest day considered (inclusive); `None` = unbounded.
    pub start: Option<NaiveDate>,
    /// Latest day considered (inclusive); `None` = unbounded.
    pub end: Option<NaiveDate>,
}

impl OnInterval {
    /// Creates an interval predicate.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }
}

impl AllocationCriteria for OnInterval {
    fn is_satisfied_by(&self, allocation: &ResourceAllocation) -> bool {
        allocation.overlaps(self.start, self.end)
    }
}

/// Matches generic allocations whose criterion set intersects the
/// given set. Specific allocations never match.
#[derive(Debug, Clone)]
pub struct RelatedWithAnyOf {
    criteria: Vec<String>,
}

impl RelatedWithAnyOf {
    /// Creates the predicate from criterion ids.
    pub fn new(criteria: impl IntoIterator<Item = String>) -> Self {
        Self {
            criteria: criteria.into_iter().collect(),
        }
    }
}

impl AllocationCriteria for RelatedWithAnyOf {
    fn is_satisfied_by(&self, allocation: &ResourceAllocation) -> bool {
        match allocation.criteria() {
            Some(own) => self.criteria.iter().any(|c| own.contains(c)),
            None => false,
        }
    }
}

/// Matches specific allocations that interfere with a criterion over
/// `[start, end)` — the inclusive end bound is advanced one day to
/// make it exclusive.
///
/// Interference is delegated to the allocated resource's criterion
/// satisfaction periods: the allocation matches when its resource
/// satisfies the criterion somewhere inside both the query interval
/// and the allocation's own span. Generic allocations never match.
#[derive(Debug, Clone)]
pub struct SpecificRelatedWithCriterionOnInterval {
    criterion_id: String,
    start: Option<NaiveDate>,
    end_exclusive: Option<NaiveDate>,
    catalog: Arc<ResourceCatalog>,
}

impl SpecificRelatedWithCriterionOnInterval {
    /// Creates the predicate; `end_inclusive` is advanced by one day.
    pub fn new(
        criterion_id: impl Into<String>,
        start: Option<NaiveDate>,
        end_inclusive: Option<NaiveDate>,
        catalog: Arc<ResourceCatalog>,
    ) -> Self {
        Self {
            criterion_id: criterion_id.into(),
            start,
            end_exclusive: end_inclusive.and_then(|e| e.checked_add_days(Days::new(1))),
            catalog,
        }
    }
}

impl AllocationCriteria for SpecificRelatedWithCriterionOnInterval {
    fn is_satisfied_by(&self, allocation: &ResourceAllocation) -> bool {
        if !allocation.is_specific() {
            return false;
        }
        if !allocation.overlaps(self.start, self.end_exclusive) {
            return false;
        }
        let resource_id = match allocation.related_resources().first() {
            Some(id) => id.to_string(),
            None => return false,
        };
        // Clip the query to the allocation span so interference is
        // judged only where the allocation actually runs.
        let start = match self.start {
            Some(s) => Some(s.max(allocation.start)),
            None => Some(allocation.start),
        };
        let end = match self.end_exclusive {
            Some(e) => allocation
                .end
                .checked_add_days(Days::new(1))
                .map(|alloc_end| e.min(alloc_end)),
            None => allocation.end.checked_add_days(Days::new(1)),
        };
        self.catalog
            .get(&resource_id)
            .is_some_and(|r| r.satisfies_during(&self.criterion_id, start, end))
    }
}

/// Matches allocations bound to a resource: specific allocations with
/// that exact binding, or generic allocations whose resolved day
/// assignments currently include it.
#[derive(Debug, Clone)]
pub struct RelatedWithResource {
    resource_id: String,
}

impl RelatedWithResource {
    /// Creates the predicate.
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
        }
    }
}

impl AllocationCriteria for RelatedWithResource {
    fn is_satisfied_by(&self, allocation: &ResourceAllocation) -> bool {
        allocation.assigns_resource(&self.resource_id)
    }
}

/// Conjunction of predicates, short-circuiting on the first failure.
#[derive(Debug)]
pub struct And {
    criteria: Vec<Box<dyn AllocationCriteria>>,
}

impl AllocationCriteria for And {
    fn is_satisfied_by(&self, allocation: &ResourceAllocation) -> bool {
        self.criteria.iter().all(|c| c.is_satisfied_by(allocation))
    }
}

/// Combines predicates into a conjunction.
pub fn and(criteria: Vec<Box<dyn AllocationCriteria>>) -> And {
    And { criteria }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CriterionSatisfaction, DayAssignment, Resource};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn specific() -> ResourceAllocation {
        ResourceAllocation::specific("T1", "R1", 0.5, d(2024, 1, 10), d(2024, 1, 20), "master")
    }

    fn generic() -> ResourceAllocation {
        ResourceAllocation::generic(
            "T2",
            vec!["welder".to_string(), "crane".to_string()],
            1.0,
            d(2024, 1, 10),
            d(2024, 1, 20),
            "master",
        )
    }

    #[test]
    fn test_on_interval() {
        let a = specific();
        assert!(OnInterval::new(None, None).is_satisfied_by(&a));
        assert!(OnInterval::new(Some(d(2024, 1, 20)), None).is_satisfied_by(&a));
        assert!(OnInterval::new(None, Some(d(2024, 1, 10))).is_satisfied_by(&a));
        assert!(!OnInterval::new(Some(d(2024, 1, 21)), None).is_satisfied_by(&a));
        assert!(!OnInterval::new(None, Some(d(2024, 1, 9))).is_satisfied_by(&a));
    }

    #[test]
    fn test_related_with_any_of() {
        let predicate = RelatedWithAnyOf::new(vec!["crane".to_string()]);
        assert!(predicate.is_satisfied_by(&generic()));
        assert!(!predicate.is_satisfied_by(&specific())); // specific never matches

        let disjoint = RelatedWithAnyOf::new(vec!["diver".to_string()]);
        assert!(!disjoint.is_satisfied_by(&generic()));
    }

    #[test]
    fn test_related_with_resource() {
        assert!(RelatedWithResource::new("R1").is_satisfied_by(&specific()));
        assert!(!RelatedWithResource::new("R2").is_satisfied_by(&specific()));

        let g = generic().with_assignment(DayAssignment::new("R7", d(2024, 1, 11), 1.0, "master"));
        assert!(RelatedWithResource::new("R7").is_satisfied_by(&g));
        assert!(!RelatedWithResource::new("R8").is_satisfied_by(&g));
    }

    #[test]
    fn test_specific_related_with_criterion_on_interval() {
        let catalog = Arc::new(ResourceCatalog::new(vec![Resource::new("R1")
            .with_satisfaction(CriterionSatisfaction::between(
                "welder",
                d(2024, 1, 1),
                d(2024, 1, 15),
            ))]));

        let hits = SpecificRelatedWithCriterionOnInterval::new(
            "welder",
            Some(d(2024, 1, 12)),
            Some(d(2024, 1, 30)),
            Arc::clone(&catalog),
        );
        assert!(hits.is_satisfied_by(&specific()));
        assert!(!hits.is_satisfied_by(&generic())); // generic never matches

        // Satisfaction ended before the allocation span overlaps the query.
        let misses = SpecificRelatedWithCriterionOnInterval::new(
            "welder",
            Some(d(2024, 1, 15)),
            Some(d(2024, 1, 30)),
            Arc::clone(&catalog),
        );
        assert!(!misses.is_satisfied_by(&specific()));

        let unknown_criterion = SpecificRelatedWithCriterionOnInterval::new(
            "diver",
            None,
            None,
            Arc::clone(&catalog),
        );
        assert!(!unknown_criterion.is_satisfied_by(&specific()));
    }

    #[test]
    fn test_exclusive_end_advances_one_day() {
        let catalog = Arc::new(ResourceCatalog::new(vec![Resource::new("R1")
            .with_satisfaction(CriterionSatisfaction::between(
                "welder",
                d(2024, 1, 20),
                d(2024, 1, 21),
            ))]));
        // Inclusive end Jan 20 → exclusive Jan 21, so a satisfaction
        // on exactly Jan 20 is still inside the window.
        let predicate = SpecificRelatedWithCriterionOnInterval::new(
            "welder",
            Some(d(2024, 1, 10)),
            Some(d(2024, 1, 20)),
            catalog,
        );
        assert!(predicate.is_satisfied_by(&specific()));
    }

    #[test]
    fn test_and_conjunction() {
        let combined = and(vec![
            Box::new(OnInterval::new(Some(d(2024, 1, 1)), Some(d(2024, 1, 31)))),
            Box::new(RelatedWithResource::new("R1")),
        ]);
        assert!(combined.is_satisfied_by(&specific()));

        let rejecting = and(vec![
            Box::new(OnInterval::new(Some(d(2024, 1, 1)), Some(d(2024, 1, 31)))),
            Box::new(RelatedWithResource::new("R9")),
        ]);
        assert!(!rejecting.is_satisfied_by(&specific()));
    }
}
