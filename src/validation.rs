//! Structural validation of schedule trees.
//!
//! Checks integrity of an order's tree and allocations before a
//! planning session works on it. Detects:
//! - Duplicate element IDs
//! - Dangling dependency endpoints
//! - Circular dependencies (DAG validation)
//! - Allocation references to unknown resources or criteria
//! - Allocation percentages outside `0..=1`
//! - Malformed assignment-function stretch curves
//!
//! # Reference
//! Cormen et al. (2009), "Introduction to Algorithms", Ch. 22.4 (Topological Sort)

use std::collections::{HashMap, HashSet};

use crate::error::PlanningError;
use crate::models::{AllocationKind, AssignmentFunction, Criterion, Order, ResourceCatalog, TaskElement};

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two tree elements share the same ID.
    DuplicateId,
    /// A dependency endpoint names no element in the tree.
    InvalidDependencyEndpoint,
    /// Dependency graph contains a cycle.
    CyclicDependency,
    /// An allocation references a resource that doesn't exist.
    InvalidResourceReference,
    /// An allocation references a criterion that doesn't exist.
    InvalidCriterionReference,
    /// An allocation percentage lies outside `0..=1`.
    PercentageOutOfRange,
    /// A stretches curve is not monotonically well formed.
    MalformedStretches,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validates an order's schedule tree against a resource catalog and
/// criterion set.
///
/// Checks:
/// 1. No duplicate tree-element IDs
/// 2. Every dependency endpoint resolves inside the tree
/// 3. No circular dependencies
/// 4. Specific allocations name existing resources
/// 5. Generic allocations name existing criteria
/// 6. Allocation percentages lie in `0..=1`
/// 7. Stretch curves end at `(1, 1)` and grow monotonically
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_order(
    order: &Order,
    catalog: &ResourceCatalog,
    criteria: &[Criterion],
) -> ValidationResult {
    let Some(root) = order.associated_task_element() else {
        return Ok(());
    };
    let mut errors = Vec::new();

    let elements: Vec<&TaskElement> = root.descendants();

    let mut ids = HashSet::new();
    for element in &elements {
        if !ids.insert(element.id()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate element ID: {}", element.id()),
            ));
        }
    }

    for element in &elements {
        for dependency in element.dependencies() {
            for endpoint in [&dependency.origin_id, &dependency.destination_id] {
                if !ids.contains(endpoint.as_str()) {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::InvalidDependencyEndpoint,
                        format!(
                            "Element '{}' depends on unknown element '{}'",
                            element.id(),
                            endpoint
                        ),
                    ));
                }
            }
        }
    }

    let criterion_ids: HashSet<&str> = criteria.iter().map(|c| c.id.as_str()).collect();
    for element in &elements {
        let TaskElement::Task(task) = element else {
            continue;
        };
        for allocation in &task.allocations {
            if !(0.0..=1.0).contains(&allocation.percentage) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::PercentageOutOfRange,
                    format!(
                        "Allocation on task '{}' has percentage {}",
                        allocation.task_id, allocation.percentage
                    ),
                ));
            }
            match &allocation.kind {
                AllocationKind::Specific { resource_id } => {
                    if !catalog.contains(resource_id) {
                        errors.push(ValidationError::new(
                            ValidationErrorKind::InvalidResourceReference,
                            format!(
                                "Allocation on task '{}' references unknown resource '{}'",
                                allocation.task_id, resource_id
                            ),
                        ));
                    }
                }
                AllocationKind::Generic { criteria } => {
                    for criterion_id in criteria {
                        if !criterion_ids.contains(criterion_id.as_str()) {
                            errors.push(ValidationError::new(
                                ValidationErrorKind::InvalidCriterionReference,
                                format!(
                                    "Allocation on task '{}' references unknown criterion '{}'",
                                    allocation.task_id, criterion_id
                                ),
                            ));
                        }
                    }
                }
            }
            if let Some(AssignmentFunction::Stretches(function)) = &allocation.function {
                if !function.is_well_formed() {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::MalformedStretches,
                        format!(
                            "Allocation on task '{}' carries a malformed stretches curve",
                            allocation.task_id
                        ),
                    ));
                }
            }
        }
    }

    if let Some(cycle_err) = detect_cycles(&elements) {
        errors.push(cycle_err);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Like [`validate_order`], folding failures into the crate error so
/// callers on the `?` path get a [`PlanningError::Validation`].
pub fn ensure_valid(
    order: &Order,
    catalog: &ResourceCatalog,
    criteria: &[Criterion],
) -> crate::error::Result<()> {
    validate_order(order, catalog, criteria).map_err(PlanningError::Validation)
}

/// Detects cycles in the dependency graph using DFS.
///
/// # Algorithm
/// Topological sort via DFS. If a back-edge is found (visiting a node
/// currently in the recursion stack), a cycle exists.
fn detect_cycles(elements: &[&TaskElement]) -> Option<ValidationError> {
    // Adjacency list: origin → destinations
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut all_ids: HashSet<&str> = HashSet::new();

    for element in elements {
        all_ids.insert(element.id());
        for dependency in element.dependencies() {
            adj.entry(dependency.origin_id.as_str())
                .or_default()
                .push(dependency.destination_id.as_str());
        }
    }

    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();

    for &node in &all_ids {
        if !visited.contains(node) && has_cycle_dfs(node, &adj, &mut visited, &mut in_stack) {
            return Some(ValidationError::new(
                ValidationErrorKind::CyclicDependency,
                format!("Circular dependency detected involving element '{node}'"),
            ));
        }
    }

    None
}

fn has_cycle_dfs<'a>(
    node: &'a str,
    adj: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    in_stack: &mut HashSet<&'a str>,
) -> bool {
    visited.insert(node);
    in_stack.insert(node);

    if let Some(neighbors) = adj.get(node) {
        for &next in neighbors {
            if in_stack.contains(next) {
                return true; // Back edge → cycle
            }
            if !visited.contains(next) && has_cycle_dfs(next, adj, visited, in_stack) {
                return true;
            }
        }
    }

    in_stack.remove(node);
    false
}
