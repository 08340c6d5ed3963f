//! Error taxonomy for planning operations.
//!
//! Four categories, none of them retried:
//! - **Precondition**: a required argument is missing. Raised at the call
//!   that detected it, never silently defaulted.
//! - **IllegalState**: an operation ran against the wrong ownership path
//!   (e.g. a non-owner save on an owner info). The planning state is left
//!   in its pre-call shape.
//! - **NotFound**: lookup of a nonexistent order, version, resource,
//!   criterion, or calendar.
//! - **Validation**: structural integrity failures detected before
//!   planning (see [`crate::validation`]).

use thiserror::Error;

use crate::validation::ValidationError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlanningError>;

/// Errors raised by the planning core.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// A required argument was missing or empty.
    #[error("precondition violated: {0}")]
    Precondition(&'static str),

    /// An operation was attempted in the wrong ownership state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A referenced entity does not exist.
    #[error("{kind} not found: '{id}'")]
    NotFound {
        /// Entity kind (e.g. "order", "resource").
        kind: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// Input failed structural validation.
    #[error("validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),
}

impl PlanningError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Creates an illegal-state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = PlanningError::Precondition("order");
        assert_eq!(e.to_string(), "precondition violated: order");

        let e = PlanningError::not_found("resource", "R9");
        assert_eq!(e.to_string(), "resource not found: 'R9'");

        let e = PlanningError::illegal_state("already owner");
        assert_eq!(e.to_string(), "illegal state: already owner");
    }
}
