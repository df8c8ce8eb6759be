//! Errors surfaced by workflow operations.

use thiserror::Error;

use payflow_core::{EditError, RequestId, Role, ScopeError, TransitionError, ValidationErrors};

use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// Absent, or outside the actor's scope. The two are never distinguished.
    #[error("request #{0} not found")]
    NotFound(RequestId),

    #[error("{role} may not {operation} requests")]
    Forbidden {
        role: Role,
        operation: &'static str,
    },

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Edit(#[from] EditError),

    /// A conditional write lost its race twice in a row.
    #[error("request #{0} was modified concurrently, try again")]
    Conflict(RequestId),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl WorkflowError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Scope(_) => "scope",
            Self::Transition(TransitionError::IllegalTransition { .. }) => "illegal_transition",
            Self::Transition(TransitionError::InvalidTargetStatus { .. }) => {
                "invalid_target_status"
            }
            Self::Edit(EditError::NotEditable { .. }) => "not_editable",
            Self::Edit(EditError::NoFieldsToUpdate) => "no_fields_to_update",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
        }
    }
}
