//! Error types for workflow decisions.
//!
//! These are business-rule failures. None of them is ever retried by the
//! core; the caller adjusts its input instead.

use std::fmt;

use thiserror::Error;

use crate::actor::Role;
use crate::ids::ActorId;
use crate::status::{RequestType, Status};

/// A string did not name a known role, request type or status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// Team leads without a team see nothing, and are told so.
    #[error("team lead {actor_id} has no team assigned")]
    NoTeamAssigned { actor_id: ActorId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{request_type} request cannot move from {from} to {to} as {role}")]
    IllegalTransition {
        request_type: RequestType,
        from: Status,
        to: Status,
        role: Role,
    },

    #[error("'{status}' is not a status of {request_type} requests")]
    InvalidTargetStatus {
        request_type: RequestType,
        status: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("request in status {status} is not editable by {role}")]
    NotEditable { status: Status, role: Role },

    #[error("no editable fields in update")]
    NoFieldsToUpdate,
}

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All field failures found while validating one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![FieldError::new(field, message)])
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    /// Returns true if some error concerns `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid payload")?;
        for (i, error) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
