//! Repository abstraction for request persistence.
//!
//! This module defines the `RequestRepository` trait that abstracts storage
//! of request envelopes, their payloads and their status history. Backends
//! are in-memory (tests and the CLI's dry runs) and SQLite.
//!
//! Every write that depends on the current status is a conditional write:
//! the backend compares the stored status with the status the caller
//! decided from, and applies the write only if they still match.

mod memory;
mod query;
pub mod sqlite;

pub use memory::InMemoryRepository;
pub use query::{ListFilters, ListQuery, ListSort, Page, PaginationInfo, SortField, SortOrder};
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use payflow_core::{Envelope, NewEnvelope, RequestId, RequestType, Status, StatusChange, SubtypePayload};

/// An envelope together with its subtype payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRequest {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub payload: SubtypePayload,
}

/// A write guarded by the stored status.
///
/// Each variant writes only its own columns, so a transition never
/// replaces a payload edited after it was decided, and a field edit never
/// touches status or stamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestWrite {
    /// New status, approver stamps and `updated_at`, with the history entry
    /// for the move.
    Transition {
        envelope: Envelope,
        change: StatusChange,
    },
    /// New payload and `updated_at`.
    Fields {
        envelope: Envelope,
        payload: SubtypePayload,
    },
}

impl RequestWrite {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Transition { envelope, .. } | Self::Fields { envelope, .. } => envelope.id,
        }
    }
}

/// Outcome of a write guarded by the stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalWrite {
    Applied,
    /// The stored status no longer matches; nothing was written.
    StatusChanged { current: Status },
    /// No request with that id exists.
    Missing,
}

/// Errors from a storage backend.
///
/// Lost races are not errors: they are reported as
/// `ConditionalWrite::StatusChanged`.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage error during {operation}: {detail}")]
    Storage {
        operation: &'static str,
        detail: String,
    },

    #[error("corrupt {what} in storage")]
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            detail: detail.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

/// Repository trait for persisting requests.
///
/// Implementations do not enforce scope or workflow rules. They only
/// guarantee that each method is atomic.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Store a new request, assigning its id.
    async fn insert(
        &self,
        envelope: NewEnvelope,
        payload: SubtypePayload,
    ) -> Result<StoredRequest, RepositoryError>;

    /// Get a request by id, returning None if not found.
    async fn get(&self, id: RequestId) -> Result<Option<StoredRequest>, RepositoryError>;

    /// One page of envelopes matching `query`, plus the total match count.
    async fn list(&self, query: &ListQuery) -> Result<Page<Envelope>, RepositoryError>;

    /// Apply `write` if the stored status is still `expected`.
    async fn update_if_status(
        &self,
        expected: Status,
        write: RequestWrite,
    ) -> Result<ConditionalWrite, RepositoryError>;

    /// Delete a request with its payload and history if the stored status is
    /// still `expected`.
    async fn delete_if_status(
        &self,
        id: RequestId,
        expected: Status,
    ) -> Result<ConditionalWrite, RepositoryError>;

    /// Status history of a request, oldest first.
    async fn history(
        &self,
        id: RequestId,
        request_type: RequestType,
    ) -> Result<Vec<StatusChange>, RepositoryError>;
}
