//! Payflow approval service: storage, workflow use cases and HTTP API.

pub mod api;
pub mod config;
pub mod repository;
pub mod workflow;

pub use repository::{InMemoryRepository, RequestRepository, SqliteRepository, StoredRequest};
pub use workflow::{ListParams, Outcome, PageLimits, WorkflowError, WorkflowService};
