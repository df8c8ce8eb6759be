//! Workflow use cases.
//!
//! Every operation resolves the actor's scope first and reports anything
//! outside it as not found. Decisions are made by `payflow-core` against
//! the envelope as read, then persisted with a write conditioned on the
//! status they were made from. A lost race is re-evaluated once against
//! the fresh envelope.

mod error;

pub use error::WorkflowError;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use payflow_core::{
    apply_transition, compute_editable_fields, is_known_status, resolve_scope, validate_patch,
    validate_payload, Actor, ActorId, DepartmentId, EditError, Envelope, NewEnvelope, RequestId,
    RequestType, ScopeFilter, StatusChange, TeamId, ValidationErrors,
};

use crate::repository::{
    ConditionalWrite, ListFilters, ListQuery, ListSort, Page, RepositoryError, RequestRepository,
    RequestWrite, SortField, SortOrder, StoredRequest,
};

/// Page size bounds for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Listing parameters as supplied by a caller. Everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub request_type: Option<RequestType>,
    pub requester_id: Option<ActorId>,
    pub team_id: Option<TeamId>,
    pub department_id: Option<DepartmentId>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<SortField>,
    pub order: Option<SortOrder>,
}

/// A stored request after a successful operation, with a message for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub request: StoredRequest,
    pub message: String,
}

/// What an operation decided to write, and the request as it will read
/// afterwards.
struct Decision {
    write: RequestWrite,
    result: StoredRequest,
    message: String,
}

/// Timestamps are kept at millisecond precision, the precision of storage.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Run a status-guarded storage write, retrying once on a storage failure.
///
/// Only writes that are safe to repeat go through here. Corruption is not
/// retried.
async fn retry_once<T, F, Fut>(operation: &'static str, mut attempt: F) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    match attempt().await {
        Err(first @ RepositoryError::Storage { .. }) => {
            warn!("Storage failure during {}, retrying once: {}", operation, first);
            attempt().await.inspect_err(|e| {
                error!("Storage failure during {} after retry: {}", operation, e);
            })
        }
        other => other,
    }
}

pub struct WorkflowService {
    repo: Arc<dyn RequestRepository>,
    limits: PageLimits,
}

impl WorkflowService {
    pub fn new(repo: Arc<dyn RequestRepository>, limits: PageLimits) -> Self {
        Self { repo, limits }
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    /// Open a new request of `request_type` for `actor`.
    ///
    /// The envelope takes its team and department from the actor's current
    /// profile.
    pub async fn create_request(
        &self,
        actor: &Actor,
        request_type: RequestType,
        raw: &Map<String, Value>,
    ) -> Result<Outcome, WorkflowError> {
        resolve_scope(actor)?;
        let payload = validate_payload(request_type, raw)?;
        let envelope = NewEnvelope::open(request_type, actor, now());

        let stored = self.repo.insert(envelope, payload).await?;

        let message = format!(
            "Request #{} ({}) created, now {}",
            stored.envelope.id,
            request_type,
            stored.envelope.status().label()
        );
        info!("{} by {} {}", message, actor.role, actor.id);
        Ok(Outcome {
            request: stored,
            message,
        })
    }

    pub async fn get_request(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<StoredRequest, WorkflowError> {
        let scope = resolve_scope(actor)?;
        self.load_visible(scope, id).await
    }

    pub async fn list_requests(
        &self,
        actor: &Actor,
        params: ListParams,
    ) -> Result<Page<Envelope>, WorkflowError> {
        let scope = resolve_scope(actor)?;
        let query = self.build_query(scope, params)?;
        Ok(self.repo.list(&query).await?)
    }

    /// Change payload fields of a request inside an open edit window.
    ///
    /// Fields outside the actor's mask are dropped. Nothing is written
    /// unless the merged payload is valid as a whole.
    pub async fn update_request_fields(
        &self,
        actor: &Actor,
        id: RequestId,
        raw: &Map<String, Value>,
    ) -> Result<Outcome, WorkflowError> {
        self.decide_and_write(actor, id, |stored, now| {
            let mask = compute_editable_fields(&stored.envelope, actor)?;
            let patch = mask.narrow(validate_patch(stored.envelope.request_type, raw)?)?;

            let mut result = stored.clone();
            result.payload.apply_patch(&patch)?;
            result.envelope.touch(now);

            let fields: Vec<&str> = patch.names().collect();
            Ok(Decision {
                message: format!(
                    "Request #{} ({}) updated: {}",
                    id,
                    result.envelope.request_type,
                    fields.join(", ")
                ),
                write: RequestWrite::Fields {
                    envelope: result.envelope.clone(),
                    payload: result.payload.clone(),
                },
                result,
            })
        })
        .await
    }

    /// Move a request to the status named `target`.
    ///
    /// The stored payload is not rewritten. The returned payload is the one
    /// read when the move was decided.
    pub async fn change_status(
        &self,
        actor: &Actor,
        id: RequestId,
        target: &str,
    ) -> Result<Outcome, WorkflowError> {
        self.decide_and_write(actor, id, |stored, now| {
            let applied = apply_transition(&stored.envelope, actor, target, now).inspect_err(|e| {
                warn!(
                    "Rejected status change of request #{} by {} {}: {}",
                    id, actor.role, actor.id, e
                );
            })?;
            Ok(Decision {
                message: applied.message(),
                result: StoredRequest {
                    envelope: applied.envelope.clone(),
                    payload: stored.payload.clone(),
                },
                write: RequestWrite::Transition {
                    envelope: applied.envelope,
                    change: applied.change,
                },
            })
        })
        .await
    }

    /// Cancel a request. Salary requests have no cancellation status.
    pub async fn cancel_request(&self, actor: &Actor, id: RequestId) -> Result<(), WorkflowError> {
        self.change_status(actor, id, "cancelled").await.map(|_| ())
    }

    /// Delete an open request with its payload and history. Admin only.
    pub async fn delete_request(&self, actor: &Actor, id: RequestId) -> Result<(), WorkflowError> {
        let scope = resolve_scope(actor)?;
        let mut stored = self.load_visible(scope, id).await?;
        if !actor.is_admin() {
            return Err(WorkflowError::Forbidden {
                role: actor.role,
                operation: "delete",
            });
        }

        let repo = self.repo.as_ref();
        let mut reloaded = false;
        loop {
            let status = stored.envelope.status();
            if status.is_terminal() {
                return Err(EditError::NotEditable {
                    status,
                    role: actor.role,
                }
                .into());
            }

            match retry_once("delete", || repo.delete_if_status(id, status)).await? {
                ConditionalWrite::Applied => {
                    info!(
                        "Request #{} ({}) deleted in status {} by {} {}",
                        id, stored.envelope.request_type, status, actor.role, actor.id
                    );
                    return Ok(());
                }
                ConditionalWrite::StatusChanged { current } if !reloaded => {
                    info!(
                        "Request #{} moved to {} before delete, re-evaluating",
                        id, current
                    );
                    reloaded = true;
                    stored = self.load_visible(scope, id).await?;
                }
                ConditionalWrite::StatusChanged { .. } => {
                    warn!("Request #{} changed twice during delete", id);
                    return Err(WorkflowError::Conflict(id));
                }
                ConditionalWrite::Missing => return Err(WorkflowError::NotFound(id)),
            }
        }
    }

    pub async fn get_status_history(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<Vec<StatusChange>, WorkflowError> {
        let scope = resolve_scope(actor)?;
        let stored = self.load_visible(scope, id).await?;
        Ok(self.repo.history(id, stored.envelope.request_type).await?)
    }

    async fn load_visible(
        &self,
        scope: ScopeFilter,
        id: RequestId,
    ) -> Result<StoredRequest, WorkflowError> {
        match self.repo.get(id).await? {
            Some(stored) if scope.admits(&stored.envelope) => Ok(stored),
            _ => Err(WorkflowError::NotFound(id)),
        }
    }

    /// Load, decide, and write conditioned on the status decided from.
    ///
    /// On a lost race the request is reloaded and `decide` runs again. A
    /// second lost race is a `Conflict`.
    async fn decide_and_write<F>(
        &self,
        actor: &Actor,
        id: RequestId,
        mut decide: F,
    ) -> Result<Outcome, WorkflowError>
    where
        F: FnMut(&StoredRequest, DateTime<Utc>) -> Result<Decision, WorkflowError>,
    {
        let scope = resolve_scope(actor)?;
        let mut stored = self.load_visible(scope, id).await?;
        let repo = self.repo.as_ref();
        let mut reloaded = false;

        loop {
            let expected = stored.envelope.status();
            let Decision {
                write,
                result,
                message,
            } = decide(&stored, now())?;

            let outcome =
                retry_once("update", || repo.update_if_status(expected, write.clone())).await?;

            match outcome {
                ConditionalWrite::Applied => {
                    info!("{}", message);
                    return Ok(Outcome {
                        request: result,
                        message,
                    });
                }
                ConditionalWrite::StatusChanged { current } if !reloaded => {
                    info!(
                        "Request #{} moved from {} to {} concurrently, re-evaluating",
                        id, expected, current
                    );
                    reloaded = true;
                    stored = self.load_visible(scope, id).await?;
                }
                ConditionalWrite::StatusChanged { .. } => {
                    warn!("Request #{} lost a second write race", id);
                    return Err(WorkflowError::Conflict(id));
                }
                ConditionalWrite::Missing => return Err(WorkflowError::NotFound(id)),
            }
        }
    }

    fn build_query(&self, scope: ScopeFilter, params: ListParams) -> Result<ListQuery, WorkflowError> {
        let page = match params.page {
            Some(0) => return Err(ValidationErrors::single("page", "must be at least 1").into()),
            Some(page) => page,
            None => 1,
        };
        let page_size = match params.page_size {
            Some(0) => {
                return Err(ValidationErrors::single("page_size", "must be at least 1").into())
            }
            Some(size) => size.min(self.limits.max_page_size),
            None => self.limits.default_page_size,
        };

        if let Some(status) = params.status.as_deref() {
            let known = match params.request_type {
                Some(request_type) => request_type.parse_status(status).is_some(),
                None => is_known_status(status),
            };
            if !known {
                return Err(
                    ValidationErrors::single("status", format!("unknown status '{}'", status))
                        .into(),
                );
            }
        }

        Ok(ListQuery {
            scope,
            filters: ListFilters {
                status: params.status,
                request_type: params.request_type,
                requester_id: params.requester_id,
                team_id: params.team_id,
                department_id: params.department_id,
                created_from: params.created_from,
                created_to: params.created_to,
            },
            sort: ListSort {
                field: params.sort.unwrap_or_default(),
                order: params.order.unwrap_or_default(),
            },
            page,
            page_size,
        })
    }
}
