//! Mapping of workflow errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use payflow_core::{EditError, TransitionError};

use crate::workflow::WorkflowError;

#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed actor headers.
    Unauthorized(String),
    Workflow(WorkflowError),
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Workflow(err) => match err {
                WorkflowError::Validation(_)
                | WorkflowError::Transition(TransitionError::InvalidTargetStatus { .. }) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
                WorkflowError::Forbidden { .. } | WorkflowError::Scope(_) => StatusCode::FORBIDDEN,
                WorkflowError::Transition(TransitionError::IllegalTransition { .. })
                | WorkflowError::Edit(EditError::NotEditable { .. } | EditError::NoFieldsToUpdate)
                | WorkflowError::Conflict(_) => StatusCode::CONFLICT,
                WorkflowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        Self::Workflow(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Unauthorized(message) => json!({
                "error": "unauthorized",
                "message": message,
            }),
            Self::Workflow(WorkflowError::Validation(errors)) => json!({
                "error": "validation",
                "message": errors.to_string(),
                "fields": errors.fields(),
            }),
            Self::Workflow(err @ WorkflowError::Storage(_)) => {
                // Storage detail stays in the log.
                error!("Request failed: {}", err);
                json!({
                    "error": err.kind(),
                    "message": "internal storage error",
                })
            }
            Self::Workflow(err) => json!({
                "error": err.kind(),
                "message": err.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryError;
    use payflow_core::{ActorId, RequestId, RequestType, Role, ScopeError, ValidationErrors};

    fn status_of(err: WorkflowError) -> StatusCode {
        ApiError::from(err).status()
    }

    #[test]
    fn test_workflow_errors_map_to_statuses() {
        assert_eq!(
            status_of(ValidationErrors::single("amount", "is required").into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(
                TransitionError::InvalidTargetStatus {
                    request_type: RequestType::Salary,
                    status: "cancelled".to_string(),
                }
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(WorkflowError::NotFound(RequestId(1))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                ScopeError::NoTeamAssigned {
                    actor_id: ActorId(5)
                }
                .into()
            ),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(WorkflowError::Forbidden {
                role: Role::Buyer,
                operation: "delete",
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(EditError::NoFieldsToUpdate.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(WorkflowError::Conflict(RequestId(1))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(RepositoryError::storage("get", "disk full").into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::unauthorized("missing X-Actor-Id").status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
