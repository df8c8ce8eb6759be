//! HTTP API over the workflow service.
//!
//! Every endpoint except `/health` needs actor headers, see `actor`.

pub mod actor;
pub mod error;

pub use actor::actor_from_headers;
pub use error::ApiError;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use payflow_core::{
    compute_editable_fields, Envelope, RequestId, RequestType, StatusChange, ValidationErrors,
};

use crate::repository::{Page, StoredRequest};
use crate::workflow::{ListParams, Outcome, WorkflowError, WorkflowService};

pub struct ApiState {
    pub service: WorkflowService,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub request_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

/// A request as shown to one actor.
#[derive(Debug, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: StoredRequest,
    /// Fields this actor may change right now. Empty outside any edit window.
    pub editable_fields: Vec<&'static str>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/requests", post(create_request).get(list_requests))
        .route(
            "/requests/:id",
            get(get_request).patch(update_request).delete(delete_request),
        )
        .route("/requests/:id/status", post(change_status))
        .route("/requests/:id/cancel", post(cancel_request))
        .route("/requests/:id/history", get(status_history))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "payflow",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn create_request(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<Outcome>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let request_type: RequestType = body.request_type.parse().map_err(|_| {
        WorkflowError::from(ValidationErrors::single(
            "request_type",
            format!("unknown request type '{}'", body.request_type),
        ))
    })?;
    let outcome = state
        .service
        .create_request(&actor, request_type, &body.payload)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn list_requests(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Envelope>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(state.service.list_requests(&actor, params).await?))
}

async fn get_request(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<RequestDetail>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let request = state.service.get_request(&actor, RequestId(id)).await?;
    let editable_fields = compute_editable_fields(&request.envelope, &actor)
        .map(|mask| mask.names().collect())
        .unwrap_or_default();
    Ok(Json(RequestDetail {
        request,
        editable_fields,
    }))
}

async fn update_request(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<Json<Outcome>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let outcome = state
        .service
        .update_request_fields(&actor, RequestId(id), &fields)
        .await?;
    Ok(Json(outcome))
}

async fn change_status(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Outcome>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let outcome = state
        .service
        .change_status(&actor, RequestId(id), body.status.trim())
        .await?;
    Ok(Json(outcome))
}

async fn cancel_request(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.service.cancel_request(&actor, RequestId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_request(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state.service.delete_request(&actor, RequestId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn status_history(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StatusChange>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(
        state
            .service
            .get_status_history(&actor, RequestId(id))
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::repository::InMemoryRepository;
    use crate::workflow::PageLimits;

    struct Caller {
        id: &'static str,
        role: &'static str,
        team: Option<&'static str>,
    }

    const BUYER: Caller = Caller {
        id: "10",
        role: "buyer",
        team: Some("7"),
    };
    const LEAD: Caller = Caller {
        id: "20",
        role: "teamlead",
        team: Some("7"),
    };
    const FINANCE: Caller = Caller {
        id: "30",
        role: "finance_manager",
        team: None,
    };

    fn app() -> Router {
        let service = WorkflowService::new(Arc::new(InMemoryRepository::new()), PageLimits::default());
        router(Arc::new(ApiState { service }))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        caller: Option<&Caller>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder
                .header("X-Actor-Id", caller.id)
                .header("X-Actor-Role", caller.role);
            if let Some(team) = caller.team {
                builder = builder.header("X-Actor-Team", team);
            }
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn create_expense(app: &Router) -> i64 {
        let (status, body) = send(
            app,
            Method::POST,
            "/requests",
            Some(&BUYER),
            Some(json!({
                "request_type": "expenses",
                "payload": { "amount": "75", "purpose": "client dinner" },
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["request"]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_actor() {
        let (status, body) = send(&app(), Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_actor_is_unauthorized() {
        let (status, body) = send(&app(), Method::GET, "/requests", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_create_and_fetch_request() {
        let app = app();
        let id = create_expense(&app).await;

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/requests/{}", id),
            Some(&BUYER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["team_id"], 7);
        assert_eq!(body["payload"]["purpose"], "client dinner");
        assert!(body["editable_fields"]
            .as_array()
            .unwrap()
            .contains(&json!("amount")));

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/requests/{}", id),
            Some(&FINANCE),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["editable_fields"], json!([]));
    }

    #[tokio::test]
    async fn test_invalid_payload_reports_fields() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/requests",
            Some(&BUYER),
            Some(json!({ "request_type": "expenses", "payload": { "amount": "abc" } })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation");
        let fields: Vec<&str> = body["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, ["amount", "purpose"]);
    }

    #[tokio::test]
    async fn test_unknown_request_type_is_unprocessable() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/requests",
            Some(&BUYER),
            Some(json!({ "request_type": "loan", "payload": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"][0]["field"], "request_type");
    }

    #[tokio::test]
    async fn test_status_changes_and_error_mapping() {
        let app = app();
        let id = create_expense(&app).await;
        let status_uri = format!("/requests/{}/status", id);

        let (status, body) = send(
            &app,
            Method::POST,
            &status_uri,
            Some(&BUYER),
            Some(json!({ "status": "approved_by_teamlead" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "illegal_transition");

        let (status, body) = send(
            &app,
            Method::POST,
            &status_uri,
            Some(&LEAD),
            Some(json!({ "status": "in_payment" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_target_status");

        let (status, body) = send(
            &app,
            Method::POST,
            &status_uri,
            Some(&LEAD),
            Some(json!({ "status": "approved_by_teamlead" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request"]["status"], "approved_by_teamlead");
        assert_eq!(body["request"]["teamlead_id"], 20);

        let (status, body) = send(
            &app,
            Method::PATCH,
            &format!("/requests/{}", id),
            Some(&BUYER),
            Some(json!({ "amount": "80" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "not_editable");

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/requests/{}/history", id),
            Some(&BUYER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["to"], "approved_by_teamlead");
        assert_eq!(body[0]["actor_role"], "teamlead");
    }

    #[tokio::test]
    async fn test_cancel_and_delete() {
        let app = app();
        let id = create_expense(&app).await;

        let (status, body) = send(
            &app,
            Method::DELETE,
            &format!("/requests/{}", id),
            Some(&FINANCE),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/requests/{}/cancel", id),
            Some(&BUYER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/requests/{}", id),
            Some(&BUYER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cancelled");
    }

    #[tokio::test]
    async fn test_list_query_parameters() {
        let app = app();
        for _ in 0..3 {
            create_expense(&app).await;
        }

        let (status, body) = send(
            &app,
            Method::GET,
            "/requests?page=2&page_size=2&sort=id&order=asc&status=pending",
            Some(&LEAD),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["items"][0]["id"], 3);
        assert_eq!(body["pagination"]["total_items"], 3);
        assert_eq!(body["pagination"]["total_pages"], 2);

        let (status, body) = send(
            &app,
            Method::GET,
            "/requests?status=lost",
            Some(&LEAD),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"][0]["field"], "status");
    }

    #[tokio::test]
    async fn test_team_lead_without_team_is_forbidden() {
        let lonely = Caller {
            id: "21",
            role: "teamlead",
            team: None,
        };
        let (status, body) = send(&app(), Method::GET, "/requests", Some(&lonely), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "scope");
    }
}
