//! Actor identity from trusted gateway headers.
//!
//! The gateway in front of this service authenticates callers and forwards
//! who they are. Nothing here verifies a credential.

use axum::http::HeaderMap;

use payflow_core::{Actor, Role};

use super::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_TEAM_HEADER: &str = "x-actor-team";
pub const ACTOR_DEPARTMENT_HEADER: &str = "x-actor-department";

/// Build the calling actor from request headers.
///
/// Id and role are required. Team and department are optional, but must be
/// integers when present.
#[allow(clippy::result_large_err)]
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let id = header(headers, ACTOR_ID_HEADER)?
        .ok_or_else(|| ApiError::unauthorized("missing X-Actor-Id header"))?;
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::unauthorized("X-Actor-Id must be an integer"))?;

    let role: Role = header(headers, ACTOR_ROLE_HEADER)?
        .ok_or_else(|| ApiError::unauthorized("missing X-Actor-Role header"))?
        .parse()
        .map_err(|e| ApiError::unauthorized(format!("X-Actor-Role: {}", e)))?;

    let mut actor = Actor::new(id, role);
    if let Some(team) = integer(headers, ACTOR_TEAM_HEADER, "X-Actor-Team")? {
        actor = actor.with_team(team);
    }
    if let Some(department) = integer(headers, ACTOR_DEPARTMENT_HEADER, "X-Actor-Department")? {
        actor = actor.with_department(department);
    }
    Ok(actor)
}

/// Trimmed header value; blank counts as absent.
fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::unauthorized(format!("{} is not valid text", name)))?
        .trim();
    Ok((!value.is_empty()).then_some(value))
}

fn integer(headers: &HeaderMap, name: &str, display: &str) -> Result<Option<i64>, ApiError> {
    header(headers, name)?
        .map(|value| {
            value
                .parse()
                .map_err(|_| ApiError::unauthorized(format!("{} must be an integer", display)))
        })
        .transpose()
}
