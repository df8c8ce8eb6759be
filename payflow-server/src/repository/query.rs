//! Listing queries and paginated results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use payflow_core::{ActorId, DepartmentId, Envelope, RequestType, ScopeFilter, TeamId};

/// Optional list filters; all given filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilters {
    /// Status name. Matches in every family that has it.
    pub status: Option<String>,
    pub request_type: Option<RequestType>,
    pub requester_id: Option<ActorId>,
    pub team_id: Option<TeamId>,
    pub department_id: Option<DepartmentId>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub created_to: Option<DateTime<Utc>>,
}

impl ListFilters {
    pub fn admits(&self, envelope: &Envelope) -> bool {
        self.status
            .as_deref()
            .map_or(true, |s| envelope.status().as_str() == s)
            && self
                .request_type
                .map_or(true, |t| envelope.request_type == t)
            && self
                .requester_id
                .map_or(true, |id| envelope.requester_id == id)
            && self
                .team_id
                .map_or(true, |id| envelope.team_id == Some(id))
            && self
                .department_id
                .map_or(true, |id| envelope.department_id == Some(id))
            && self
                .created_from
                .map_or(true, |from| envelope.created_at >= from)
            && self.created_to.map_or(true, |to| envelope.created_at <= to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Id,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Id => "id",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListSort {
    pub field: SortField,
    pub order: SortOrder,
}

/// A fully resolved list query, as handed to a backend.
///
/// `page` is 1-based and `page_size` already clamped by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub scope: ScopeFilter,
    pub filters: ListFilters,
    pub sort: ListSort,
    pub page: u32,
    pub page_size: u32,
}

impl ListQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationInfo {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

impl PaginationInfo {
    pub fn new(page: u32, page_size: u32, total_items: u64) -> Self {
        let size = u64::from(page_size.max(1));
        Self {
            page,
            page_size,
            total_items,
            total_pages: total_items.div_ceil(size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PaginationInfo,
}
