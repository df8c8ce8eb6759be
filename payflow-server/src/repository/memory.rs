//! In-memory implementation of `RequestRepository`.
//!
//! All data is held behind one `RwLock` and lost on restart. Conditional
//! writes compare and write under the same write guard.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use payflow_core::{
    Envelope, NewEnvelope, RequestId, RequestType, Status, StatusChange, SubtypePayload,
};

use super::{
    ConditionalWrite, ListQuery, Page, PaginationInfo, RepositoryError, RequestRepository,
    RequestWrite, SortField, SortOrder, StoredRequest,
};

#[derive(Default)]
struct Tables {
    last_id: i64,
    requests: BTreeMap<RequestId, StoredRequest>,
    history: BTreeMap<RequestId, Vec<StatusChange>>,
}

/// In-memory request repository.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(a: &Envelope, b: &Envelope, field: SortField) -> Ordering {
    let primary = match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Id => Ordering::Equal,
    };
    primary.then(a.id.cmp(&b.id))
}

#[async_trait]
impl RequestRepository for InMemoryRepository {
    async fn insert(
        &self,
        envelope: NewEnvelope,
        payload: SubtypePayload,
    ) -> Result<StoredRequest, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.last_id += 1;
        let id = RequestId(tables.last_id);
        let stored = StoredRequest {
            envelope: envelope.into_envelope(id),
            payload,
        };
        tables.requests.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: RequestId) -> Result<Option<StoredRequest>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.requests.get(&id).cloned())
    }

    async fn list(&self, query: &ListQuery) -> Result<Page<Envelope>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&Envelope> = tables
            .requests
            .values()
            .map(|stored| &stored.envelope)
            .filter(|envelope| query.scope.admits(envelope) && query.filters.admits(envelope))
            .collect();

        matching.sort_by(|a, b| {
            let ordering = compare(a, b, query.sort.field);
            match query.sort.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total_items = matching.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(query.page_size as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            pagination: PaginationInfo::new(query.page, query.page_size, total_items),
        })
    }

    async fn update_if_status(
        &self,
        expected: Status,
        write: RequestWrite,
    ) -> Result<ConditionalWrite, RepositoryError> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let id = write.id();

        let Some(stored) = tables.requests.get_mut(&id) else {
            return Ok(ConditionalWrite::Missing);
        };
        let current = stored.envelope.status();
        if current != expected {
            return Ok(ConditionalWrite::StatusChanged { current });
        }

        match write {
            RequestWrite::Transition { envelope, change } => {
                stored.envelope = envelope;
                tables.history.entry(id).or_default().push(change);
            }
            RequestWrite::Fields { envelope, payload } => {
                stored.envelope.touch(envelope.updated_at);
                stored.payload = payload;
            }
        }
        Ok(ConditionalWrite::Applied)
    }

    async fn delete_if_status(
        &self,
        id: RequestId,
        expected: Status,
    ) -> Result<ConditionalWrite, RepositoryError> {
        let mut tables = self.tables.write().await;

        let Some(current) = tables.requests.get(&id).map(|s| s.envelope.status()) else {
            return Ok(ConditionalWrite::Missing);
        };
        if current != expected {
            return Ok(ConditionalWrite::StatusChanged { current });
        }

        tables.requests.remove(&id);
        tables.history.remove(&id);
        Ok(ConditionalWrite::Applied)
    }

    async fn history(
        &self,
        id: RequestId,
        _request_type: RequestType,
    ) -> Result<Vec<StatusChange>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.history.get(&id).cloned().unwrap_or_default())
    }
}
