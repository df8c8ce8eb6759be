//! The generic request envelope shared by all request subtypes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::actor::Actor;
use crate::error::ParseError;
use crate::ids::{ActorId, DepartmentId, RequestId, TeamId};
use crate::status::{RequestType, Status};

/// Approver fields, stamped exactly once by the transition engine.
///
/// `teamlead_id` and `finance_manager_id` belong to the request family;
/// `approved_by` and `approved_at` to payouts and salaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApproverStamps {
    pub teamlead_id: Option<ActorId>,
    pub finance_manager_id: Option<ActorId>,
    pub approved_by: Option<ActorId>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// A request envelope.
///
/// `status` is private: it is only ever set from the type's initial
/// status, from a parsed name in the type's vocabulary, or by the
/// transition engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub id: RequestId,
    pub request_type: RequestType,
    status: Status,
    pub requester_id: ActorId,
    pub team_id: Option<TeamId>,
    pub department_id: Option<DepartmentId>,
    #[serde(flatten)]
    pub stamps: ApproverStamps,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw envelope columns as read back from storage.
#[derive(Debug, Clone)]
pub struct EnvelopeRecord {
    pub id: RequestId,
    pub request_type: String,
    pub status: String,
    pub requester_id: ActorId,
    pub team_id: Option<TeamId>,
    pub department_id: Option<DepartmentId>,
    pub stamps: ApproverStamps,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Envelope {
    pub fn status(&self) -> Status {
        self.status
    }

    /// Rebuild an envelope from stored columns.
    ///
    /// Fails if the stored status is not in the stored type's vocabulary,
    /// which can only mean the row was corrupted outside this crate.
    pub fn restore(record: EnvelopeRecord) -> Result<Self, ParseError> {
        let request_type: RequestType = record.request_type.parse()?;
        let status = request_type
            .parse_status(&record.status)
            .ok_or_else(|| ParseError::new("status", record.status.clone()))?;
        Ok(Self {
            id: record.id,
            request_type,
            status,
            requester_id: record.requester_id,
            team_id: record.team_id,
            department_id: record.department_id,
            stamps: record.stamps,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_requested_by(&self, actor: &Actor) -> bool {
        self.requester_id == actor.id
    }

    /// Mark the envelope as modified without changing its status.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        debug_assert_eq!(status.family(), self.request_type.family());
        self.status = status;
    }
}

/// An envelope that has not been stored yet and so has no id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEnvelope {
    request_type: RequestType,
    requester_id: ActorId,
    team_id: Option<TeamId>,
    department_id: Option<DepartmentId>,
    created_at: DateTime<Utc>,
}

impl NewEnvelope {
    /// Open a request on behalf of `requester`.
    ///
    /// The organization snapshot is taken here, from the requester's
    /// current profile, and is never recomputed.
    pub fn open(request_type: RequestType, requester: &Actor, now: DateTime<Utc>) -> Self {
        Self {
            request_type,
            requester_id: requester.id,
            team_id: requester.team_id,
            department_id: requester.department_id,
            created_at: now,
        }
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// Assign the storage id, producing an envelope in the initial status.
    pub fn into_envelope(self, id: RequestId) -> Envelope {
        Envelope {
            id,
            request_type: self.request_type,
            status: self.request_type.initial_status(),
            requester_id: self.requester_id,
            team_id: self.team_id,
            department_id: self.department_id,
            stamps: ApproverStamps::default(),
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}
