//! The transition engine.
//!
//! `apply_transition` is a pure function of the envelope as read, the
//! actor and the requested target. It decides whether the move is
//! allowed and computes every side effect (approver stamps, timestamps,
//! the history record), but writes nothing. Persisting the result
//! atomically against the status it was computed from is the caller's job.
//!
//! Checks run in this order:
//! 1. the target must be in the envelope type's vocabulary;
//! 2. admins may apply any move, legal or not (explicit override);
//! 3. the original requester may cancel from any open status;
//! 4. otherwise the move must be a graph edge matched by an allow-list rule.

pub mod graph;
pub mod rules;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::actor::{Actor, Role};
use crate::envelope::Envelope;
use crate::error::TransitionError;
use crate::ids::{ActorId, RequestId};
use crate::party::Party;
use crate::status::{PayoutStatus, RequestStatus, SalaryStatus, Status};

pub use graph::{is_edge, successors};
pub use rules::{permitting_rule, FromStatus, Rule, ALLOW_LIST};

/// Why a transition was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Admin escape hatch: graph and terminal checks are skipped.
    AdminOverride,
    /// The requester cancelling their own open request.
    RequesterCancellation,
    /// An allow-list rule for this party.
    Rule(Party),
}

/// One applied status change, as recorded in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub request_id: RequestId,
    pub from: Status,
    pub to: Status,
    pub actor_id: ActorId,
    pub actor_role: Role,
    pub at: DateTime<Utc>,
}

/// Result of a successful transition decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransition {
    /// The envelope with new status, stamps and `updated_at`.
    pub envelope: Envelope,
    pub change: StatusChange,
    pub authority: Authority,
}

impl AppliedTransition {
    /// Human-readable description of the change.
    pub fn message(&self) -> String {
        let envelope = &self.envelope;
        let mut message = format!(
            "Request #{} ({}) is now {}, changed from {} by {} {}",
            envelope.id,
            envelope.request_type,
            self.change.to.label(),
            self.change.from,
            self.change.actor_role,
            self.change.actor_id
        );
        if self.authority == Authority::AdminOverride && !is_edge(self.change.from, self.change.to)
        {
            message.push_str(" (admin override)");
        }
        message
    }
}

/// Validate and compute a move of `envelope` to the status named `target`.
pub fn apply_transition(
    envelope: &Envelope,
    actor: &Actor,
    target: &str,
    now: DateTime<Utc>,
) -> Result<AppliedTransition, TransitionError> {
    let to = envelope.request_type.parse_status(target).ok_or_else(|| {
        TransitionError::InvalidTargetStatus {
            request_type: envelope.request_type,
            status: target.to_string(),
        }
    })?;
    transition_to(envelope, actor, to, now)
}

/// Like `apply_transition`, for an already-parsed target.
///
/// A target from another family is reported as `InvalidTargetStatus`.
pub fn transition_to(
    envelope: &Envelope,
    actor: &Actor,
    to: Status,
    now: DateTime<Utc>,
) -> Result<AppliedTransition, TransitionError> {
    let authority = authorize(envelope, actor, to)?;
    let from = envelope.status();

    let mut updated = envelope.clone();
    updated.set_status(to);
    stamp_approver(&mut updated, actor, to, now);
    updated.touch(now);

    Ok(AppliedTransition {
        envelope: updated,
        change: StatusChange {
            request_id: envelope.id,
            from,
            to,
            actor_id: actor.id,
            actor_role: actor.role,
            at: now,
        },
        authority,
    })
}

/// Decide whether `actor` may move `envelope` to `to`, without computing effects.
pub fn authorize(
    envelope: &Envelope,
    actor: &Actor,
    to: Status,
) -> Result<Authority, TransitionError> {
    if to.family() != envelope.request_type.family() {
        return Err(TransitionError::InvalidTargetStatus {
            request_type: envelope.request_type,
            status: to.as_str().to_string(),
        });
    }

    if actor.is_admin() {
        return Ok(Authority::AdminOverride);
    }

    let from = envelope.status();

    if to.is_cancelled() && !from.is_terminal() && envelope.is_requested_by(actor) {
        return Ok(Authority::RequesterCancellation);
    }

    if is_edge(from, to) {
        if let Some(rule) = permitting_rule(envelope, actor, to) {
            return Ok(Authority::Rule(rule.party));
        }
    }

    Err(TransitionError::IllegalTransition {
        request_type: envelope.request_type,
        from,
        to,
        role: actor.role,
    })
}

/// Set the approver field belonging to the decision step `to`, once.
fn stamp_approver(envelope: &mut Envelope, actor: &Actor, to: Status, now: DateTime<Utc>) {
    let stamps = &mut envelope.stamps;
    match to {
        Status::Request(RequestStatus::ApprovedByTeamlead | RequestStatus::RejectedByTeamlead) => {
            stamps.teamlead_id.get_or_insert(actor.id);
        }
        Status::Request(RequestStatus::ApprovedByFinance | RequestStatus::RejectedByFinance) => {
            stamps.finance_manager_id.get_or_insert(actor.id);
        }
        Status::Payout(PayoutStatus::Approved) | Status::Salary(SalaryStatus::Approved) => {
            if stamps.approved_by.is_none() {
                stamps.approved_by = Some(actor.id);
                stamps.approved_at = Some(now);
            }
        }
        _ => {}
    }
}
