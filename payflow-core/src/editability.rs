//! Who may edit which fields, and when.
//!
//! Edit windows are keyed by status and party and are independent of the
//! transition graph: being allowed to move a request says nothing about
//! being allowed to change its fields, and the reverse.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::actor::Actor;
use crate::envelope::Envelope;
use crate::error::EditError;
use crate::party::Party;
use crate::status::{PayoutStatus, RequestStatus, RequestType, SalaryStatus, Status};
use crate::validation::{field_specs, PayloadPatch};

/// Field names an actor may change on one envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldMask(BTreeSet<&'static str>);

impl FieldMask {
    /// Every allow-listed field of `request_type`.
    pub fn all(request_type: RequestType) -> Self {
        Self(field_specs(request_type).iter().map(|spec| spec.name).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().copied()
    }

    /// Drop the fields of `patch` outside this mask.
    ///
    /// Fails with `NoFieldsToUpdate` if nothing survives.
    pub fn narrow(&self, patch: PayloadPatch) -> Result<PayloadPatch, EditError> {
        let patch = patch.restrict(self);
        if patch.is_empty() {
            return Err(EditError::NoFieldsToUpdate);
        }
        Ok(patch)
    }
}

/// A status in which `party` may edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditWindow {
    pub status: Status,
    pub party: Party,
}

const fn window(status: Status, party: Party) -> EditWindow {
    EditWindow { status, party }
}

pub const EDIT_WINDOWS: &[EditWindow] = &[
    window(
        Status::Request(RequestStatus::ApprovedByTeamlead),
        Party::FinanceManager,
    ),
    window(
        Status::Request(RequestStatus::Pending),
        Party::TeamLeadOfTeam,
    ),
    window(Status::Request(RequestStatus::Pending), Party::Requester),
    window(Status::Payout(PayoutStatus::Draft), Party::FinanceManager),
    window(Status::Payout(PayoutStatus::Pending), Party::FinanceManager),
    window(Status::Payout(PayoutStatus::Draft), Party::Requester),
    window(Status::Salary(SalaryStatus::Pending), Party::FinanceManager),
    window(Status::Salary(SalaryStatus::Pending), Party::Requester),
];

/// Fields `actor` may edit on `envelope` in its current status.
///
/// Admins may always edit every field. Anyone else needs an open window,
/// which grants the whole allow-list of the request type.
pub fn compute_editable_fields(envelope: &Envelope, actor: &Actor) -> Result<FieldMask, EditError> {
    let status = envelope.status();
    let open = actor.is_admin()
        || EDIT_WINDOWS
            .iter()
            .any(|w| w.status == status && w.party.admits(actor, envelope));

    if open {
        Ok(FieldMask::all(envelope.request_type))
    } else {
        Err(EditError::NotEditable {
            status,
            role: actor.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::envelope::{ApproverStamps, EnvelopeRecord};
    use crate::ids::{ActorId, RequestId, TeamId};
    use crate::validation::validate_patch;
    use chrono::Utc;
    use serde_json::json;

    fn envelope(request_type: RequestType, status: &str) -> Envelope {
        let now = Utc::now();
        Envelope::restore(EnvelopeRecord {
            id: RequestId(1),
            request_type: request_type.as_str().to_string(),
            status: status.to_string(),
            requester_id: ActorId(10),
            team_id: Some(TeamId(7)),
            department_id: None,
            stamps: ApproverStamps::default(),
            created_at: now,
            updated_at: now,
        })
        .unwrap()
    }

    fn requester() -> Actor {
        Actor::new(10, Role::Buyer).with_team(7)
    }

    fn finance() -> Actor {
        Actor::new(30, Role::FinanceManager)
    }

    #[test]
    fn test_finance_cannot_edit_pending_request() {
        let env = envelope(RequestType::Expenses, "pending");
        assert_eq!(
            compute_editable_fields(&env, &finance()),
            Err(EditError::NotEditable {
                status: Status::Request(RequestStatus::Pending),
                role: Role::FinanceManager,
            })
        );
    }

    #[test]
    fn test_finance_edits_after_team_lead_approval() {
        let env = envelope(RequestType::Expenses, "approved_by_teamlead");
        let mask = compute_editable_fields(&env, &finance()).unwrap();
        assert!(mask.contains("amount"));
        assert!(mask.contains("purpose"));
        assert!(!mask.contains("status"));

        assert!(compute_editable_fields(&env, &requester()).is_err());
    }

    #[test]
    fn test_request_family_pending_windows() {
        let env = envelope(RequestType::AgentRefill, "pending");
        assert!(compute_editable_fields(&env, &requester()).is_ok());
        assert!(compute_editable_fields(&env, &Actor::new(2, Role::Teamlead).with_team(7)).is_ok());
        assert!(compute_editable_fields(&env, &Actor::new(3, Role::Teamlead).with_team(8)).is_err());
        assert!(compute_editable_fields(&env, &Actor::new(11, Role::Buyer).with_team(7)).is_err());
    }

    #[test]
    fn test_payout_requester_only_edits_drafts() {
        let draft = envelope(RequestType::Payout, "draft");
        let pending = envelope(RequestType::Payout, "pending");
        assert!(compute_editable_fields(&draft, &requester()).is_ok());
        assert!(compute_editable_fields(&pending, &requester()).is_err());
        assert!(compute_editable_fields(&pending, &finance()).is_ok());
        assert!(compute_editable_fields(&envelope(RequestType::Payout, "approved"), &finance()).is_err());
    }

    #[test]
    fn test_salary_windows() {
        let pending = envelope(RequestType::Salary, "pending");
        assert!(compute_editable_fields(&pending, &requester()).is_ok());
        assert!(compute_editable_fields(&pending, &finance()).is_ok());
        let approved = envelope(RequestType::Salary, "approved");
        assert!(compute_editable_fields(&approved, &finance()).is_err());
    }

    #[test]
    fn test_admin_edits_terminal_requests() {
        let env = envelope(RequestType::Expenses, "completed");
        let mask = compute_editable_fields(&env, &Actor::new(1, Role::Admin)).unwrap();
        assert_eq!(mask, FieldMask::all(RequestType::Expenses));
    }

    #[test]
    fn test_narrow_rejects_patch_without_editable_fields() {
        let env = envelope(RequestType::Expenses, "pending");
        let mask = compute_editable_fields(&env, &requester()).unwrap();

        let raw = json!({"status": "completed"});
        let patch = validate_patch(RequestType::Expenses, raw.as_object().unwrap()).unwrap();
        assert_eq!(mask.narrow(patch), Err(EditError::NoFieldsToUpdate));

        let raw = json!({"amount": 5, "requester_id": 1});
        let patch = validate_patch(RequestType::Expenses, raw.as_object().unwrap()).unwrap();
        let narrowed = mask.narrow(patch).unwrap();
        assert_eq!(narrowed.names().collect::<Vec<_>>(), ["amount"]);
    }

    #[test]
    fn test_every_window_is_an_open_status() {
        for w in EDIT_WINDOWS {
            assert!(!w.status.is_terminal(), "{} is terminal", w.status);
        }
    }
}
