//! Visibility scopes.
//!
//! Scope is resolved before any read or write. Envelopes outside the
//! actor's scope are reported as absent so that their existence does not
//! leak.

use crate::actor::{Actor, Role};
use crate::envelope::Envelope;
use crate::error::ScopeError;
use crate::ids::{ActorId, TeamId};

/// The subset of envelopes an actor may see or act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    Global,
    /// Envelopes opened by this actor.
    Requester(ActorId),
    /// Envelopes whose team snapshot is this team.
    Team(TeamId),
}

/// Compute the scope of `actor`. Pure function of role and assignment.
pub fn resolve_scope(actor: &Actor) -> Result<ScopeFilter, ScopeError> {
    match actor.role {
        Role::Buyer => Ok(ScopeFilter::Requester(actor.id)),
        Role::Teamlead => actor
            .team_id
            .map(ScopeFilter::Team)
            .ok_or(ScopeError::NoTeamAssigned { actor_id: actor.id }),
        Role::FinanceManager | Role::Admin => Ok(ScopeFilter::Global),
    }
}

impl ScopeFilter {
    pub fn admits(&self, envelope: &Envelope) -> bool {
        match self {
            Self::Global => true,
            Self::Requester(id) => envelope.requester_id == *id,
            Self::Team(team) => envelope.team_id == Some(*team),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::NewEnvelope;
    use crate::ids::RequestId;
    use crate::status::RequestType;
    use chrono::Utc;

    #[test]
    fn test_buyer_scope_is_own_requests() {
        let buyer = Actor::new(10, Role::Buyer).with_team(7);
        assert_eq!(
            resolve_scope(&buyer).unwrap(),
            ScopeFilter::Requester(ActorId(10))
        );
    }

    #[test]
    fn test_team_lead_without_team_fails() {
        let lead = Actor::new(2, Role::Teamlead);
        assert_eq!(
            resolve_scope(&lead),
            Err(ScopeError::NoTeamAssigned {
                actor_id: ActorId(2)
            })
        );
    }

    #[test]
    fn test_finance_and_admin_are_global() {
        for role in [Role::FinanceManager, Role::Admin] {
            assert_eq!(
                resolve_scope(&Actor::new(1, role)).unwrap(),
                ScopeFilter::Global
            );
        }
    }

    #[test]
    fn test_team_scope_uses_snapshot_not_requester() {
        let buyer = Actor::new(10, Role::Buyer).with_team(7);
        let envelope =
            NewEnvelope::open(RequestType::Expenses, &buyer, Utc::now()).into_envelope(RequestId(1));

        // The buyer later moved to team 8; the envelope stays with team 7.
        let _moved = buyer.with_team(8);

        assert!(ScopeFilter::Team(TeamId(7)).admits(&envelope));
        assert!(!ScopeFilter::Team(TeamId(8)).admits(&envelope));
        assert!(ScopeFilter::Requester(ActorId(10)).admits(&envelope));
        assert!(!ScopeFilter::Requester(ActorId(11)).admits(&envelope));
        assert!(ScopeFilter::Global.admits(&envelope));
    }
}
