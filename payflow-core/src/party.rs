//! Relationships between an actor and an envelope that grant rights.

use crate::actor::{Actor, Role};
use crate::envelope::Envelope;

/// Who a rule grants a right to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    /// The actor who opened the envelope, whatever their role.
    Requester,
    /// A team lead whose team matches the envelope's team snapshot.
    TeamLeadOfTeam,
    FinanceManager,
}

impl Party {
    pub fn admits(&self, actor: &Actor, envelope: &Envelope) -> bool {
        match self {
            Self::Requester => envelope.is_requested_by(actor),
            Self::TeamLeadOfTeam => {
                actor.role == Role::Teamlead
                    && actor.team_id.is_some()
                    && actor.team_id == envelope.team_id
            }
            Self::FinanceManager => actor.role == Role::FinanceManager,
        }
    }
}
