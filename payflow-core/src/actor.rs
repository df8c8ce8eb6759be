//! Authenticated actors and their roles.
//!
//! The core never authenticates anyone. The boundary hands over an actor
//! whose identity and role have already been verified.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::ids::{ActorId, DepartmentId, TeamId};

/// Role of an actor within the organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Creates requests and sees only their own.
    Buyer,
    /// Makes the first approval decision for their team.
    #[serde(alias = "team_lead")]
    Teamlead,
    /// Makes the finance decision and settles approved requests.
    #[serde(alias = "finance")]
    FinanceManager,
    /// Unrestricted, including the transition override.
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Buyer,
        Role::Teamlead,
        Role::FinanceManager,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Teamlead => "teamlead",
            Self::FinanceManager => "finance_manager",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" => Ok(Self::Buyer),
            "teamlead" | "team_lead" => Ok(Self::Teamlead),
            "finance_manager" | "finance" => Ok(Self::FinanceManager),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseError::new("role", s)),
        }
    }
}

/// The caller of a workflow operation.
///
/// `team_id` and `department_id` reflect the actor's *current* profile.
/// They are copied onto an envelope at creation and never consulted for
/// that envelope's organization afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
    pub team_id: Option<TeamId>,
    pub department_id: Option<DepartmentId>,
}

impl Actor {
    pub fn new(id: impl Into<ActorId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            team_id: None,
            department_id: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<TeamId>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_department(mut self, department_id: impl Into<DepartmentId>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
