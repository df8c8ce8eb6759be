//! Request types and their status vocabularies.
//!
//! Each request type belongs to exactly one status family. `Status` is
//! tagged by family, so an envelope cannot hold a status from another
//! family's vocabulary: the only ways to obtain a `Status` for a request
//! type are its initial status and `RequestType::parse_status`.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Kind of financial request carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    AgentRefill,
    Expenses,
    Salary,
    #[serde(alias = "investment")]
    Payout,
}

impl RequestType {
    pub const ALL: [RequestType; 4] = [
        RequestType::AgentRefill,
        RequestType::Expenses,
        RequestType::Salary,
        RequestType::Payout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentRefill => "agent_refill",
            Self::Expenses => "expenses",
            Self::Salary => "salary",
            Self::Payout => "payout",
        }
    }

    pub fn family(&self) -> StatusFamily {
        match self {
            Self::AgentRefill | Self::Expenses => StatusFamily::Request,
            Self::Payout => StatusFamily::Payout,
            Self::Salary => StatusFamily::Salary,
        }
    }

    /// Status a freshly created envelope of this type starts in.
    pub fn initial_status(&self) -> Status {
        match self.family() {
            StatusFamily::Request => Status::Request(RequestStatus::Pending),
            StatusFamily::Payout => Status::Payout(PayoutStatus::Draft),
            StatusFamily::Salary => Status::Salary(SalaryStatus::Pending),
        }
    }

    /// Parse a status name within this type's vocabulary.
    ///
    /// Returns `None` for names that exist only in another family
    /// (e.g. `in_payment` for an expenses request).
    pub fn parse_status(&self, name: &str) -> Option<Status> {
        self.family().parse(name)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent_refill" => Ok(Self::AgentRefill),
            "expenses" => Ok(Self::Expenses),
            "salary" => Ok(Self::Salary),
            "payout" | "investment" => Ok(Self::Payout),
            _ => Err(ParseError::new("request type", s)),
        }
    }
}

/// A status graph shared by one or more request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFamily {
    /// Expenses and agent refills: team lead, then finance.
    Request,
    Payout,
    Salary,
}

impl StatusFamily {
    pub const ALL: [StatusFamily; 3] = [
        StatusFamily::Request,
        StatusFamily::Payout,
        StatusFamily::Salary,
    ];

    pub fn parse(&self, name: &str) -> Option<Status> {
        self.statuses()
            .into_iter()
            .find(|status| status.as_str() == name)
    }

    /// Every member of this family's vocabulary.
    pub fn statuses(&self) -> Vec<Status> {
        match self {
            Self::Request => RequestStatus::ALL.iter().copied().map(Status::Request).collect(),
            Self::Payout => PayoutStatus::ALL.iter().copied().map(Status::Payout).collect(),
            Self::Salary => SalaryStatus::ALL.iter().copied().map(Status::Salary).collect(),
        }
    }

    /// The family's cancellation status, if it has one.
    pub fn cancelled(&self) -> Option<Status> {
        match self {
            Self::Request => Some(Status::Request(RequestStatus::Cancelled)),
            Self::Payout => Some(Status::Payout(PayoutStatus::Cancelled)),
            Self::Salary => None,
        }
    }
}

/// Returns true if `name` is a status in any family.
pub fn is_known_status(name: &str) -> bool {
    StatusFamily::ALL
        .iter()
        .any(|family| family.parse(name).is_some())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    Pending,
    ApprovedByTeamlead,
    RejectedByTeamlead,
    ApprovedByFinance,
    RejectedByFinance,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 7] = [
        RequestStatus::Pending,
        RequestStatus::ApprovedByTeamlead,
        RequestStatus::RejectedByTeamlead,
        RequestStatus::ApprovedByFinance,
        RequestStatus::RejectedByFinance,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ApprovedByTeamlead => "approved_by_teamlead",
            Self::RejectedByTeamlead => "rejected_by_teamlead",
            Self::ApprovedByFinance => "approved_by_finance",
            Self::RejectedByFinance => "rejected_by_finance",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayoutStatus {
    Draft,
    Pending,
    Approved,
    InPayment,
    Completed,
    Rejected,
    Cancelled,
}

impl PayoutStatus {
    pub const ALL: [PayoutStatus; 7] = [
        PayoutStatus::Draft,
        PayoutStatus::Pending,
        PayoutStatus::Approved,
        PayoutStatus::InPayment,
        PayoutStatus::Completed,
        PayoutStatus::Rejected,
        PayoutStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::InPayment => "in_payment",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SalaryStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl SalaryStatus {
    pub const ALL: [SalaryStatus; 4] = [
        SalaryStatus::Pending,
        SalaryStatus::Approved,
        SalaryStatus::Rejected,
        SalaryStatus::Paid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Paid => "paid",
        }
    }
}

/// A status tagged with the family it belongs to.
///
/// Serializes as its bare name (`"approved_by_teamlead"`). There is no
/// `Deserialize` impl: a name alone does not identify the family, so
/// callers go through `RequestType::parse_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Request(RequestStatus),
    Payout(PayoutStatus),
    Salary(SalaryStatus),
}

impl Status {
    pub fn family(&self) -> StatusFamily {
        match self {
            Self::Request(_) => StatusFamily::Request,
            Self::Payout(_) => StatusFamily::Payout,
            Self::Salary(_) => StatusFamily::Salary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request(s) => s.as_str(),
            Self::Payout(s) => s.as_str(),
            Self::Salary(s) => s.as_str(),
        }
    }

    /// Returns true if no non-admin transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Request(
                RequestStatus::RejectedByTeamlead
                    | RequestStatus::RejectedByFinance
                    | RequestStatus::Completed
                    | RequestStatus::Cancelled
            ) | Self::Payout(
                PayoutStatus::Completed | PayoutStatus::Rejected | PayoutStatus::Cancelled
            ) | Self::Salary(SalaryStatus::Rejected | SalaryStatus::Paid)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Request(RequestStatus::Cancelled) | Self::Payout(PayoutStatus::Cancelled)
        )
    }

    /// Short human-readable phrase used in status-change messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Request(RequestStatus::Pending) => "pending team lead review",
            Self::Request(RequestStatus::ApprovedByTeamlead) => "approved by team lead",
            Self::Request(RequestStatus::RejectedByTeamlead) => "rejected by team lead",
            Self::Request(RequestStatus::ApprovedByFinance) => "approved by finance",
            Self::Request(RequestStatus::RejectedByFinance) => "rejected by finance",
            Self::Request(RequestStatus::Completed) => "completed",
            Self::Request(RequestStatus::Cancelled) => "cancelled",
            Self::Payout(PayoutStatus::Draft) => "a draft",
            Self::Payout(PayoutStatus::Pending) => "awaiting finance approval",
            Self::Payout(PayoutStatus::Approved) => "approved",
            Self::Payout(PayoutStatus::InPayment) => "in payment",
            Self::Payout(PayoutStatus::Completed) => "completed",
            Self::Payout(PayoutStatus::Rejected) => "rejected",
            Self::Payout(PayoutStatus::Cancelled) => "cancelled",
            Self::Salary(SalaryStatus::Pending) => "awaiting approval",
            Self::Salary(SalaryStatus::Approved) => "approved",
            Self::Salary(SalaryStatus::Rejected) => "rejected",
            Self::Salary(SalaryStatus::Paid) => "paid",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
