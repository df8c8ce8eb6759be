//! The allow-list of non-admin transitions.
//!
//! Each rule names one move and the party permitted to make it. A move
//! that is in the graph but matches no rule for the actor is illegal for
//! that actor. Admin override and requester cancellation are handled in
//! `transition` itself and do not appear here.

use crate::actor::Actor;
use crate::envelope::Envelope;
use crate::party::Party;
use crate::status::{PayoutStatus, RequestStatus, SalaryStatus, Status, StatusFamily};

/// Source side of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromStatus {
    Exactly(Status),
    /// Any status of the family that is not terminal.
    AnyOpen(StatusFamily),
}

impl FromStatus {
    pub fn matches(&self, status: Status) -> bool {
        match self {
            Self::Exactly(s) => *s == status,
            Self::AnyOpen(family) => status.family() == *family && !status.is_terminal(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub from: FromStatus,
    pub to: Status,
    pub party: Party,
}

const fn rule(from: Status, to: Status, party: Party) -> Rule {
    Rule {
        from: FromStatus::Exactly(from),
        to,
        party,
    }
}

const fn req(s: RequestStatus) -> Status {
    Status::Request(s)
}

const fn pay(s: PayoutStatus) -> Status {
    Status::Payout(s)
}

const fn sal(s: SalaryStatus) -> Status {
    Status::Salary(s)
}

pub const ALLOW_LIST: &[Rule] = &[
    // Expenses and agent refills
    rule(
        req(RequestStatus::Pending),
        req(RequestStatus::ApprovedByTeamlead),
        Party::TeamLeadOfTeam,
    ),
    rule(
        req(RequestStatus::Pending),
        req(RequestStatus::RejectedByTeamlead),
        Party::TeamLeadOfTeam,
    ),
    rule(
        req(RequestStatus::Pending),
        req(RequestStatus::Cancelled),
        Party::Requester,
    ),
    rule(
        req(RequestStatus::ApprovedByTeamlead),
        req(RequestStatus::ApprovedByFinance),
        Party::FinanceManager,
    ),
    rule(
        req(RequestStatus::ApprovedByTeamlead),
        req(RequestStatus::RejectedByFinance),
        Party::FinanceManager,
    ),
    rule(
        req(RequestStatus::ApprovedByFinance),
        req(RequestStatus::Completed),
        Party::FinanceManager,
    ),
    // Payouts
    rule(
        pay(PayoutStatus::Draft),
        pay(PayoutStatus::Pending),
        Party::Requester,
    ),
    rule(
        pay(PayoutStatus::Draft),
        pay(PayoutStatus::Approved),
        Party::FinanceManager,
    ),
    rule(
        pay(PayoutStatus::Pending),
        pay(PayoutStatus::Approved),
        Party::FinanceManager,
    ),
    rule(
        pay(PayoutStatus::Approved),
        pay(PayoutStatus::InPayment),
        Party::FinanceManager,
    ),
    rule(
        pay(PayoutStatus::InPayment),
        pay(PayoutStatus::Completed),
        Party::FinanceManager,
    ),
    Rule {
        from: FromStatus::AnyOpen(StatusFamily::Payout),
        to: pay(PayoutStatus::Rejected),
        party: Party::FinanceManager,
    },
    Rule {
        from: FromStatus::AnyOpen(StatusFamily::Payout),
        to: pay(PayoutStatus::Cancelled),
        party: Party::FinanceManager,
    },
    // Salaries
    rule(
        sal(SalaryStatus::Pending),
        sal(SalaryStatus::Approved),
        Party::FinanceManager,
    ),
    rule(
        sal(SalaryStatus::Pending),
        sal(SalaryStatus::Rejected),
        Party::FinanceManager,
    ),
    rule(
        sal(SalaryStatus::Approved),
        sal(SalaryStatus::Paid),
        Party::FinanceManager,
    ),
];

/// First rule permitting `actor` to move `envelope` to `to`, if any.
pub fn permitting_rule(envelope: &Envelope, actor: &Actor, to: Status) -> Option<&'static Rule> {
    let from = envelope.status();
    ALLOW_LIST.iter().find(|rule| {
        rule.to == to && rule.from.matches(from) && rule.party.admits(actor, envelope)
    })
}
