//! Status graphs, one per family.
//!
//! The graph says which moves exist at all. Who may make them is decided
//! separately by the allow-list in `rules`.

use crate::status::{PayoutStatus, RequestStatus, SalaryStatus, Status};

/// Statuses directly reachable from `from`.
pub fn successors(from: Status) -> Vec<Status> {
    match from {
        Status::Request(s) => request_successors(s)
            .iter()
            .copied()
            .map(Status::Request)
            .collect(),
        Status::Payout(s) => payout_successors(s)
            .iter()
            .copied()
            .map(Status::Payout)
            .collect(),
        Status::Salary(s) => salary_successors(s)
            .iter()
            .copied()
            .map(Status::Salary)
            .collect(),
    }
}

pub fn is_edge(from: Status, to: Status) -> bool {
    successors(from).contains(&to)
}

fn request_successors(from: RequestStatus) -> &'static [RequestStatus] {
    use RequestStatus::*;
    match from {
        Pending => &[ApprovedByTeamlead, RejectedByTeamlead, Cancelled],
        ApprovedByTeamlead => &[ApprovedByFinance, RejectedByFinance, Cancelled],
        ApprovedByFinance => &[Completed, Cancelled],
        RejectedByTeamlead | RejectedByFinance | Completed | Cancelled => &[],
    }
}

fn payout_successors(from: PayoutStatus) -> &'static [PayoutStatus] {
    use PayoutStatus::*;
    match from {
        Draft => &[Pending, Approved, Rejected, Cancelled],
        Pending => &[Approved, Rejected, Cancelled],
        Approved => &[InPayment, Rejected, Cancelled],
        InPayment => &[Completed, Rejected, Cancelled],
        Completed | Rejected | Cancelled => &[],
    }
}

fn salary_successors(from: SalaryStatus) -> &'static [SalaryStatus] {
    use SalaryStatus::*;
    match from {
        Pending => &[Approved, Rejected],
        Approved => &[Paid],
        Rejected | Paid => &[],
    }
}
