//! Subtype payloads attached one-to-one to an envelope.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FieldError, ValidationErrors};
use crate::status::RequestType;
use crate::validation::PayloadPatch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRefillPayload {
    pub amount: Decimal,
    pub wallet_address: String,
    pub network: String,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub urgent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpensesPayload {
    pub amount: Decimal,
    pub purpose: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryPayload {
    pub amount: Decimal,
    pub employee_name: String,
    /// Pay period as `YYYY-MM`.
    pub period: String,
    pub wallet_address: String,
    pub network: String,
}

/// One line of a payout split across traffic flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub flow: String,
    pub amount: Decimal,
    #[serde(default)]
    pub conversions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPayload {
    pub partner_name: String,
    pub total_amount: Decimal,
    pub wallet_address: String,
    pub network: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub allocations: Vec<AllocationLine>,
}

/// Domain fields of one request, tagged by subtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubtypePayload {
    AgentRefill(AgentRefillPayload),
    Expenses(ExpensesPayload),
    Salary(SalaryPayload),
    Payout(PayoutPayload),
}

impl SubtypePayload {
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::AgentRefill(_) => RequestType::AgentRefill,
            Self::Expenses(_) => RequestType::Expenses,
            Self::Salary(_) => RequestType::Salary,
            Self::Payout(_) => RequestType::Payout,
        }
    }

    /// Headline amount of the request.
    pub fn amount(&self) -> Decimal {
        match self {
            Self::AgentRefill(p) => p.amount,
            Self::Expenses(p) => p.amount,
            Self::Salary(p) => p.amount,
            Self::Payout(p) => p.total_amount,
        }
    }

    /// Build a payload from a complete set of coerced fields.
    pub(crate) fn from_patch(
        request_type: RequestType,
        patch: &PayloadPatch,
    ) -> Result<Self, ValidationErrors> {
        let mut missing = Vec::new();
        let payload = match request_type {
            RequestType::AgentRefill => {
                let amount = required_amount(patch, "amount", &mut missing);
                Self::AgentRefill(AgentRefillPayload {
                    amount,
                    wallet_address: required_text(patch, "wallet_address", &mut missing),
                    network: required_text(patch, "network", &mut missing),
                    agent_name: patch.optional_text("agent_name").flatten(),
                    purpose: patch.optional_text("purpose").flatten(),
                    urgent: patch.flag("urgent").unwrap_or(false),
                })
            }
            RequestType::Expenses => {
                let amount = required_amount(patch, "amount", &mut missing);
                Self::Expenses(ExpensesPayload {
                    amount,
                    purpose: required_text(patch, "purpose", &mut missing),
                    category: patch.optional_text("category").flatten(),
                    wallet_address: patch.optional_text("wallet_address").flatten(),
                    network: patch.optional_text("network").flatten(),
                })
            }
            RequestType::Salary => {
                let amount = required_amount(patch, "amount", &mut missing);
                Self::Salary(SalaryPayload {
                    amount,
                    employee_name: required_text(patch, "employee_name", &mut missing),
                    period: required_text(patch, "period", &mut missing),
                    wallet_address: required_text(patch, "wallet_address", &mut missing),
                    network: required_text(patch, "network", &mut missing),
                })
            }
            RequestType::Payout => {
                let total_amount = required_amount(patch, "total_amount", &mut missing);
                Self::Payout(PayoutPayload {
                    partner_name: required_text(patch, "partner_name", &mut missing),
                    total_amount,
                    wallet_address: required_text(patch, "wallet_address", &mut missing),
                    network: required_text(patch, "network", &mut missing),
                    comment: patch.optional_text("comment").flatten(),
                    allocations: patch.allocations("allocations").unwrap_or_default(),
                })
            }
        };

        if !missing.is_empty() {
            return Err(ValidationErrors(missing));
        }
        payload.check_invariants()?;
        Ok(payload)
    }

    /// Merge coerced fields into this payload and revalidate it.
    ///
    /// On error the payload is left unchanged.
    pub fn apply_patch(&mut self, patch: &PayloadPatch) -> Result<(), ValidationErrors> {
        let mut next = self.clone();
        match &mut next {
            Self::AgentRefill(p) => {
                set(&mut p.amount, patch.amount("amount"));
                set(&mut p.wallet_address, patch.text("wallet_address"));
                set(&mut p.network, patch.text("network"));
                set(&mut p.agent_name, patch.optional_text("agent_name"));
                set(&mut p.purpose, patch.optional_text("purpose"));
                set(&mut p.urgent, patch.flag("urgent"));
            }
            Self::Expenses(p) => {
                set(&mut p.amount, patch.amount("amount"));
                set(&mut p.purpose, patch.text("purpose"));
                set(&mut p.category, patch.optional_text("category"));
                set(&mut p.wallet_address, patch.optional_text("wallet_address"));
                set(&mut p.network, patch.optional_text("network"));
            }
            Self::Salary(p) => {
                set(&mut p.amount, patch.amount("amount"));
                set(&mut p.employee_name, patch.text("employee_name"));
                set(&mut p.period, patch.text("period"));
                set(&mut p.wallet_address, patch.text("wallet_address"));
                set(&mut p.network, patch.text("network"));
            }
            Self::Payout(p) => {
                set(&mut p.partner_name, patch.text("partner_name"));
                set(&mut p.total_amount, patch.amount("total_amount"));
                set(&mut p.wallet_address, patch.text("wallet_address"));
                set(&mut p.network, patch.text("network"));
                set(&mut p.comment, patch.optional_text("comment"));
                set(&mut p.allocations, patch.allocations("allocations"));
            }
        }
        next.check_invariants()?;
        *self = next;
        Ok(())
    }

    /// Whole-payload rules that no single field can check.
    pub fn check_invariants(&self) -> Result<(), ValidationErrors> {
        if let Self::Payout(p) = self {
            if !p.allocations.is_empty() {
                let sum: Decimal = p.allocations.iter().map(|line| line.amount).sum();
                if sum != p.total_amount {
                    return Err(ValidationErrors::single(
                        "allocations",
                        format!(
                            "amounts sum to {} but total_amount is {}",
                            sum.normalize(),
                            p.total_amount.normalize()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn required_amount(
    patch: &PayloadPatch,
    name: &'static str,
    missing: &mut Vec<FieldError>,
) -> Decimal {
    patch.amount(name).unwrap_or_else(|| {
        missing.push(FieldError::new(name, "is required"));
        Decimal::ZERO
    })
}

fn required_text(patch: &PayloadPatch, name: &'static str, missing: &mut Vec<FieldError>) -> String {
    patch.text(name).unwrap_or_else(|| {
        missing.push(FieldError::new(name, "is required"));
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn payout(total: &str, lines: &[&str]) -> SubtypePayload {
        SubtypePayload::Payout(PayoutPayload {
            partner_name: "Acme".to_string(),
            total_amount: dec(total),
            wallet_address: "T123".to_string(),
            network: "TRC20".to_string(),
            comment: None,
            allocations: lines
                .iter()
                .enumerate()
                .map(|(i, amount)| AllocationLine {
                    flow: format!("flow-{}", i),
                    amount: dec(amount),
                    conversions: 3,
                })
                .collect(),
        })
    }

    #[test]
    fn test_allocations_must_sum_to_total() {
        assert!(payout("100", &["60", "40"]).check_invariants().is_ok());
        assert!(payout("100.00", &["60.5", "39.50"]).check_invariants().is_ok());

        let err = payout("100", &["60", "30"]).check_invariants().unwrap_err();
        assert!(err.mentions("allocations"));
        assert_eq!(
            err.fields()[0].message,
            "amounts sum to 90 but total_amount is 100"
        );
    }

    #[test]
    fn test_empty_allocations_are_not_checked() {
        assert!(payout("100", &[]).check_invariants().is_ok());
    }

    #[test]
    fn test_payload_json_is_tagged() {
        let payload = payout("10", &[]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "payout");
        assert_eq!(json["total_amount"], "10");

        let back: SubtypePayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
        assert_eq!(back.request_type(), RequestType::Payout);
        assert_eq!(back.amount(), dec("10"));
    }
}
