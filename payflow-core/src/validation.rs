//! Field allow-lists and coercion of raw request payloads.
//!
//! Raw input is a JSON object as received at the boundary. Only the keys
//! listed for the request type are looked at; anything else is dropped
//! without comment. Each kept key is coerced into a typed [`FieldValue`],
//! collecting every failure instead of stopping at the first.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::editability::FieldMask;
use crate::error::{FieldError, ValidationErrors};
use crate::payload::{AllocationLine, SubtypePayload};
use crate::status::RequestType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Positive decimal.
    Amount,
    Text,
    /// `YYYY-MM`.
    Period,
    Flag,
    Allocations,
}

/// One allow-listed field of a subtype payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn field(name: &'static str, kind: FieldKind, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required,
    }
}

const AGENT_REFILL_FIELDS: &[FieldSpec] = &[
    field("amount", FieldKind::Amount, true),
    field("wallet_address", FieldKind::Text, true),
    field("network", FieldKind::Text, true),
    field("agent_name", FieldKind::Text, false),
    field("purpose", FieldKind::Text, false),
    field("urgent", FieldKind::Flag, false),
];

const EXPENSES_FIELDS: &[FieldSpec] = &[
    field("amount", FieldKind::Amount, true),
    field("purpose", FieldKind::Text, true),
    field("category", FieldKind::Text, false),
    field("wallet_address", FieldKind::Text, false),
    field("network", FieldKind::Text, false),
];

const SALARY_FIELDS: &[FieldSpec] = &[
    field("amount", FieldKind::Amount, true),
    field("employee_name", FieldKind::Text, true),
    field("period", FieldKind::Period, true),
    field("wallet_address", FieldKind::Text, true),
    field("network", FieldKind::Text, true),
];

const PAYOUT_FIELDS: &[FieldSpec] = &[
    field("partner_name", FieldKind::Text, true),
    field("total_amount", FieldKind::Amount, true),
    field("wallet_address", FieldKind::Text, true),
    field("network", FieldKind::Text, true),
    field("comment", FieldKind::Text, false),
    field("allocations", FieldKind::Allocations, false),
];

/// The explicit field allow-list of a request type.
pub fn field_specs(request_type: RequestType) -> &'static [FieldSpec] {
    match request_type {
        RequestType::AgentRefill => AGENT_REFILL_FIELDS,
        RequestType::Expenses => EXPENSES_FIELDS,
        RequestType::Salary => SALARY_FIELDS,
        RequestType::Payout => PAYOUT_FIELDS,
    }
}

/// A coerced field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Amount(Decimal),
    Text(String),
    /// An optional text field; `None` clears it.
    OptionalText(Option<String>),
    Flag(bool),
    Allocations(Vec<AllocationLine>),
}

/// A set of coerced, allow-listed fields for one request type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadPatch {
    request_type: RequestType,
    fields: BTreeMap<&'static str, FieldValue>,
}

impl PayloadPatch {
    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }

    pub fn amount(&self, name: &str) -> Option<Decimal> {
        match self.fields.get(name) {
            Some(FieldValue::Amount(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.fields.get(name) {
            Some(FieldValue::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn optional_text(&self, name: &str) -> Option<Option<String>> {
        match self.fields.get(name) {
            Some(FieldValue::OptionalText(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.fields.get(name) {
            Some(FieldValue::Flag(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn allocations(&self, name: &str) -> Option<Vec<AllocationLine>> {
        match self.fields.get(name) {
            Some(FieldValue::Allocations(lines)) => Some(lines.clone()),
            _ => None,
        }
    }

    /// Keep only the fields in `mask`.
    pub fn restrict(mut self, mask: &FieldMask) -> Self {
        self.fields.retain(|name, _| mask.contains(name));
        self
    }
}

/// Validate a complete payload for creating a request of `request_type`.
pub fn validate_payload(
    request_type: RequestType,
    raw: &Map<String, Value>,
) -> Result<SubtypePayload, ValidationErrors> {
    let mut errors = Vec::new();
    let mut fields = BTreeMap::new();

    for spec in field_specs(request_type) {
        match raw.get(spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    errors.push(FieldError::new(spec.name, "is required"));
                }
            }
            Some(value) => match coerce(spec, value) {
                Ok(Some(value)) => {
                    fields.insert(spec.name, value);
                }
                Ok(None) if spec.required => {
                    errors.push(FieldError::new(spec.name, "is required"));
                }
                Ok(None) => {}
                Err(mut field_errors) => errors.append(&mut field_errors),
            },
        }
    }

    if !errors.is_empty() {
        return Err(ValidationErrors(errors));
    }
    SubtypePayload::from_patch(
        request_type,
        &PayloadPatch {
            request_type,
            fields,
        },
    )
}

/// Validate a partial payload for editing a request of `request_type`.
///
/// Absent keys are left out of the patch. An explicit `null` clears an
/// optional field and is rejected for a required one.
pub fn validate_patch(
    request_type: RequestType,
    raw: &Map<String, Value>,
) -> Result<PayloadPatch, ValidationErrors> {
    let mut errors = Vec::new();
    let mut fields = BTreeMap::new();

    for spec in field_specs(request_type) {
        let Some(value) = raw.get(spec.name) else {
            continue;
        };
        match coerce(spec, value) {
            Ok(Some(value)) => {
                fields.insert(spec.name, value);
            }
            Ok(None) if spec.required => {
                errors.push(FieldError::new(spec.name, "cannot be cleared"));
            }
            Ok(None) => {
                if let Some(cleared) = cleared(spec.kind) {
                    fields.insert(spec.name, cleared);
                }
            }
            Err(mut field_errors) => errors.append(&mut field_errors),
        }
    }

    if !errors.is_empty() {
        return Err(ValidationErrors(errors));
    }
    Ok(PayloadPatch {
        request_type,
        fields,
    })
}

/// Value an optional field takes when cleared.
fn cleared(kind: FieldKind) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => Some(FieldValue::OptionalText(None)),
        FieldKind::Allocations => Some(FieldValue::Allocations(Vec::new())),
        FieldKind::Flag => Some(FieldValue::Flag(false)),
        FieldKind::Amount | FieldKind::Period => None,
    }
}

/// Coerce one raw value. `Ok(None)` means the value is blank.
fn coerce(spec: &FieldSpec, value: &Value) -> Result<Option<FieldValue>, Vec<FieldError>> {
    if value.is_null() {
        return Ok(None);
    }
    let single = |message: &str| vec![FieldError::new(spec.name, message)];

    match spec.kind {
        FieldKind::Amount => parse_amount(value)
            .map(|amount| Some(FieldValue::Amount(amount)))
            .map_err(|message| single(message)),
        FieldKind::Text => {
            let text = parse_text(value).map_err(|message| single(message))?;
            Ok(match (text, spec.required) {
                (None, _) => None,
                (Some(text), true) => Some(FieldValue::Text(text)),
                (Some(text), false) => Some(FieldValue::OptionalText(Some(text))),
            })
        }
        FieldKind::Period => {
            let Some(text) = parse_text(value).map_err(|message| single(message))? else {
                return Ok(None);
            };
            if is_period(&text) {
                Ok(Some(FieldValue::Text(text)))
            } else {
                Err(single("must be a month in YYYY-MM format"))
            }
        }
        FieldKind::Flag => parse_flag(value)
            .map(|flag| Some(FieldValue::Flag(flag)))
            .ok_or_else(|| single("must be a boolean")),
        FieldKind::Allocations => {
            parse_allocations(spec.name, value).map(|lines| Some(FieldValue::Allocations(lines)))
        }
    }
}

fn parse_amount(value: &Value) -> Result<Decimal, &'static str> {
    let amount = match value {
        Value::Number(n) => n.to_string().parse::<Decimal>(),
        Value::String(s) => s.trim().parse::<Decimal>(),
        _ => return Err("must be a number"),
    }
    .map_err(|_| "must be a number")?;

    if amount <= Decimal::ZERO {
        return Err("must be greater than zero");
    }
    Ok(amount)
}

/// Trimmed text, or `None` if blank.
fn parse_text(value: &Value) -> Result<Option<String>, &'static str> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        _ => Err("must be a string"),
    }
}

fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn is_period(text: &str) -> bool {
    text.len() == 7 && NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d").is_ok()
}

fn parse_allocations(name: &str, value: &Value) -> Result<Vec<AllocationLine>, Vec<FieldError>> {
    let Value::Array(items) = value else {
        return Err(vec![FieldError::new(name, "must be a list")]);
    };

    let mut errors = Vec::new();
    let mut lines = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let at = |key: &str| format!("{}[{}].{}", name, i, key);
        let Value::Object(line) = item else {
            errors.push(FieldError::new(format!("{}[{}]", name, i), "must be an object"));
            continue;
        };

        let flow = match line.get("flow").filter(|v| !v.is_null()).map(parse_text) {
            Some(Ok(Some(flow))) => Some(flow),
            Some(Err(message)) => {
                errors.push(FieldError::new(at("flow"), message));
                None
            }
            None | Some(Ok(None)) => {
                errors.push(FieldError::new(at("flow"), "is required"));
                None
            }
        };

        let amount = match line.get("amount") {
            None | Some(Value::Null) => {
                errors.push(FieldError::new(at("amount"), "is required"));
                None
            }
            Some(value) => match parse_amount(value) {
                Ok(amount) => Some(amount),
                Err(message) => {
                    errors.push(FieldError::new(at("amount"), message));
                    None
                }
            },
        };

        let conversions = match line.get("conversions") {
            None | Some(Value::Null) => Some(0),
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            Some(_) => None,
        };
        if conversions.is_none() {
            errors.push(FieldError::new(
                at("conversions"),
                "must be a non-negative integer",
            ));
        }

        if let (Some(flow), Some(amount), Some(conversions)) = (flow, amount, conversions) {
            lines.push(AllocationLine {
                flow,
                amount,
                conversions,
            });
        }
    }

    if errors.is_empty() {
        Ok(lines)
    } else {
        Err(errors)
    }
}
