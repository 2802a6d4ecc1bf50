//! Predict request parsing.
//!
//! The body is parsed by hand rather than through `Json<T>` so that every
//! rejection is a 400 naming the field. Numbers may arrive as JSON numbers or
//! numeric strings; unknown keys are ignored.

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::ratios::FinancialInput;

/// Required monetary fields, in wire names.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "revenue",
    "cogs",
    "operating_expenses",
    "total_assets",
    "total_liabilities",
    "total_equity",
];

/// A validated predict request.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentRequest {
    pub input: FinancialInput,
    /// Caller identity, treated opaquely
    pub user_id: Option<String>,
}

/// Parse and validate a raw request body.
///
/// `require_user` is set when persistence is enabled.
pub fn parse_request(body: &[u8], require_user: bool) -> Result<AssessmentRequest, ValidationError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
    let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let input = FinancialInput {
        revenue: required_number(object, "revenue")?,
        cost_of_goods_sold: required_number(object, "cogs")?,
        operating_expenses: required_number(object, "operating_expenses")?,
        total_assets: required_number(object, "total_assets")?,
        cash: optional_number(object, "cash")?,
        total_liabilities: required_number(object, "total_liabilities")?,
        total_equity: required_number(object, "total_equity")?,
    };

    let user_id = parse_user_id(object.get("user_id"))?;
    if require_user && user_id.is_none() {
        return Err(ValidationError::MissingUserId);
    }

    Ok(AssessmentRequest { input, user_id })
}

fn required_number(object: &Map<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(value) => to_number(value, field),
    }
}

fn optional_number(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<f64>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => to_number(value, field).map(Some),
    }
}

fn to_number(value: &Value, field: &'static str) -> Result<f64, ValidationError> {
    let number = match value {
        Value::Number(n) => n.as_f64().ok_or(ValidationError::NotNumeric(field))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::NotNumeric(field))?,
        _ => return Err(ValidationError::NotNumeric(field)),
    };

    if number.is_finite() {
        Ok(number)
    } else {
        Err(ValidationError::NotFinite(field))
    }
}

fn parse_user_id(value: Option<&Value>) -> Result<Option<String>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        Some(_) => Err(ValidationError::InvalidUserId),
    }
}
