//! Metric records: the raw reply of the reasoning service and its normalized
//! display form.
//!
//! [`RawMetricRecord`] mirrors the JSON schema sent in the extraction prompt.
//! It is parsed leniently from a `serde_json::Value` by
//! [`RawMetricRecord::from_json`]: nested keys that are missing become null
//! and numbers the model quoted as strings are accepted. Only the top-level
//! shape is mandatory.
//!
//! [`FinalMetricRecord`] is what the normalizer produces and what the export
//! layer turns into a spreadsheet row. It has no loss fields, so a stale loss
//! value can never leak into output.

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level keys every reply must carry, in schema order.
pub const REQUIRED_KEYS: [&str; 12] = [
    "company_name",
    "quarter",
    "total_revenue",
    "earnings_per_share",
    "net_income",
    "net_loss",
    "operating_income",
    "operating_loss",
    "gross_margin",
    "operating_expenses",
    "buybacks_and_dividends",
    "performance",
];

/// A metric with its year-over-year and quarter-over-quarter change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricGroup {
    pub value: Option<f64>,
    pub yoy: Option<f64>,
    pub qoq: Option<f64>,
}

impl MetricGroup {
    pub const fn new(value: Option<f64>, yoy: Option<f64>, qoq: Option<f64>) -> Self {
        Self { value, yoy, qoq }
    }
}

/// Capital returned to shareholders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CapitalReturns {
    pub buybacks: Option<f64>,
    pub dividends: Option<f64>,
    pub combined: Option<f64>,
}

/// The structured reply of the reasoning service, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetricRecord {
    pub company_name: Option<String>,
    pub quarter: Option<String>,
    pub total_revenue: MetricGroup,
    pub earnings_per_share: MetricGroup,
    pub net_income: MetricGroup,
    pub net_loss: Option<f64>,
    pub operating_income: MetricGroup,
    pub operating_loss: Option<f64>,
    pub gross_margin: MetricGroup,
    pub operating_expenses: MetricGroup,
    pub buybacks_and_dividends: CapitalReturns,
    pub performance: Option<f64>,
}

impl RawMetricRecord {
    /// Parse a reply that has already been decoded as JSON.
    ///
    /// # Errors
    /// - [`SchemaError::NotAnObject`] when the reply is not a JSON object
    /// - [`SchemaError::MissingKeys`] when any of [`REQUIRED_KEYS`] is absent
    /// - [`SchemaError::InvalidField`] when a numeric field holds a non-number
    pub fn from_json(reply: &Value) -> Result<Self, SchemaError> {
        let obj = reply.as_object().ok_or_else(|| SchemaError::NotAnObject {
            found: json_kind(reply).to_string(),
        })?;

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|k| !obj.contains_key(**k))
            .map(|k| (*k).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError::MissingKeys(missing));
        }

        Ok(Self {
            company_name: text_field(obj, "company_name")?,
            quarter: text_field(obj, "quarter")?,
            total_revenue: group_field(obj, "total_revenue")?,
            earnings_per_share: group_field(obj, "earnings_per_share")?,
            net_income: group_field(obj, "net_income")?,
            net_loss: number_field(obj.get("net_loss"), "net_loss")?,
            operating_income: group_field(obj, "operating_income")?,
            operating_loss: number_field(obj.get("operating_loss"), "operating_loss")?,
            gross_margin: group_field(obj, "gross_margin")?,
            operating_expenses: group_field(obj, "operating_expenses")?,
            buybacks_and_dividends: capital_field(obj, "buybacks_and_dividends")?,
            performance: number_field(obj.get("performance"), "performance")?,
        })
    }
}

/// The normalized, display-ready record: one spreadsheet row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalMetricRecord {
    pub company_name: Option<String>,
    pub quarter: Option<String>,
    pub total_revenue: Option<String>,
    pub earnings_per_share: Option<String>,
    pub net_income: Option<String>,
    pub operating_income: Option<String>,
    pub gross_margin: Option<String>,
    pub operating_expenses: Option<String>,
    pub buybacks_and_dividends: String,
    pub performance: Option<f64>,
}

// ── Lenient field readers ────────────────────────────────────────────────

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_null_word(s: &str) -> bool {
    s.is_empty()
        || s.eq_ignore_ascii_case("null")
        || s.eq_ignore_ascii_case("none")
        || s.eq_ignore_ascii_case("n/a")
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, SchemaError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!is_null_word(s)).then(|| s.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(SchemaError::InvalidField {
            field: key.to_string(),
            detail: format!("expected string or null, got {}", json_kind(other)),
        }),
    }
}

/// Read a number that may have been quoted: `"1,300,000,000"`, `"42.5%"`,
/// `"$1.25"` and accounting negatives like `"(200)"` are all accepted.
/// Non-finite values (`"NaN"`, `"inf"`) are rejected on either path.
pub(crate) fn number_field(v: Option<&Value>, field: &str) -> Result<Option<f64>, SchemaError> {
    let invalid = |detail: String| SchemaError::InvalidField {
        field: field.to_string(),
        detail,
    };
    let number = match v {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_quoted_number(s).map_err(invalid)?,
        Some(other) => {
            return Err(invalid(format!(
                "expected number or null, got {}",
                json_kind(other)
            )))
        }
    };
    match number {
        Some(n) if !n.is_finite() => Err(invalid(format!("{n} is not a finite number"))),
        n => Ok(n),
    }
}

fn parse_quoted_number(raw: &str) -> Result<Option<f64>, String> {
    let s = raw.trim();
    if is_null_word(s) {
        return Ok(None);
    }
    let (negative, body) = match s.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };
    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | ' '))
        .collect();
    cleaned
        .parse::<f64>()
        .map(|n| Some(if negative { -n } else { n }))
        .map_err(|_| format!("{raw:?}"))
}

fn group_field(obj: &Map<String, Value>, key: &str) -> Result<MetricGroup, SchemaError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(MetricGroup::default()),
        Some(Value::Object(group)) => Ok(MetricGroup {
            value: number_field(group.get("value"), &format!("{key}.value"))?,
            yoy: number_field(group.get("yoy"), &format!("{key}.yoy"))?,
            qoq: number_field(group.get("qoq"), &format!("{key}.qoq"))?,
        }),
        // A bare number is read as the group's value.
        Some(bare @ (Value::Number(_) | Value::String(_))) => Ok(MetricGroup {
            value: number_field(Some(bare), &format!("{key}.value"))?,
            ..Default::default()
        }),
        Some(other) => Err(SchemaError::InvalidField {
            field: key.to_string(),
            detail: format!("expected object, got {}", json_kind(other)),
        }),
    }
}

fn capital_field(obj: &Map<String, Value>, key: &str) -> Result<CapitalReturns, SchemaError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(CapitalReturns::default()),
        Some(Value::Object(group)) => Ok(CapitalReturns {
            buybacks: number_field(group.get("buybacks"), &format!("{key}.buybacks"))?,
            dividends: number_field(group.get("dividends"), &format!("{key}.dividends"))?,
            combined: number_field(group.get("combined"), &format!("{key}.combined"))?,
        }),
        Some(other) => Err(SchemaError::InvalidField {
            field: key.to_string(),
            detail: format!("expected object, got {}", json_kind(other)),
        }),
    }
}
