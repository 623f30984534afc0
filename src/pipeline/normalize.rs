//! Normalization: deterministic rules turning a raw metric reply into display
//! fields.
//!
//! This is the only stage with no external dependency at all: a pure
//! function from [`RawMetricRecord`] (taken by value) to a fresh
//! [`FinalMetricRecord`]. Each rule is a small function with its own tests.
//!
//! ## Rule Order
//!
//! 1. Loss override (`net_loss` → `net_income.value`, `operating_loss` →
//!    `operating_income.value`)
//! 2. Magnitude formatting of monetary values (`$1.3B`, `$2.5M`, `$1.5K`)
//! 3. EPS collapses to `$<value>`
//! 4. Gross margin collapses to `<value>%`
//! 5. Growth composition (`12.3% YoY, 4.1% QoQ`) for every group still
//!    structured; a group without growth figures collapses to null
//! 6. Buyback / dividend consolidation into one string
//! 7. Loss fields are gone: [`FinalMetricRecord`] has none
//!
//! Loss override must run before magnitude formatting so the sign of a loss
//! survives into the formatted value.

use crate::metrics::{CapitalReturns, FinalMetricRecord, MetricGroup, RawMetricRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{debug, warn};

/// Apply all normalization rules to a raw record.
pub fn normalize(raw: RawMetricRecord) -> FinalMetricRecord {
    let RawMetricRecord {
        company_name,
        quarter,
        total_revenue,
        earnings_per_share,
        net_income,
        net_loss,
        operating_income,
        operating_loss,
        gross_margin,
        operating_expenses,
        buybacks_and_dividends,
        performance,
    } = raw;

    // Rule 1
    let net_income = apply_loss(net_income, net_loss);
    let operating_income = apply_loss(operating_income, operating_loss);

    // Rule 2
    let total_revenue = Slot::with_magnitude(total_revenue);
    let net_income = Slot::with_magnitude(net_income);
    let operating_income = Slot::with_magnitude(operating_income);
    let operating_expenses = Slot::with_magnitude(operating_expenses);
    let returns = FormattedReturns::from(buybacks_and_dividends);

    // Rules 3–4
    let earnings_per_share = collapse_eps(earnings_per_share);
    let gross_margin = collapse_gross_margin(gross_margin);

    // Rules 5–6
    FinalMetricRecord {
        company_name: clean_text(company_name),
        quarter: clean_text(quarter).map(|q| canonical_quarter(&q)),
        total_revenue: total_revenue.finish("total_revenue"),
        earnings_per_share: earnings_per_share.finish("earnings_per_share"),
        net_income: net_income.finish("net_income"),
        operating_income: operating_income.finish("operating_income"),
        gross_margin: gross_margin.finish("gross_margin"),
        operating_expenses: operating_expenses.finish("operating_expenses"),
        buybacks_and_dividends: returns.consolidate(),
        performance: clamp_performance(performance),
    }
}

// ── Metric slots ─────────────────────────────────────────────────────────

/// A metric group part-way through normalization: either still structured
/// (value possibly already formatted) or collapsed to its display value.
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Structured {
        value: Option<String>,
        yoy: Option<f64>,
        qoq: Option<f64>,
    },
    Collapsed(Option<String>),
}

impl Slot {
    fn with_magnitude(group: MetricGroup) -> Self {
        Self::Structured {
            value: group.value.map(|v| magnitude(v).to_string()),
            yoy: group.yoy,
            qoq: group.qoq,
        }
    }

    fn unformatted(group: MetricGroup) -> Self {
        Self::Structured {
            value: group.value.map(format_number),
            yoy: group.yoy,
            qoq: group.qoq,
        }
    }

    /// Rule 5: collapse whatever is still structured.
    fn finish(self, metric: &str) -> Option<String> {
        match self {
            Self::Collapsed(display) => display,
            Self::Structured { value, yoy, qoq } => {
                let composed = compose_growth(yoy, qoq);
                if composed.is_none() {
                    if let Some(value) = value {
                        debug!(metric, %value, "no YoY/QoQ figures; value not reported");
                    }
                }
                composed
            }
        }
    }
}

// ── Rule 1: Loss override ────────────────────────────────────────────────

fn apply_loss(mut group: MetricGroup, loss: Option<f64>) -> MetricGroup {
    if let Some(loss) = loss {
        group.value = Some(loss);
    }
    group
}

// ── Rule 2: Magnitude formatting ─────────────────────────────────────────

/// A monetary amount after magnitude formatting.
#[derive(Debug, Clone, PartialEq)]
pub enum Amount {
    /// `$<quotient><suffix>`, e.g. `$1.3B`.
    Compact(String),
    /// At or below 1,000 in absolute value: left as the raw number.
    Raw(f64),
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compact(s) => f.write_str(s),
            Self::Raw(n) => f.write_str(&format_number(*n)),
        }
    }
}

const MAGNITUDES: [(f64, &str); 3] = [(1e9, "B"), (1e6, "M"), (1e3, "K")];

/// Convert a number to `$<quotient><suffix>` using strictly-greater
/// thresholds: exactly 1,000,000 is `$1000K`, and 1,000 stays raw.
pub fn magnitude(number: f64) -> Amount {
    for (threshold, suffix) in MAGNITUDES {
        if number.abs() > threshold {
            let quotient = format!("{:.2}", number / threshold);
            let quotient = quotient.trim_end_matches('0').trim_end_matches('.');
            return Amount::Compact(format!("${quotient}{suffix}"));
        }
    }
    Amount::Raw(number)
}

/// Render a number the way it appears in JSON: `5` rather than `5.0`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ── Rules 3–4: EPS and gross margin ──────────────────────────────────────

fn collapse_eps(group: MetricGroup) -> Slot {
    match group.value {
        Some(eps) => Slot::Collapsed(Some(format!("${}", format_number(eps)))),
        None => Slot::unformatted(group),
    }
}

fn collapse_gross_margin(group: MetricGroup) -> Slot {
    match group.value {
        Some(margin) => Slot::Collapsed(Some(format!("{}%", format_number(margin)))),
        None => Slot::unformatted(group),
    }
}

// ── Rule 5: Growth composition ───────────────────────────────────────────

/// `"<yoy>% YoY"`, `"<yoy>% YoY, <qoq>% QoQ"`, `"<qoq>% QoQ"` or `None`.
pub fn compose_growth(yoy: Option<f64>, qoq: Option<f64>) -> Option<String> {
    match (yoy, qoq) {
        (Some(y), Some(q)) => Some(format!(
            "{}% YoY, {}% QoQ",
            format_number(y),
            format_number(q)
        )),
        (Some(y), None) => Some(format!("{}% YoY", format_number(y))),
        (None, Some(q)) => Some(format!("{}% QoQ", format_number(q))),
        (None, None) => None,
    }
}

// ── Rule 6: Buybacks and dividends ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct FormattedReturns {
    buybacks: Option<Amount>,
    dividends: Option<Amount>,
    combined: Option<Amount>,
}

impl From<CapitalReturns> for FormattedReturns {
    fn from(r: CapitalReturns) -> Self {
        Self {
            buybacks: r.buybacks.map(magnitude),
            dividends: r.dividends.map(magnitude),
            combined: r.combined.map(magnitude),
        }
    }
}

impl FormattedReturns {
    fn consolidate(self) -> String {
        match (self.buybacks, self.dividends, self.combined) {
            (None, None, Some(combined)) => format!("{combined} Buybacks and Dividends"),
            (Some(b), Some(d), _) => format!("{b} Buybacks, {d} Dividends"),
            (Some(b), None, _) => format!("{b} Buybacks"),
            (None, Some(d), _) => format!("{d} Dividends"),
            (None, None, None) => String::new(),
        }
    }
}

// ── Identity fields ──────────────────────────────────────────────────────

fn clean_text(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

static RE_QUARTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^Q\s*([1-4])[\s\-_/,']*(?:FY\s*'?)?(\d{4})$").unwrap()
});

static RE_QUARTER_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([1-4])\s*Q[\s\-_/,']*(?:FY\s*'?)?(\d{4})$").unwrap());

/// Rewrite common quarter spellings to `Q<digit> <year>`.
///
/// Anything not recognisable is passed through unchanged.
pub fn canonical_quarter(quarter: &str) -> String {
    let q = quarter.trim();
    if let Some(caps) = RE_QUARTER
        .captures(q)
        .or_else(|| RE_QUARTER_SUFFIX.captures(q))
    {
        return format!("Q{} {}", &caps[1], &caps[2]);
    }
    warn!("Quarter {:?} is not in 'Q<n> <year>' form; keeping it as is", q);
    q.to_string()
}

fn clamp_performance(p: Option<f64>) -> Option<f64> {
    p.filter(|p| p.is_finite()).map(|p| p.clamp(-5.0, 5.0))
}
