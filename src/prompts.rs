//! Extraction prompt for the reasoning service.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth**: the extraction rules and the JSON schema
//!    the reply is parsed against live next to each other, so a new metric
//!    is added in exactly one place (plus [`crate::metrics::REQUIRED_KEYS`]).
//!
//! 2. **Testability**: unit tests inspect the prompt directly without a
//!    live model, so a dropped rule or schema key is caught offline.
//!
//! Callers can override the template via
//! [`crate::config::ExtractionConfig::extraction_prompt`]; it must contain the
//! [`INPUT_PLACEHOLDER`], which is replaced with the prompt body.

/// Replaced by the metadata header and the selected content.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Default extraction prompt.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are a financial data extraction assistant.

Below is content selected from a company's quarterly earnings release, deck or call transcript. Extract the requested financial metrics.

Rules:
- Report a value only when the text states it explicitly. Do not infer missing metrics.
- Exceptions: operating income may be computed as total revenue - cost of revenue - operating expenses, or gross profit - operating expenses; gross margin may be computed from gross profit (total revenue - cost of revenue). Compute them ONLY from figures stated in the text.
- If three of total_revenue, operating_income, gross_margin and operating_expenses are present, derive the fourth.
- Total expenses, and individual expense lines such as R&D or SG&A, are NOT operating expenses.
- Get the order of magnitude right (thousands, millions, billions). If a table's unit is unclear, do not use it.
- Normalize every monetary value to an absolute number in USD (e.g. 1300000000 for $1.3 billion).
- Losses are always negative (e.g. net_loss: -200000000).
- Gross margin, YoY and QoQ are percentage numbers (e.g. 42.5 for 42.5%).
- quarter uses the format "Q<number> <year>" (e.g. "Q3 2024").
- Text in square brackets is a table: the first entry of each row is the metric name, the remaining entries are its values. Some tables appear as plain text instead (e.g. "Total revenues $ 1,300.2 $ 1,348.8 (3.6) %"); read them the same way.
- Ignore segment-level figures. Use figures for the reported quarter only, not another quarter and not the full year.
- Report buybacks_and_dividends.combined only when buybacks and dividends are not reported separately but a combined total is.
- performance is a number from -5 to 5 rating over- or under-performance in the quarter, based on the metrics extracted, their YoY and QoQ changes and net income margin.
- Use null for anything absent or unclear.
- Output JSON only, with exactly this shape. No explanations, no markdown.

{
  "company_name": string | null,
  "quarter": string | null,
  "total_revenue": {"value": number | null, "yoy": number | null, "qoq": number | null},
  "earnings_per_share": {"value": number | null, "yoy": number | null, "qoq": number | null},
  "net_income": {"value": number | null, "yoy": number | null, "qoq": number | null},
  "net_loss": number | null,
  "operating_income": {"value": number | null, "yoy": number | null, "qoq": number | null},
  "operating_loss": number | null,
  "gross_margin": {"value": number | null, "yoy": number | null, "qoq": number | null},
  "operating_expenses": {"value": number | null, "yoy": number | null, "qoq": number | null},
  "buybacks_and_dividends": {"buybacks": number | null, "dividends": number | null, "combined": number | null},
  "performance": number | null
}

Input text:
{input}"#;

/// Build the prompt body: the metadata header (when present) followed by the
/// newline-joined selected content.
pub fn prompt_body(header: Option<&str>, content: &str) -> String {
    match header {
        Some(h) => format!("{h}\n{content}"),
        None => content.to_string(),
    }
}

/// Substitute `body` into `template`.
pub fn build_prompt(template: &str, body: &str) -> String {
    template.replace(INPUT_PLACEHOLDER, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::REQUIRED_KEYS;

    #[test]
    fn default_prompt_names_every_schema_key() {
        for key in REQUIRED_KEYS {
            assert!(
                DEFAULT_EXTRACTION_PROMPT.contains(&format!("\"{key}\"")),
                "prompt is missing {key}"
            );
        }
    }

    #[test]
    fn default_prompt_has_one_placeholder_at_the_end() {
        assert_eq!(DEFAULT_EXTRACTION_PROMPT.matches(INPUT_PLACEHOLDER).count(), 1);
        assert!(DEFAULT_EXTRACTION_PROMPT.ends_with(INPUT_PLACEHOLDER));
    }

    #[test]
    fn default_prompt_states_key_rules() {
        assert!(DEFAULT_EXTRACTION_PROMPT.contains("Losses are always negative"));
        assert!(DEFAULT_EXTRACTION_PROMPT.contains("Q<number> <year>"));
        assert!(DEFAULT_EXTRACTION_PROMPT.contains("Output JSON only"));
    }

    #[test]
    fn body_puts_header_first() {
        assert_eq!(
            prompt_body(Some("{'Title': 'Q3'}"), "Revenue rose 8%."),
            "{'Title': 'Q3'}\nRevenue rose 8%."
        );
        assert_eq!(prompt_body(None, "Revenue rose 8%."), "Revenue rose 8%.");
    }

    #[test]
    fn build_prompt_substitutes_body() {
        let prompt = build_prompt("Extract:\n{input}", "EPS was $1.25.");
        assert_eq!(prompt, "Extract:\nEPS was $1.25.");
    }
}
