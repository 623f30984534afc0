//! Reasoning-service interaction: send the extraction prompt, parse the reply.
//!
//! The network call sits behind the [`ReasoningService`] trait so the whole
//! pipeline can be exercised offline with a canned reply. The default
//! implementation, [`LlmReasoningService`], wraps any `edgequake-llm`
//! provider. All prompt text lives in [`crate::prompts`].
//!
//! ## No retries
//!
//! A failed or timed-out call fails that one document; the batch moves on.
//! Re-running a document is the caller's decision.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, SchemaError};
use crate::metrics::RawMetricRecord;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Characters of an unparsable reply quoted in the error.
const EXCERPT_CHARS: usize = 80;

/// Raw text returned by the reasoning service plus token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Answers one extraction prompt.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<ServiceReply, ExtractError>;
}

/// [`ReasoningService`] backed by an `edgequake-llm` provider.
pub struct LlmReasoningService {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmReasoningService {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl ReasoningService for LlmReasoningService {
    async fn complete(&self, prompt: &str) -> Result<ServiceReply, ExtractError> {
        let messages = vec![ChatMessage::user(prompt)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ExtractError::LlmApiError {
                message: e.to_string(),
            })?;

        Ok(ServiceReply {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the extraction config. Unset values are
/// left to the provider.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        ..Default::default()
    }
}

/// A parsed reply and what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReply {
    pub record: RawMetricRecord,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Call the service under `timeout` and parse the reply into a
/// [`RawMetricRecord`].
///
/// # Errors
/// - [`ExtractError::ApiTimeout`] when the call does not finish in time
/// - [`ExtractError::Schema`] when the reply is not a usable metric record
/// - whatever the service itself returns
pub async fn request_metrics(
    service: &dyn ReasoningService,
    prompt: &str,
    timeout: Duration,
) -> Result<MetricReply, ExtractError> {
    let start = Instant::now();
    let reply = tokio::time::timeout(timeout, service.complete(prompt))
        .await
        .map_err(|_| ExtractError::ApiTimeout {
            secs: timeout.as_secs(),
        })??;

    debug!(
        "Reasoning service: {} input tokens, {} output tokens, {:?}",
        reply.input_tokens,
        reply.output_tokens,
        start.elapsed()
    );

    let record = parse_reply(&reply.content)?;
    Ok(MetricReply {
        record,
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
    })
}

static RE_JSON_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n?(.*?)\r?\n?```$").unwrap());

/// Remove an outer markdown code fence, if any.
pub fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    match RE_JSON_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Parse the service's text reply into a [`RawMetricRecord`].
pub fn parse_reply(reply: &str) -> Result<RawMetricRecord, SchemaError> {
    let body = strip_fences(reply);
    if body.is_empty() {
        return Err(SchemaError::EmptyReply);
    }

    let value: Value = serde_json::from_str(body).map_err(|e| SchemaError::Unparsable {
        detail: e.to_string(),
        excerpt: body.chars().take(EXCERPT_CHARS).collect(),
    })?;

    RawMetricRecord::from_json(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"{
        "company_name": "Acme Corp", "quarter": "Q3 2024",
        "total_revenue": {"value": 1300000000, "yoy": 12.3, "qoq": 4.1},
        "earnings_per_share": {"value": 1.25, "yoy": null, "qoq": null},
        "net_income": {"value": null, "yoy": null, "qoq": null},
        "net_loss": null,
        "operating_income": {"value": null, "yoy": null, "qoq": null},
        "operating_loss": null,
        "gross_margin": {"value": 42.5, "yoy": null, "qoq": null},
        "operating_expenses": {"value": null, "yoy": null, "qoq": null},
        "buybacks_and_dividends": {"buybacks": null, "dividends": null, "combined": null},
        "performance": 1
    }"#;

    struct Canned(&'static str);

    #[async_trait]
    impl ReasoningService for Canned {
        async fn complete(&self, _prompt: &str) -> Result<ServiceReply, ExtractError> {
            Ok(ServiceReply {
                content: self.0.to_string(),
                input_tokens: 120,
                output_tokens: 40,
            })
        }
    }

    struct Slow;

    #[async_trait]
    impl ReasoningService for Slow {
        async fn complete(&self, _prompt: &str) -> Result<ServiceReply, ExtractError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ServiceReply::default())
        }
    }

    #[test]
    fn build_options_leaves_unset_values_to_provider() {
        let opts = build_options(&ExtractionConfig::default());
        assert_eq!(opts.temperature, None);
        assert_eq!(opts.max_tokens, None);

        let config = ExtractionConfig::builder()
            .temperature(0.2)
            .max_tokens(2048)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn strips_json_fences() {
        assert_eq!(strip_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn parses_fenced_reply() {
        let fenced = format!("```json\n{REPLY}\n```");
        let rec = parse_reply(&fenced).unwrap();
        assert_eq!(rec.company_name.as_deref(), Some("Acme Corp"));
        assert_eq!(rec.gross_margin.value, Some(42.5));
    }

    #[test]
    fn empty_reply_is_schema_error() {
        assert_eq!(parse_reply("   ").unwrap_err(), SchemaError::EmptyReply);
        assert_eq!(parse_reply("```json\n```").unwrap_err(), SchemaError::EmptyReply);
    }

    #[test]
    fn prose_reply_is_unparsable() {
        let err = parse_reply("I could not find any metrics in this document.").unwrap_err();
        match err {
            SchemaError::Unparsable { excerpt, .. } => assert!(excerpt.starts_with("I could not")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn object_missing_keys_is_schema_error() {
        let err = parse_reply(r#"{"company_name": "Acme"}"#).unwrap_err();
        assert!(matches!(err, SchemaError::MissingKeys(ref keys) if keys.len() == 11));
    }

    #[tokio::test]
    async fn request_metrics_reports_usage() {
        let reply = request_metrics(&Canned(REPLY), "prompt", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply.input_tokens, 120);
        assert_eq!(reply.output_tokens, 40);
        assert_eq!(reply.record.performance, Some(1.0));
    }

    #[tokio::test]
    async fn request_metrics_times_out() {
        let err = request_metrics(&Slow, "prompt", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ApiTimeout { .. }));
    }

    #[tokio::test]
    async fn request_metrics_surfaces_schema_errors() {
        let err = request_metrics(&Canned("[]"), "prompt", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Schema(SchemaError::NotAnObject { .. })));
    }
}
