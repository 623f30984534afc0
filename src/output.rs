//! Result types returned by the extraction entry points.

use crate::error::DocumentError;
use crate::export::ExportFormat;
use crate::metrics::FinalMetricRecord;
use serde::{Deserialize, Serialize};

/// The outcome of one document.
///
/// Exactly one of `record` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    /// File name (or URL segment) the document was submitted under.
    pub name: String,
    /// The normalized metrics when extraction succeeded.
    pub record: Option<FinalMetricRecord>,
    /// Why the document produced no record.
    pub error: Option<DocumentError>,
    pub stats: DocumentStats,
}

impl DocumentResult {
    pub fn success(name: impl Into<String>, record: FinalMetricRecord, stats: DocumentStats) -> Self {
        Self {
            name: name.into(),
            record: Some(record),
            error: None,
            stats,
        }
    }

    pub fn failure(name: impl Into<String>, error: DocumentError, stats: DocumentStats) -> Self {
        Self {
            name: name.into(),
            record: None,
            error: Some(error),
            stats,
        }
    }

    pub fn is_success(&self) -> bool {
        self.record.is_some()
    }
}

/// Per-document counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub page_count: usize,
    /// Sentences and tables kept by the content selector.
    pub selected_snippets: usize,
    /// Characters in the prompt body sent to the LLM.
    pub prompt_chars: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// A whole batch: one result per submitted document, in submission order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutput {
    pub documents: Vec<DocumentResult>,
    pub stats: BatchStats,
}

impl BatchOutput {
    /// The successful records, in submission order.
    pub fn records(&self) -> Vec<&FinalMetricRecord> {
        self.documents.iter().filter_map(|d| d.record.as_ref()).collect()
    }

    /// Names of every submitted document, in submission order.
    pub fn input_names(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.name.clone()).collect()
    }
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Documents never started because the batch was cancelled.
    pub cancelled: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

impl BatchStats {
    /// Summarise finished results.
    ///
    /// `submitted` may exceed `results.len()` when the batch was cancelled:
    /// documents never started count as cancelled, as do documents whose
    /// result carries [`DocumentError::Cancelled`].
    pub fn from_results(results: &[DocumentResult], submitted: usize, total_duration_ms: u64) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let interrupted = results
            .iter()
            .filter(|r| matches!(r.error, Some(DocumentError::Cancelled { .. })))
            .count();
        Self {
            total_documents: submitted,
            succeeded,
            failed: results.len() - succeeded - interrupted,
            cancelled: submitted.saturating_sub(results.len()) + interrupted,
            total_input_tokens: results.iter().map(|r| r.stats.input_tokens as u64).sum(),
            total_output_tokens: results.iter().map(|r| r.stats.output_tokens as u64).sum(),
            total_duration_ms,
        }
    }
}

/// The result of [`crate::extract::Extractor::process_reports`]: the batch,
/// its export in the requested format and, when history is enabled and the
/// save succeeded, the id it was stored under.
#[derive(Debug, Clone)]
pub struct Report {
    pub batch: BatchOutput,
    pub exported: Vec<u8>,
    pub format: ExportFormat,
    pub extraction_id: Option<String>,
}
