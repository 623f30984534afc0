//! Error types for the edgequake-earnings library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **Fatal for one document.** The document cannot be
//!   turned into a metric record (bad input file, corrupt PDF, provider not
//!   configured, unusable reply). Returned as `Err(ExtractError)` from the
//!   single-document entry points.
//!
//! * [`DocumentError`]: **Non-fatal for a batch.** One document failed but
//!   the others are fine. Stored inside [`crate::output::DocumentResult`] so a
//!   batch keeps every row it could produce.
//!
//! Reply-shape problems get their own [`SchemaError`] so callers can tell "the
//! model answered nonsense" apart from "the model could not be reached".

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-earnings library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The upload declared a content type other than `application/pdf`.
    #[error("'{name}' has content type '{content_type}'; only PDF files are allowed")]
    UnsupportedContentType { name: String, content_type: String },

    /// The document is larger than the configured upload cap.
    #[error("'{name}' is too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { name: String, size: usize, limit: usize },

    /// The bytes were read, but they are not a PDF.
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Reasoning service errors ──────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The LLM call did not finish within the configured timeout.
    #[error("LLM call timed out after {secs}s")]
    ApiTimeout { secs: u64 },

    /// The reply could not be turned into a metric record.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not serialise the extracted rows.
    #[error(transparent)]
    Export(#[from] ExportError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The reasoning service answered, but not with a usable metric record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The reply had no text content at all.
    #[error("Schema error: reasoning service returned an empty reply")]
    EmptyReply,

    /// The reply is not valid JSON.
    #[error("Schema error: reply is not valid JSON ({detail}); reply starts with {excerpt:?}")]
    Unparsable { detail: String, excerpt: String },

    /// The reply is JSON, but not an object.
    #[error("Schema error: reply must be a JSON object, got {found}")]
    NotAnObject { found: String },

    /// One or more required top-level keys are absent.
    #[error("Schema error: reply is missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    /// A field holds something that is neither a number nor null.
    #[error("Schema error: field '{field}' is not a number: {detail}")]
    InvalidField { field: String, detail: String },
}

/// Errors from tabular export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// The CSV writer could not be flushed into its buffer.
    #[error("CSV buffer error: {0}")]
    Buffer(String),

    /// Workbook could not be built.
    #[error("XLSX serialization error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// Unknown export format name.
    #[error("Unknown export format '{0}' (expected xlsx or csv)")]
    InvalidFormat(String),
}

/// Errors from the extraction-history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// SQLite failure.
    #[error("History database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File-system failure while storing or reading an export.
    #[error("History storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored row could not be decoded.
    #[error("History record is malformed: {0}")]
    Malformed(String),

    /// An extraction with this id is already stored.
    #[error("Extraction '{0}' is already stored")]
    DuplicateId(String),
}

/// A non-fatal error for a single document of a batch.
///
/// Stored alongside [`crate::output::DocumentResult`] when a document fails.
/// The batch continues with the remaining documents.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The input could not be read, downloaded or accepted.
    #[error("{file}: input rejected: {detail}")]
    InputRejected { file: String, detail: String },

    /// The PDF could not be parsed.
    #[error("{file}: PDF loading failed: {detail}")]
    LoadFailed { file: String, detail: String },

    /// The reasoning service call failed.
    #[error("{file}: LLM call failed: {detail}")]
    LlmFailed { file: String, detail: String },

    /// The reasoning service call timed out.
    #[error("{file}: LLM call timed out after {secs}s")]
    Timeout { file: String, secs: u64 },

    /// The reply did not match the metric schema.
    #[error("{file}: {detail}")]
    Schema { file: String, detail: String },

    /// The batch was cancelled before this document finished.
    #[error("{file}: cancelled")]
    Cancelled { file: String },
}

impl DocumentError {
    /// Classify a fatal error for one document into its batch-level form.
    pub fn from_extract(file: impl Into<String>, err: &ExtractError) -> Self {
        let file = file.into();
        let detail = err.to_string();
        match err {
            ExtractError::FileNotFound { .. }
            | ExtractError::PermissionDenied { .. }
            | ExtractError::DownloadFailed { .. }
            | ExtractError::DownloadTimeout { .. }
            | ExtractError::UnsupportedContentType { .. }
            | ExtractError::FileTooLarge { .. }
            | ExtractError::NotAPdf { .. } => Self::InputRejected { file, detail },
            ExtractError::CorruptPdf { .. }
            | ExtractError::PasswordRequired { .. }
            | ExtractError::WrongPassword { .. }
            | ExtractError::PdfiumBindingFailed(_) => Self::LoadFailed { file, detail },
            ExtractError::ApiTimeout { secs } => Self::Timeout { file, secs: *secs },
            ExtractError::Schema(_) => Self::Schema { file, detail },
            _ => Self::LlmFailed { file, detail },
        }
    }

    /// The file name this error belongs to.
    pub fn file(&self) -> &str {
        match self {
            Self::InputRejected { file, .. }
            | Self::LoadFailed { file, .. }
            | Self::LlmFailed { file, .. }
            | Self::Timeout { file, .. }
            | Self::Schema { file, .. }
            | Self::Cancelled { file } => file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_display_lists_keys() {
        let e = SchemaError::MissingKeys(vec!["quarter".into(), "performance".into()]);
        let msg = e.to_string();
        assert!(msg.contains("quarter, performance"), "got: {msg}");
    }

    #[test]
    fn schema_error_is_transparent_inside_extract_error() {
        let e: ExtractError = SchemaError::EmptyReply.into();
        assert!(e.to_string().starts_with("Schema error"));
    }

    #[test]
    fn file_too_large_display() {
        let e = ExtractError::FileTooLarge {
            name: "q3.pdf".into(),
            size: 30,
            limit: 20,
        };
        assert!(e.to_string().contains("q3.pdf"));
        assert!(e.to_string().contains("limit 20"));
    }

    #[test]
    fn document_error_classifies_schema_failures() {
        let e = ExtractError::Schema(SchemaError::NotAnObject {
            found: "array".into(),
        });
        let d = DocumentError::from_extract("acme.pdf", &e);
        assert!(matches!(d, DocumentError::Schema { .. }));
        assert_eq!(d.file(), "acme.pdf");
    }

    #[test]
    fn document_error_classifies_timeouts() {
        let d = DocumentError::from_extract("acme.pdf", &ExtractError::ApiTimeout { secs: 30 });
        assert!(matches!(d, DocumentError::Timeout { secs: 30, .. }));
        assert!(d.to_string().contains("30s"));
    }

    #[test]
    fn document_error_classifies_input_rejections() {
        let e = ExtractError::NotAPdf {
            name: "notes.txt".into(),
            magic: b"hell".to_vec(),
        };
        let d = DocumentError::from_extract("notes.txt", &e);
        assert!(matches!(d, DocumentError::InputRejected { .. }));
    }
}
