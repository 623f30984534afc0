//! # edgequake-earnings
//!
//! Turn quarterly earnings releases (PDF) into a normalized table of
//! financial metrics using an LLM.
//!
//! ## Why this crate?
//!
//! Earnings releases state the same handful of numbers (revenue, EPS, net
//! income, margins, capital returns) in wildly different layouts. Instead
//! of per-issuer parsers, this crate keeps only the financially salient
//! sentences and tables of a release, asks an LLM for a fixed JSON schema,
//! and formats the reply deterministically. The model reads; the rules
//! format.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve path / URL / upload; size, type and magic guards
//!  ├─ 2. Load       page text, layout tables, metadata via pdfium (spawn_blocking)
//!  ├─ 3. Select     header sentences + salient sentences + mostly-filled tables
//!  ├─ 4. Extract    one schema-constrained LLM call → RawMetricRecord
//!  ├─ 5. Normalize  loss override, $1.3B magnitudes, YoY/QoQ strings
//!  └─ 6. Export     one xlsx/CSV row per document, optional history
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_earnings::{ExtractionConfig, Extractor};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let extractor = Extractor::from_config(ExtractionConfig::default())?;
//!     let batch = extractor
//!         .extract_batch(vec!["acme-q3-2024.pdf"], CancellationToken::new())
//!         .await;
//!     for row in batch.records() {
//!         println!("{:?} {:?}: {:?}", row.company_name, row.quarter, row.total_revenue);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `earnings` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | off     | Enables the `earnings-server` HTTP service (axum + tower-http) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-earnings = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod extract;
pub mod history;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use document::{Document, DocumentMetadata, Page, Table};
pub use error::{DocumentError, ExportError, ExtractError, HistoryError, SchemaError};
pub use export::{to_csv, to_xlsx, ExportFormat};
pub use extract::{inspect, select_input, DocumentSource, Extractor};
pub use history::{HistoryRecord, HistoryStore, SqliteHistoryStore};
pub use metrics::{CapitalReturns, FinalMetricRecord, MetricGroup, RawMetricRecord};
pub use output::{BatchOutput, BatchStats, DocumentResult, DocumentStats, Report};
pub use pipeline::input::InputDocument;
pub use pipeline::llm::{ReasoningService, ServiceReply};
pub use pipeline::load::DocumentLoader;
pub use pipeline::normalize::normalize;
pub use pipeline::segment::SentenceSegmenter;
pub use pipeline::select::{valid_table, CandidateContent};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, DocumentStream};
