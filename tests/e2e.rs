//! End-to-end integration tests for edgequake-earnings.
//!
//! These tests read real earnings releases and make live LLM API calls.
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 EARNINGS_E2E_PDF=path/to/release.pdf \
//!     cargo test --test e2e -- --nocapture
//!
//! `EARNINGS_E2E_PDF` defaults to `test_cases/earnings_release.pdf`.

use edgequake_earnings::{
    inspect, select_input, ExportFormat, ExtractionConfig, Extractor, HistoryStore,
    SqliteHistoryStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn release_pdf() -> PathBuf {
    std::env::var("EARNINGS_E2E_PDF")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/earnings_release.pdf"))
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            println!("       Set EARNINGS_E2E_PDF to an earnings-release PDF");
            return;
        }
        p
    }};
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("edgequake_earnings=debug"))
        .with_test_writer()
        .try_init();
}

// ── No-LLM tests ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_inspect_release() {
    let path = e2e_skip_unless_ready!(release_pdf());

    let meta = inspect(path.to_str().unwrap(), &ExtractionConfig::default())
        .await
        .expect("inspect() should succeed");

    assert!(meta.page_count > 0);
    println!("Metadata: {:?}", meta);
}

#[tokio::test]
async fn test_select_release() {
    let path = e2e_skip_unless_ready!(release_pdf());
    init_tracing();

    let (document, content) = select_input(path.to_str().unwrap(), &ExtractionConfig::default())
        .await
        .expect("select_input() should succeed");

    assert!(document.page_count() > 0);
    assert!(!content.is_empty(), "an earnings release has salient content");
    assert!(
        content.snippets().iter().any(|s| s.contains('$') || s.contains('%')),
        "expected at least one monetary or percentage snippet"
    );
    println!(
        "{} pages → {} snippets, {} chars",
        document.page_count(),
        content.len(),
        content.joined().len()
    );
}

// ── Live LLM tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_extract_release() {
    let path = e2e_skip_unless_ready!(release_pdf());
    init_tracing();

    let extractor = Extractor::from_config(ExtractionConfig::default()).expect("provider configured");
    let result = extractor.extract_input(path.to_str().unwrap()).await;

    assert!(result.is_success(), "extraction failed: {:?}", result.error);
    let row = result.record.unwrap();
    println!("{row:#?}");

    assert!(row.company_name.is_some(), "company name should be found");
    if let Some(ref q) = row.quarter {
        assert!(q.starts_with('Q'), "quarter should be canonical, got {q:?}");
    }
    if let Some(p) = row.performance {
        assert!((-5.0..=5.0).contains(&p));
    }
    assert!(result.stats.input_tokens > 0);
}

#[tokio::test]
async fn test_process_reports_with_history() {
    let path = e2e_skip_unless_ready!(release_pdf());
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteHistoryStore::open(dir.path()).unwrap());
    let extractor = Extractor::from_config(ExtractionConfig::default()).expect("provider configured");

    let input = path.to_str().unwrap().to_string();
    let report = extractor
        .process_reports(
            vec![input],
            CancellationToken::new(),
            Some(Arc::clone(&store) as Arc<dyn HistoryStore>),
            ExportFormat::Xlsx,
        )
        .await
        .expect("process_reports() should succeed");

    assert_eq!(report.batch.stats.succeeded, 1);
    println!("{} byte workbook", report.exported.len());

    let id = report.extraction_id.expect("history enabled");
    let url = store.download_url(&id).unwrap().expect("stored export");
    assert!(url.starts_with("file://") && url.ends_with(".xlsx"));
    assert_eq!(store.load_export(&id).unwrap(), Some(report.exported));
}
