//! HTTP service for edgequake-earnings.
//!
//! Upload earnings releases, get an xlsx workbook back. Mirrors the CLI: the library
//! does the work, this binary maps multipart uploads and query strings onto
//! it.

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use edgequake_earnings::history::DEFAULT_LIST_LIMIT;
use edgequake_earnings::pipeline::input::check_form_upload;
use edgequake_earnings::{
    ExportFormat, ExtractionConfig, Extractor, HistoryRecord, HistoryStore, InputDocument, SqliteHistoryStore,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Local front-end dev servers (Vite and Next.js).
const ALLOWED_ORIGINS: [&str; 4] = [
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
    "http://127.0.0.1:3000",
];

const EXTRACTION_ID_HEADER: &str = "x-extraction-id";

/// Serve earnings-release extraction over HTTP.
#[derive(Parser, Debug)]
#[command(name = "earnings-server", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "EARNINGS_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Store every processed batch under this directory.
    #[arg(long, env = "EARNINGS_HISTORY_DIR")]
    history_dir: Option<PathBuf>,

    /// LLM model ID (default: gpt-5-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Documents of one request processed at once.
    #[arg(long, env = "EARNINGS_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Upper bound on one request body, in megabytes.
    #[arg(long, env = "EARNINGS_MAX_BODY_MB", default_value_t = 200)]
    max_body_mb: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

#[derive(Clone)]
struct AppState {
    extractor: Arc<Extractor>,
    history: Option<Arc<dyn HistoryStore>>,
    shutdown: CancellationToken,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        message: Some("Earnings PDF Processor API"),
    })
}

async fn health() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "healthy",
        message: None,
    })
}

/// `POST /reports/process`: multipart field `files`, one part per PDF.
///
/// Any rejected upload fails the whole request with 400; documents that load
/// but yield no metrics are skipped in the workbook.
async fn process(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response, ApiError> {
    let max_file_size = state.extractor.config().max_file_size;
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload.pdf").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

        check_form_upload(&name, &bytes, content_type.as_deref(), max_file_size)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
        uploads.push(InputDocument::new(name, bytes.to_vec()));
    }

    if uploads.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No files uploaded"));
    }
    info!("Processing {} uploaded documents", uploads.len());

    let report = state
        .extractor
        .process_reports(
            uploads,
            state.shutdown.child_token(),
            state.history.clone(),
            ExportFormat::Xlsx,
        )
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let mut headers = attachment("report", report.format)?;
    if let Some(ref id) = report.extraction_id {
        if let Ok(value) = HeaderValue::from_str(id) {
            headers.insert(EXTRACTION_ID_HEADER, value);
        }
    }

    Ok((headers, report.exported).into_response())
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

/// `GET /reports/history?limit=N`: newest first.
async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError> {
    let store = history_store(&state)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let records = tokio::task::spawn_blocking(move || store.list(limit))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    Ok(Json(records))
}

/// `GET /reports/history/:id/download`: the stored workbook.
async fn download(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let store = history_store(&state)?;
    let lookup = id.clone();

    let workbook = tokio::task::spawn_blocking(move || store.load_export(&lookup))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("No extraction with id '{id}'")))?;

    let headers = attachment(&id, ExportFormat::Xlsx)?;
    Ok((headers, workbook).into_response())
}

/// Content type and `attachment; filename={stem}.{ext}` for a download.
fn attachment(stem: &str, format: ExportFormat) -> Result<HeaderMap, ApiError> {
    let disposition = HeaderValue::from_str(&format!("attachment; filename={stem}.{}", format.extension()))
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(headers)
}

fn history_store(state: &AppState) -> Result<Arc<dyn HistoryStore>, ApiError> {
    state
        .history
        .clone()
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "History is not enabled on this server"))
}

fn cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = ALLOWED_ORIGINS
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods(AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS]))
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([header::CONTENT_DISPOSITION, header::HeaderName::from_static(EXTRACTION_ID_HEADER)])
}

fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/reports/process", post(process))
        .route("/reports/history", get(history))
        .route("/reports/history/:id/download", get(download))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" })),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut builder = ExtractionConfig::builder().concurrency(args.concurrency);
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    let config = builder.build().context("Invalid configuration")?;
    let extractor = Extractor::from_config(config).context("Failed to set up LLM provider")?;

    let history: Option<Arc<dyn HistoryStore>> = match args.history_dir {
        Some(ref dir) => Some(Arc::new(
            SqliteHistoryStore::open(dir).context("Failed to open history store")?,
        )),
        None => None,
    };

    let shutdown = CancellationToken::new();
    let state = AppState {
        extractor: Arc::new(extractor),
        history,
        shutdown: shutdown.clone(),
    };
    let app = router(state, args.max_body_mb.saturating_mul(1024 * 1024));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!("Starting server on {}", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutting down; cancelling running batches");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    Ok(())
}
