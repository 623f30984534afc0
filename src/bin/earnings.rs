//! CLI binary for edgequake-earnings.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_earnings::{
    inspect, select_input, ExportError, ExportFormat, ExtractionConfig, ExtractionProgressCallback,
    Extractor, HistoryStore, ProgressCallback, Report, SqliteHistoryStore,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch and one log line per
/// document. Works when documents finish out of order (`--concurrency > 1`).
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-document wall-clock start times, keyed by batch index.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);

        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_ms(&self, index: usize) -> u128 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting metrics from {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, index: usize, _total: usize, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, name: &str) {
        let elapsed_ms = self.elapsed_ms(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let elapsed_ms = self.elapsed_ms(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let failed = total_documents.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} documents extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents extracted  ({} skipped)",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One release, CSV to stdout
  earnings acme-q3-2024.pdf

  # Several releases into one spreadsheet (format follows the extension)
  earnings acme-q3.pdf globex-q3.pdf initech-q3.pdf -o q3.xlsx

  # From a URL, with a specific model
  earnings --provider openai --model gpt-4.1-mini https://ir.example.com/q3-2024.pdf

  # See what would be sent to the model (no API key needed)
  earnings --select-only acme-q3-2024.pdf

  # Inspect PDF metadata (no API key needed)
  earnings --inspect-only acme-q3-2024.pdf

  # Keep a history of every run, then list it
  earnings --history-dir ~/.earnings acme-q3.pdf -o q3.csv
  earnings --history-dir ~/.earnings --list-history 10

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory (or file) of an existing libpdfium
"#;

/// Extract financial metrics from earnings-release PDFs using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "earnings",
    version,
    about = "Extract financial metrics from earnings-release PDFs using LLMs",
    long_about = "Extract revenue, EPS, net income, margins and capital returns from quarterly \
earnings releases (local files or URLs) into one CSV or xlsx row per document. Supports OpenAI, \
Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint (Ollama, vLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required_unless_present = "list_history")]
    inputs: Vec<String>,

    /// Write the export to this file instead of stdout.
    #[arg(short, long, env = "EARNINGS_OUTPUT")]
    output: Option<PathBuf>,

    /// Export format: csv or xlsx (default: from the --output extension, else csv).
    #[arg(short, long, env = "EARNINGS_FORMAT", value_parser = parse_format)]
    format: Option<ExportFormat>,

    /// LLM model ID (default: gpt-5-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Number of documents processed at once. Rows keep input order.
    #[arg(short, long, env = "EARNINGS_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "EARNINGS_PASSWORD")]
    password: Option<String>,

    /// Path to a text file with a custom extraction prompt (must contain `{input}`).
    #[arg(long, env = "EARNINGS_PROMPT")]
    prompt_file: Option<PathBuf>,

    /// Max LLM output tokens per document (provider default if unset).
    #[arg(long, env = "EARNINGS_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// LLM temperature, 0.0–2.0 (provider default if unset).
    #[arg(long, env = "EARNINGS_TEMPERATURE")]
    temperature: Option<f32>,

    /// Sentences always kept from the top of the first page.
    #[arg(long, env = "EARNINGS_HEADER_SENTENCES", default_value_t = 3)]
    header_sentences: usize,

    /// Tables with at least this fraction of empty cells are dropped.
    #[arg(long, env = "EARNINGS_MAX_EMPTY_RATIO", default_value_t = 0.5)]
    max_empty_ratio: f64,

    /// Directory of the libpdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Output the batch as JSON (rows, errors and stats) instead of CSV.
    #[arg(long, env = "EARNINGS_JSON")]
    json: bool,

    /// Print the content selected for the model; no LLM call.
    #[arg(long)]
    select_only: bool,

    /// Print PDF metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Store every run's workbook and input names under this directory.
    #[arg(long, env = "EARNINGS_HISTORY_DIR")]
    history_dir: Option<PathBuf>,

    /// List the N most recent stored runs and exit (needs --history-dir).
    #[arg(long, value_name = "N", requires = "history_dir")]
    list_history: Option<usize>,

    /// Disable progress bar.
    #[arg(long, env = "EARNINGS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EARNINGS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EARNINGS_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "EARNINGS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-document LLM call timeout in seconds.
    #[arg(long, env = "EARNINGS_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let offline = cli.select_only || cli.inspect_only || cli.list_history.is_some();
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !offline;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── History listing ──────────────────────────────────────────────────
    if let Some(limit) = cli.list_history {
        let dir = cli.history_dir.as_ref().context("--list-history needs --history-dir")?;
        let store = SqliteHistoryStore::open(dir).context("Failed to open history store")?;
        let records = store.list(limit).context("Failed to list history")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&records).context("Failed to serialize history")?
            );
        } else {
            for r in &records {
                let url = store.download_url(&r.id).ok().flatten().unwrap_or_default();
                println!(
                    "{}  {}  {}  {}",
                    r.id,
                    r.created_at.format("%Y-%m-%d %H:%M:%S"),
                    r.input_file_names.join(", "),
                    dim(&url)
                );
            }
            if records.is_empty() {
                eprintln!("No stored extractions in {}", dir.display());
            }
        }
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        for input in &cli.inputs {
            let meta = inspect(input, &config)
                .await
                .with_context(|| format!("Failed to inspect {input}"))?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
                );
            } else {
                println!("File:         {}", input);
                if let Some(ref t) = meta.title {
                    println!("Title:        {}", t);
                }
                if let Some(ref a) = meta.author {
                    println!("Author:       {}", a);
                }
                if let Some(ref s) = meta.subject {
                    println!("Subject:      {}", s);
                }
                println!("Pages:        {}", meta.page_count);
                if let Some(ref p) = meta.producer {
                    println!("Producer:     {}", p);
                }
                if let Some(ref c) = meta.creator {
                    println!("Creator:      {}", c);
                }
                println!();
            }
        }
        return Ok(());
    }

    // ── Select-only mode ─────────────────────────────────────────────────
    if cli.select_only {
        for input in &cli.inputs {
            let (document, content) = select_input(input, &config)
                .await
                .with_context(|| format!("Failed to select content from {input}"))?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&content).context("Failed to serialize content")?
                );
            } else {
                eprintln!(
                    "{} {}  {}",
                    cyan("◆"),
                    bold(input),
                    dim(&format!(
                        "{} pages → {} snippets",
                        document.page_count(),
                        content.len()
                    ))
                );
                if let Some(header) = document.metadata.prompt_header() {
                    println!("{header}");
                }
                println!("{}", content.joined());
            }
        }
        return Ok(());
    }

    // ── Build extractor ──────────────────────────────────────────────────
    let extractor = Extractor::from_config(config).context("Failed to set up LLM provider")?;

    let history: Option<Arc<dyn HistoryStore>> = match cli.history_dir {
        Some(ref dir) => Some(Arc::new(
            SqliteHistoryStore::open(dir).context("Failed to open history store")?,
        )),
        None => None,
    };

    // Ctrl-C stops the batch; rows already extracted are still written.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} Interrupted; finishing with the rows extracted so far", cyan("⚠"));
                cancel.cancel();
            }
        });
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let report = extractor
        .process_reports(cli.inputs.clone(), cancel, history, export_format(&cli))
        .await
        .context("Extraction failed")?;

    write_report(&cli, &report).await?;

    let stats = &report.batch.stats;
    if !cli.quiet {
        if !show_progress {
            eprintln!(
                "Extracted {}/{} documents in {}ms",
                stats.succeeded, stats.total_documents, stats.total_duration_ms
            );
            for doc in &report.batch.documents {
                if let Some(ref e) = doc.error {
                    eprintln!("  {} {}", red("✗"), e);
                }
            }
        }
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
        );
        if stats.cancelled > 0 {
            eprintln!("   {} documents cancelled", stats.cancelled);
        }
        if let Some(ref id) = report.extraction_id {
            eprintln!("   saved to history as {}", bold(id));
        }
    }

    if stats.total_documents > 0 && stats.succeeded == 0 {
        anyhow::bail!("No document produced metrics");
    }
    Ok(())
}

/// Write the export (or JSON) to the output file or stdout.
async fn write_report(cli: &Cli, report: &Report) -> Result<()> {
    let bytes = if cli.json {
        let mut json =
            serde_json::to_vec_pretty(&report.batch).context("Failed to serialise output")?;
        json.push(b'\n');
        json
    } else {
        report.exported.clone()
    };

    match cli.output {
        Some(ref path) => {
            write_atomic(path, &bytes).await?;
            if !cli.quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(&bytes).context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    s.parse().map_err(|e: ExportError| e.to_string())
}

/// `--format`, else the `--output` extension, else CSV.
fn export_format(cli: &Cli) -> ExportFormat {
    cli.format
        .or_else(|| cli.output.as_deref().and_then(ExportFormat::from_path))
        .unwrap_or(ExportFormat::Csv)
}

/// Write to a temp file next to `path`, then rename over it.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .concurrency(cli.concurrency)
        .header_sentences(cli.header_sentences)
        .max_empty_cell_ratio(cli.max_empty_ratio)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read extraction prompt from {:?}", path))?;
        builder = builder.extraction_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(dir);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
