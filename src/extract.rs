//! Extraction entry points.
//!
//! An [`Extractor`] owns the three collaborators of the pipeline (sentence
//! segmenter, PDF loader, reasoning service), each constructed once and
//! shared read-only. Tests swap any of them through [`Extractor::new`],
//! [`Extractor::with_segmenter`] and [`Extractor::with_loader`].
//!
//! Single-document methods never return `Err`: a failure is stored on the
//! [`DocumentResult`] so a batch keeps every row it could produce.
//! Use [`crate::stream::extract_stream`] instead of [`Extractor::extract_batch`]
//! to receive rows as they finish.

use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::document::{Document, DocumentMetadata};
use crate::error::{DocumentError, ExtractError};
use crate::export::ExportFormat;
use crate::history::HistoryStore;
use crate::metrics::FinalMetricRecord;
use crate::output::{BatchOutput, BatchStats, DocumentResult, DocumentStats, Report};
use crate::pipeline::input::{self, InputDocument};
use crate::pipeline::llm::{self, LlmReasoningService, ReasoningService};
use crate::pipeline::load::{self, DocumentLoader, PdfiumLoader};
use crate::pipeline::normalize::normalize;
use crate::pipeline::segment::{SentenceSegmenter, UnicodeSentenceSegmenter};
use crate::pipeline::select::{CandidateContent, ContentSelector};
use crate::prompts;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where a batch document comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Local path or HTTP(S) URL, resolved when the document's turn comes.
    Location(String),
    /// Bytes already in memory (an upload).
    Bytes(InputDocument),
}

impl DocumentSource {
    /// Name used in results before the source is resolved.
    pub fn name(&self) -> String {
        match self {
            Self::Location(loc) if input::is_url(loc) => input::filename_from_url(loc),
            Self::Location(loc) => Path::new(loc)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| loc.clone()),
            Self::Bytes(doc) => doc.name.clone(),
        }
    }
}

impl From<InputDocument> for DocumentSource {
    fn from(doc: InputDocument) -> Self {
        Self::Bytes(doc)
    }
}

impl From<String> for DocumentSource {
    fn from(loc: String) -> Self {
        Self::Location(loc)
    }
}

impl From<&str> for DocumentSource {
    fn from(loc: &str) -> Self {
        Self::Location(loc.to_string())
    }
}

/// The extraction pipeline with its injected collaborators.
pub struct Extractor {
    service: Arc<dyn ReasoningService>,
    loader: Arc<dyn DocumentLoader>,
    selector: ContentSelector,
    prompt_template: String,
    config: ExtractionConfig,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("selector", &self.selector)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Extractor {
    /// Build an extractor around an existing reasoning service, with the
    /// default segmenter and the pdfium loader.
    ///
    /// # Errors
    /// [`ExtractError::InvalidConfig`] when the salience pattern does not compile.
    pub fn new(service: Arc<dyn ReasoningService>, config: ExtractionConfig) -> Result<Self, ExtractError> {
        let selector = ContentSelector::from_config(Arc::new(UnicodeSentenceSegmenter), &config)?;
        let prompt_template = config
            .extraction_prompt
            .clone()
            .unwrap_or_else(|| prompts::DEFAULT_EXTRACTION_PROMPT.to_string());
        Ok(Self {
            service,
            loader: Arc::new(PdfiumLoader::new(config.pdfium_lib_path.clone())),
            selector,
            prompt_template,
            config,
        })
    }

    /// Build an extractor whose reasoning service is an LLM provider
    /// resolved from `config` and the environment.
    pub fn from_config(config: ExtractionConfig) -> Result<Self, ExtractError> {
        let provider = resolve_provider(&config)?;
        debug!(
            "LLM provider resolved (provider={:?}, model={})",
            config.provider_name,
            config.model_or_default()
        );
        let service = Arc::new(LlmReasoningService::new(provider, &config));
        Self::new(service, config)
    }

    pub fn with_segmenter(mut self, segmenter: Arc<dyn SentenceSegmenter>) -> Self {
        self.selector = self.selector.with_segmenter(segmenter);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run the content selector alone.
    pub fn select(&self, document: &Document) -> CandidateContent {
        self.selector.select(document)
    }

    /// The full prompt that would be sent for `document`.
    pub fn prompt_for(&self, document: &Document) -> String {
        let content = self.select(document);
        self.render_prompt(document, &content)
    }

    fn render_prompt(&self, document: &Document, content: &CandidateContent) -> String {
        let header = document.metadata.prompt_header();
        let body = prompts::prompt_body(header.as_deref(), &content.joined());
        prompts::build_prompt(&self.prompt_template, &body)
    }

    // ── Single document ──────────────────────────────────────────────────

    /// Extract metrics from an already-parsed document.
    pub async fn extract_document(&self, name: &str, document: &Document) -> DocumentResult {
        let start = Instant::now();
        let mut stats = DocumentStats::default();
        let outcome = self.run_document(document, &mut stats).await;
        finish(name, outcome, stats, start)
    }

    /// Check, load and extract a PDF held in memory.
    pub async fn extract_bytes(&self, name: &str, bytes: Vec<u8>) -> DocumentResult {
        let start = Instant::now();
        let mut stats = DocumentStats::default();
        let outcome = self.run_bytes(name, bytes, &mut stats).await;
        finish(name, outcome, stats, start)
    }

    /// Resolve a path or URL, then extract it.
    pub async fn extract_input(&self, input: &str) -> DocumentResult {
        self.extract_source(DocumentSource::from(input)).await
    }

    /// Load a checked document without extracting it.
    pub async fn load(&self, doc: InputDocument) -> Result<Document, ExtractError> {
        input::check_upload(&doc.name, &doc.bytes, None, self.config.max_file_size)?;
        load::load_document(
            Arc::clone(&self.loader),
            doc.name,
            doc.bytes,
            self.config.password.clone(),
        )
        .await
    }

    pub(crate) async fn extract_source(&self, source: DocumentSource) -> DocumentResult {
        match source {
            DocumentSource::Bytes(doc) => self.extract_bytes(&doc.name, doc.bytes).await,
            DocumentSource::Location(loc) => {
                let start = Instant::now();
                match input::resolve_input(&loc, &self.config).await {
                    Ok(doc) => self.extract_bytes(&doc.name, doc.bytes).await,
                    Err(e) => finish(&DocumentSource::Location(loc).name(), Err(e), DocumentStats::default(), start),
                }
            }
        }
    }

    async fn run_bytes(
        &self,
        name: &str,
        bytes: Vec<u8>,
        stats: &mut DocumentStats,
    ) -> Result<FinalMetricRecord, ExtractError> {
        let document = self.load(InputDocument::new(name, bytes)).await?;
        self.run_document(&document, stats).await
    }

    async fn run_document(
        &self,
        document: &Document,
        stats: &mut DocumentStats,
    ) -> Result<FinalMetricRecord, ExtractError> {
        stats.page_count = document.page_count();

        let content = self.select(document);
        stats.selected_snippets = content.len();
        if content.is_empty() {
            debug!("No salient content selected; sending metadata only");
        }

        let prompt = self.render_prompt(document, &content);
        stats.prompt_chars = prompt.chars().count();

        let timeout = Duration::from_secs(self.config.api_timeout_secs);
        let reply = llm::request_metrics(self.service.as_ref(), &prompt, timeout).await?;
        stats.input_tokens = reply.input_tokens;
        stats.output_tokens = reply.output_tokens;

        Ok(normalize(reply.record))
    }

    // ── Batches ──────────────────────────────────────────────────────────

    /// Extract every document, `config.concurrency` at a time.
    ///
    /// Rows come back in submission order. Cancelling `cancel` stops the
    /// batch: documents in flight finish as [`DocumentError::Cancelled`],
    /// documents not yet started are left out, and rows already produced
    /// are kept.
    pub async fn extract_batch<I>(&self, inputs: I, cancel: CancellationToken) -> BatchOutput
    where
        I: IntoIterator,
        I::Item: Into<DocumentSource>,
    {
        let batch_start = Instant::now();
        let sources: Vec<DocumentSource> = inputs.into_iter().map(Into::into).collect();
        let total = sources.len();
        let callback = self.config.progress_callback.clone();

        if let Some(ref cb) = callback {
            cb.on_batch_start(total);
        }
        info!("Starting batch of {} documents", total);

        let documents: Vec<DocumentResult> = stream::iter(sources.into_iter().enumerate().map(|(idx, source)| {
            let cancel = cancel.clone();
            let callback = callback.clone();
            async move {
                if cancel.is_cancelled() {
                    return None;
                }
                let name = source.name();
                if let Some(ref cb) = callback {
                    cb.on_document_start(idx, total, &name);
                }

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => DocumentResult::failure(
                        name.clone(),
                        DocumentError::Cancelled { file: name.clone() },
                        DocumentStats::default(),
                    ),
                    result = self.extract_source(source) => result,
                };

                if let Some(ref cb) = callback {
                    match &result.error {
                        None => cb.on_document_complete(idx, total, &result.name),
                        Some(e) => cb.on_document_error(idx, total, &result.name, &e.to_string()),
                    }
                }
                Some(result)
            }
        }))
        .buffered(self.config.concurrency.max(1))
        .filter_map(futures::future::ready)
        .collect()
        .await;

        let stats = BatchStats::from_results(&documents, total, batch_start.elapsed().as_millis() as u64);
        if stats.cancelled > 0 {
            warn!("Batch cancelled: {} of {} documents not processed", stats.cancelled, total);
        }
        info!(
            "Batch complete: {}/{} documents, {} in / {} out tokens, {}ms",
            stats.succeeded, total, stats.total_input_tokens, stats.total_output_tokens, stats.total_duration_ms
        );

        if let Some(ref cb) = callback {
            cb.on_batch_complete(total, stats.succeeded);
        }

        BatchOutput { documents, stats }
    }

    /// Extract a batch, export it as `format` and, when `history` is given,
    /// store it. History always keeps an xlsx workbook, whatever `format`.
    ///
    /// A failed save is logged and leaves `extraction_id` empty; it never
    /// fails the batch.
    pub async fn process_reports<I>(
        &self,
        inputs: I,
        cancel: CancellationToken,
        history: Option<Arc<dyn HistoryStore>>,
        format: ExportFormat,
    ) -> Result<Report, ExtractError>
    where
        I: IntoIterator,
        I::Item: Into<DocumentSource>,
    {
        let batch = self.extract_batch(inputs, cancel).await;
        let exported = format.export(batch.records())?;

        let extraction_id = match history {
            Some(store) => {
                let workbook = match format {
                    ExportFormat::Xlsx => exported.clone(),
                    ExportFormat::Csv => ExportFormat::Xlsx.export(batch.records())?,
                };
                save_history(store, batch.input_names(), workbook).await
            }
            None => None,
        };

        Ok(Report {
            batch,
            exported,
            format,
            extraction_id,
        })
    }
}

fn finish(
    name: &str,
    outcome: Result<FinalMetricRecord, ExtractError>,
    mut stats: DocumentStats,
    start: Instant,
) -> DocumentResult {
    stats.duration_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(record) => {
            info!(
                "Extracted {} in {}ms ({} snippets, {} in / {} out tokens)",
                name, stats.duration_ms, stats.selected_snippets, stats.input_tokens, stats.output_tokens
            );
            DocumentResult::success(name, record, stats)
        }
        Err(e) => {
            warn!("Skipping {}: {}", name, e);
            DocumentResult::failure(name, DocumentError::from_extract(name, &e), stats)
        }
    }
}

async fn save_history(store: Arc<dyn HistoryStore>, names: Vec<String>, workbook: Vec<u8>) -> Option<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let task_id = id.clone();
    let saved = tokio::task::spawn_blocking(move || store.save(&task_id, &names, &workbook)).await;
    match saved {
        Ok(Ok(record)) => {
            info!("Saved extraction {} to history", record.id);
            Some(id)
        }
        Ok(Err(e)) => {
            warn!("Could not save extraction history: {}", e);
            None
        }
        Err(e) => {
            warn!("History task panicked: {}", e);
            None
        }
    }
}

// ── No-LLM helpers ───────────────────────────────────────────────────────

/// Extract PDF metadata without selecting content or calling a model.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(input_str: impl AsRef<str>, config: &ExtractionConfig) -> Result<DocumentMetadata, ExtractError> {
    let doc = input::resolve_input(input_str.as_ref(), config).await?;
    let loader: Arc<dyn DocumentLoader> = Arc::new(PdfiumLoader::new(config.pdfium_lib_path.clone()));
    load::load_metadata(loader, doc.name, doc.bytes, config.password.clone()).await
}

/// Load a document and run the content selector on it, without a model.
pub async fn select_input(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<(Document, CandidateContent), ExtractError> {
    let doc = input::resolve_input(input_str.as_ref(), config).await?;
    let loader: Arc<dyn DocumentLoader> = Arc::new(PdfiumLoader::new(config.pdfium_lib_path.clone()));
    let document = load::load_document(loader, doc.name, doc.bytes, config.password.clone()).await?;
    let selector = ContentSelector::from_config(Arc::new(UnicodeSentenceSegmenter), config)?;
    let content = selector.select(&document);
    Ok((document, content))
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured even when several API keys are present.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", config.model.as_deref().unwrap_or(DEFAULT_MODEL));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
