//! Configuration types for earnings-metric extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The content-selection heuristics live
//! here as plain values so they can be tuned per deployment without touching
//! the selector itself.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default salience pattern. Case-sensitive on purpose: "Gross" in an
/// all-caps header does not match.
pub const DEFAULT_SALIENCE_PATTERN: &str = r"\$|gross|million|billion|%";

/// Default model when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-5-nano";

/// Upload cap enforced before a document reaches the pipeline (20 MB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 20 * 1024 * 1024;

/// Configuration for an extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_earnings::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4.1-mini")
///     .api_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Sentences always kept from the top of the first page. Default: 3.
    ///
    /// Company name and reporting period are almost always stated there.
    pub header_sentences: usize,

    /// Regex a sentence must match to be kept. Default: [`DEFAULT_SALIENCE_PATTERN`].
    pub salience_pattern: String,

    /// Tables whose empty-cell fraction is at or above this are dropped. Default: 0.5.
    pub max_empty_cell_ratio: f64,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. None leaves the provider default, which some
    /// reasoning models require.
    pub temperature: Option<f32>,

    /// Maximum tokens the LLM may generate. None leaves the provider default.
    pub max_tokens: Option<usize>,

    /// Custom extraction prompt. Must contain `{input}`. If None, uses the built-in prompt.
    pub extraction_prompt: Option<String>,

    /// Per-document LLM call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Largest accepted document in bytes. Default: 20 MB.
    pub max_file_size: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory holding libpdfium. If None, pdfium is bound from the system.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Documents processed at once in a batch. Default: 1 (sequential).
    ///
    /// Output rows keep submission order whatever the value.
    pub concurrency: usize,

    /// Optional per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            header_sentences: 3,
            salience_pattern: DEFAULT_SALIENCE_PATTERN.to_string(),
            max_empty_cell_ratio: 0.5,
            model: None,
            provider_name: None,
            provider: None,
            temperature: None,
            max_tokens: None,
            extraction_prompt: None,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            password: None,
            pdfium_lib_path: None,
            concurrency: 1,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("header_sentences", &self.header_sentences)
            .field("salience_pattern", &self.salience_pattern)
            .field("max_empty_cell_ratio", &self.max_empty_cell_ratio)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_file_size", &self.max_file_size)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn header_sentences(mut self, n: usize) -> Self {
        self.config.header_sentences = n;
        self
    }

    pub fn salience_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.salience_pattern = pattern.into();
        self
    }

    pub fn max_empty_cell_ratio(mut self, ratio: f64) -> Self {
        self.config.max_empty_cell_ratio = ratio;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if let Err(e) = Regex::new(&c.salience_pattern) {
            return Err(ExtractError::InvalidConfig(format!(
                "salience pattern is not a valid regex: {e}"
            )));
        }
        if !(0.0..=1.0).contains(&c.max_empty_cell_ratio) {
            return Err(ExtractError::InvalidConfig(format!(
                "max empty-cell ratio must be within 0–1, got {}",
                c.max_empty_cell_ratio
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref prompt) = c.extraction_prompt {
            if !prompt.contains("{input}") {
                return Err(ExtractError::InvalidConfig(
                    "custom extraction prompt must contain an {input} placeholder".into(),
                ));
            }
        }
        Ok(self.config)
    }
}
