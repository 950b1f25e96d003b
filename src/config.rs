//! Configuration types for PDF-to-Anki runs.
//!
//! Two values drive a run:
//!
//! * [`RunRequest`] — *what* to do: which PDF, which pages, which card mode,
//!   which template, where the deck goes. The CLI builds one per invocation
//!   and hands it to [`crate::run::run`].
//! * [`RunConfig`] — *how* to do it: credentials, HTTP knobs, an optional
//!   pre-built provider and a progress callback. Built via
//!   [`RunConfigBuilder`] and reusable across runs.

use crate::card::CardMode;
use crate::credentials::{Credentials, Provider};
use crate::error::Pdf2AnkiError;
use crate::pipeline::llm::CompletionProvider;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-run settings for the LLM request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmOptions {
    /// Maximum tokens the model may generate. Default: 4096.
    pub max_tokens: usize,

    /// Sampling temperature. `None` uses the provider default
    /// (Perplexity requests fall back to 0.2).
    pub temperature: Option<f32>,

    /// Whole-request timeout in seconds. Default: 120.
    pub timeout_secs: u64,

    /// Override the provider's API base URL (gateways, local proxies, tests).
    pub base_url: Option<String>,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: None,
            timeout_secs: 120,
            base_url: None,
        }
    }
}

/// Everything about *how* a run is carried out.
#[derive(Clone, Default)]
pub struct RunConfig {
    /// API keys, read once at startup.
    pub credentials: Credentials,

    /// LLM request options.
    pub llm: LlmOptions,

    /// Pre-constructed provider. Takes precedence over credentials.
    pub provider: Option<Arc<dyn CompletionProvider>>,

    /// Stage-by-stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("credentials", &self.credentials)
            .field("llm", &self.llm)
            .field(
                "provider",
                &self.provider.as_ref().map(|_| "<dyn CompletionProvider>"),
            )
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl RunConfig {
    /// Create a new builder for `RunConfig`.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RunConfig`].
#[derive(Debug)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.llm.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.llm.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.llm.timeout_secs = secs;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.llm.base_url = Some(url.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RunConfig, Pdf2AnkiError> {
        let c = &self.config;
        if c.llm.max_tokens == 0 {
            return Err(Pdf2AnkiError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.llm.timeout_secs == 0 {
            return Err(Pdf2AnkiError::InvalidConfig(
                "timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Run request ──────────────────────────────────────────────────────────

/// One user-initiated conversion: the command handed to [`crate::run::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// PDF to read.
    pub input: PathBuf,

    /// Exact output file. Takes precedence over `output_dir`.
    pub output: Option<PathBuf>,

    /// Directory for the default-named package. Default: current directory.
    pub output_dir: Option<PathBuf>,

    /// Deck name. `None` uses the PDF file stem.
    pub deck_name: Option<String>,

    pub card_mode: CardMode,

    pub extraction: ExtractionMode,

    pub pages: PageSelection,

    /// Prompt template. `None` uses the built-in template for `card_mode`.
    pub template: Option<String>,

    /// Provider choice. `None` infers it from `model` or the available keys.
    pub provider: Option<Provider>,

    /// Model identifier. `None` uses the provider default.
    pub model: Option<String>,

    /// Build cards straight from the PDF text without calling an LLM.
    pub offline: bool,
}

impl RunRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            output_dir: None,
            deck_name: None,
            card_mode: CardMode::default(),
            extraction: ExtractionMode::default(),
            pages: PageSelection::default(),
            template: None,
            provider: None,
            model: None,
            offline: false,
        }
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn deck_name(mut self, name: impl Into<String>) -> Self {
        self.deck_name = Some(name.into());
        self
    }

    pub fn card_mode(mut self, mode: CardMode) -> Self {
        self.card_mode = mode;
        self
    }

    pub fn extraction(mut self, mode: ExtractionMode) -> Self {
        self.extraction = mode;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.pages = selection;
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn offline(mut self, v: bool) -> Self {
        self.offline = v;
        self
    }

    /// The deck name to use, validated non-empty.
    pub fn resolved_deck_name(&self) -> Result<String, Pdf2AnkiError> {
        let name = match &self.deck_name {
            Some(name) => name.trim().to_string(),
            None => self
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().trim().to_string())
                .unwrap_or_default(),
        };
        if name.is_empty() {
            return Err(Pdf2AnkiError::EmptyDeckName);
        }
        Ok(name)
    }

    /// Where the package will be written.
    ///
    /// Without an explicit `output`, the file is `<deck>.apkg` for basic
    /// cards and `<deck>_cloze.apkg` for cloze cards inside `output_dir`.
    pub fn resolved_output(&self, deck_name: &str) -> PathBuf {
        if let Some(ref path) = self.output {
            return path.clone();
        }
        let dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        dir.join(default_package_filename(deck_name, self.card_mode))
    }

    /// Pick the provider and model for this run.
    ///
    /// Resolution order: explicit provider (with explicit or default model),
    /// then provider inferred from an explicit model, then the first provider
    /// with a key present, then OpenAI (whose missing key is reported when
    /// the client is built).
    pub fn resolved_model(&self, credentials: &Credentials) -> (Provider, String) {
        match (self.provider, self.model.as_deref()) {
            (Some(p), Some(m)) => (p, m.to_string()),
            (Some(p), None) => (p, p.default_model().to_string()),
            (None, Some(m)) => (Provider::infer_from_model(m), m.to_string()),
            (None, None) => {
                let p = credentials
                    .available()
                    .into_iter()
                    .next()
                    .unwrap_or(Provider::OpenAi);
                (p, p.default_model().to_string())
            }
        }
    }
}

/// File name for a deck written without an explicit output path.
pub fn default_package_filename(deck_name: &str, mode: CardMode) -> String {
    let stem: String = deck_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    match mode {
        CardMode::Basic => format!("{stem}.apkg"),
        CardMode::Cloze => format!("{stem}_cloze.apkg"),
    }
}

/// Source label stored in each note: the PDF file name, or the deck name.
pub fn source_label(input: &Path, deck_name: &str) -> String {
    input
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| deck_name.to_string())
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How text is pulled out of the PDF.
///
/// | Mode | Backend | Use case |
/// |------|---------|----------|
/// | Standard | `lopdf` content-stream walk | Plain single-column text (default) |
/// | Layout | `pdf-extract` glyph positioning | Multi-column pages, tables, odd fonts |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    #[default]
    Standard,
    Layout,
}

/// Specifies which pages of the PDF to read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::All => f.write_str("all"),
            PageSelection::Single(p) => write!(f, "{p}"),
            PageSelection::Range(s, e) => write!(f, "{s}-{e}"),
            PageSelection::Set(pages) => {
                let parts: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}
