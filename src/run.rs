//! Pipeline orchestration: one [`RunRequest`] in, one deck file out.
//!
//! ## State machine
//!
//! ```text
//! Idle → Extracting → Prompting → Requesting → Parsing → Building → Done
//!   └──────────┴────────────┴────────────┴──────────┴─────────┴──→ Failed
//! ```
//!
//! Each transition happens only after the previous step finished without a
//! fatal error. A fatal error moves the run to `Failed` and is returned as a
//! [`RunFailure`] that records the stage it came from. Non-fatal parse
//! failures never fail a run; they are collected in [`RunOutput::skipped`].
//!
//! Cheap checks (deck name, template placeholder, provider credentials) run
//! while still `Idle`, so a misconfigured run fails before the PDF is read
//! and before any request is sent.
//!
//! In offline mode `Prompting` and `Requesting` are skipped and cards come
//! from [`crate::pipeline::heuristic`] instead of a model.

use crate::card::{CardMode, Deck};
use crate::config::{source_label, RunConfig, RunRequest};
use crate::error::Pdf2AnkiError;
use crate::output::{DocumentInfo, RunOutput, RunStats};
use crate::pipeline::llm::{CompletionProvider, LlmClient};
use crate::pipeline::parse::ParseOutcome;
use crate::pipeline::{deck, extract, heuristic, input, parse};
use crate::progress::ProgressCallback;
use crate::prompts::{self, PromptRequest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Extracting,
    Prompting,
    Requesting,
    Parsing,
    Building,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Extracting => "extracting text",
            RunState::Prompting => "building prompt",
            RunState::Requesting => "waiting for model",
            RunState::Parsing => "parsing cards",
            RunState::Building => "writing deck",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A failed run: the stage that failed and why.
#[derive(Debug, Error)]
#[error("Run failed while {stage}: {error}")]
pub struct RunFailure {
    pub stage: RunState,
    #[source]
    pub error: Pdf2AnkiError,
}

/// Tracks the current state and forwards transitions to the callback.
struct Tracker {
    state: RunState,
    callback: Option<ProgressCallback>,
}

impl Tracker {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            state: RunState::Idle,
            callback,
        }
    }

    fn advance(&mut self, to: RunState) {
        debug!("Run state: {:?} → {:?}", self.state, to);
        if let Some(ref cb) = self.callback {
            cb.on_state_change(self.state, to);
        }
        self.state = to;
    }

    fn fail(&mut self, error: Pdf2AnkiError) -> RunFailure {
        let stage = self.state;
        warn!("Run failed while {}: {}", stage, error);
        if let Some(ref cb) = self.callback {
            cb.on_state_change(stage, RunState::Failed);
            cb.on_run_failed(stage, &error);
        }
        self.state = RunState::Failed;
        RunFailure { stage, error }
    }
}

/// Lift a `Result<T, Pdf2AnkiError>` into the run's failure path.
macro_rules! step {
    ($tracker:expr, $e:expr) => {
        match $e {
            Ok(v) => v,
            Err(err) => return Err($tracker.fail(err)),
        }
    };
}

/// Pick the injected provider, or build an [`LlmClient`] from credentials.
fn resolve_provider(
    req: &RunRequest,
    config: &RunConfig,
) -> Result<Arc<dyn CompletionProvider>, Pdf2AnkiError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    if req.provider.is_none() && req.model.is_none() {
        config.credentials.ensure_any()?;
    }
    let (provider, model) = req.resolved_model(&config.credentials);
    info!("Using provider {} with model {}", provider, model);
    let client = LlmClient::new(provider, model, &config.credentials, &config.llm)?;
    Ok(Arc::new(client))
}

/// Run the whole pipeline for one request.
///
/// # Returns
/// `Ok(RunOutput)` once the deck is on disk, even when some response blocks
/// were skipped (see `output.skipped`).
///
/// # Errors
/// `Err(RunFailure)` for any fatal error; no package file is left behind.
pub async fn run(req: &RunRequest, config: &RunConfig) -> Result<RunOutput, RunFailure> {
    let total_start = Instant::now();
    let mut tracker = Tracker::new(config.progress_callback.clone());
    info!("Starting run: {}", req.input.display());

    // ── Pre-flight (Idle) ────────────────────────────────────────────────
    let deck_name = step!(tracker, req.resolved_deck_name());
    let output_path = req.resolved_output(&deck_name);

    let template = req
        .template
        .as_deref()
        .unwrap_or_else(|| prompts::default_template(req.card_mode));
    let provider = if req.offline {
        if req.card_mode == CardMode::Cloze {
            return Err(tracker.fail(Pdf2AnkiError::InvalidConfig(
                "offline mode only produces basic cards; drop --cloze or --offline".into(),
            )));
        }
        None
    } else {
        step!(tracker, prompts::validate_template(template));
        Some(step!(tracker, resolve_provider(req, config)))
    };

    // ── Extracting ───────────────────────────────────────────────────────
    tracker.advance(RunState::Extracting);
    let extract_start = Instant::now();
    let pdf_path = step!(tracker, input::resolve_local(&req.input));
    let document = step!(
        tracker,
        extract::extract_text(&pdf_path, req.extraction, &req.pages).await
    );
    let text = document.text();
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    if let Some(ref cb) = config.progress_callback {
        cb.on_text_extracted(document.pages.len(), document.char_count());
    }

    let mut stats = RunStats {
        total_pages: document.total_pages,
        pages_read: document.pages.len(),
        extracted_chars: document.char_count(),
        extract_duration_ms,
        ..RunStats::default()
    };

    // ── Prompting → Requesting → Parsing ─────────────────────────────────
    let outcome = match provider {
        Some(provider) => {
            tracker.advance(RunState::Prompting);
            let prompt = step!(
                tracker,
                prompts::build_prompt(&PromptRequest {
                    template,
                    text: &text,
                    mode: req.card_mode,
                })
            );
            stats.prompt_chars = prompt.chars().count();

            tracker.advance(RunState::Requesting);
            let llm_start = Instant::now();
            let response = step!(tracker, provider.complete(&prompt).await);
            stats.llm_duration_ms = llm_start.elapsed().as_millis() as u64;
            stats.response_chars = response.text.chars().count();
            stats.provider = Some(response.provider);
            stats.model = Some(response.model.clone());
            stats.input_tokens = response.input_tokens;
            stats.output_tokens = response.output_tokens;

            tracker.advance(RunState::Parsing);
            parse::parse_cards(&response.text, req.card_mode)
        }
        None => {
            tracker.advance(RunState::Parsing);
            ParseOutcome {
                cards: heuristic::extract_cards(&text),
                skipped: Vec::new(),
            }
        }
    };
    if let Some(ref cb) = config.progress_callback {
        for failure in &outcome.skipped {
            cb.on_block_skipped(failure);
        }
    }
    info!(
        "Parsed {} cards, skipped {} blocks",
        outcome.cards.len(),
        outcome.skipped.len()
    );

    // ── Building ─────────────────────────────────────────────────────────
    tracker.advance(RunState::Building);
    if outcome.cards.is_empty() {
        return Err(tracker.fail(Pdf2AnkiError::EmptyDeck {
            deck: deck_name,
            skipped: outcome.skipped.len(),
        }));
    }
    let deck = Deck::new(
        deck_name.clone(),
        source_label(&req.input, &deck_name),
        outcome.cards,
    );
    let summary = step!(tracker, deck::build_deck(&deck, &output_path).await);

    tracker.advance(RunState::Done);
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(&summary.path, deck.len(), outcome.skipped.len());
    }

    let output = RunOutput {
        deck_path: summary.path,
        deck_name,
        card_mode: req.card_mode,
        cards: deck.cards,
        skipped: outcome.skipped,
        stats,
    };
    info!("{} ({}ms)", output.summary(), output.stats.total_duration_ms);
    Ok(output)
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(req: &RunRequest, config: &RunConfig) -> Result<RunOutput, RunFailure> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RunFailure {
            stage: RunState::Idle,
            error: Pdf2AnkiError::Internal(format!("Failed to create tokio runtime: {e}")),
        })?
        .block_on(run(req, config))
}

/// Render the prompt a run would send, without contacting any provider.
pub async fn preview_prompt(req: &RunRequest) -> Result<String, Pdf2AnkiError> {
    let template = req
        .template
        .as_deref()
        .unwrap_or_else(|| prompts::default_template(req.card_mode));
    prompts::validate_template(template)?;

    let pdf_path = input::resolve_local(&req.input)?;
    let document = extract::extract_text(&pdf_path, req.extraction, &req.pages).await?;
    let text = document.text();
    prompts::build_prompt(&PromptRequest {
        template,
        text: &text,
        mode: req.card_mode,
    })
}

/// Page count and metadata of a PDF. Needs no credentials.
pub async fn inspect(path: &Path) -> Result<DocumentInfo, Pdf2AnkiError> {
    let pdf_path = input::resolve_local(path)?;
    extract::inspect(&pdf_path).await
}
