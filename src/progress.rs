//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::RunConfigBuilder::progress_callback`] to receive events
//! as the run moves through its stages. The CLI forwards them to an
//! `indicatif` spinner; a GUI would forward them over a channel to its event
//! loop. The trait is `Send + Sync` because the pipeline usually runs on a
//! spawned task, not on the thread that renders progress.

use crate::error::{ParseFailure, Pdf2AnkiError};
use crate::run::RunState;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it moves between stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called on every state transition, including the move to `Done` or `Failed`.
    fn on_state_change(&self, from: RunState, to: RunState) {
        let _ = (from, to);
    }

    /// Called once text extraction finished.
    ///
    /// # Arguments
    /// * `pages` — number of pages read
    /// * `chars` — total characters extracted
    fn on_text_extracted(&self, pages: usize, chars: usize) {
        let _ = (pages, chars);
    }

    /// Called for each response block that was skipped.
    fn on_block_skipped(&self, failure: &ParseFailure) {
        let _ = failure;
    }

    /// Called once the package is on disk.
    fn on_run_complete(&self, deck_path: &Path, cards: usize, skipped: usize) {
        let _ = (deck_path, cards, skipped);
    }

    /// Called once when the run fails.
    fn on_run_failed(&self, stage: RunState, error: &Pdf2AnkiError) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RunConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
