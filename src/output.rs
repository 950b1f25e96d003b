//! Result types returned by a run.

use crate::card::{Card, CardMode};
use crate::credentials::Provider;
use crate::error::ParseFailure;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Successful run: where the deck went and what was skipped on the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// Path of the written `.apkg` file.
    pub deck_path: PathBuf,
    pub deck_name: String,
    pub card_mode: CardMode,
    /// Cards written, in response order.
    pub cards: Vec<Card>,
    /// Response blocks that did not parse.
    pub skipped: Vec<ParseFailure>,
    pub stats: RunStats,
}

impl RunOutput {
    /// "N cards generated, M blocks skipped".
    pub fn summary(&self) -> String {
        format!(
            "{} cards generated, {} blocks skipped",
            self.cards.len(),
            self.skipped.len()
        )
    }
}

/// Timings and sizes for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages actually read.
    pub pages_read: usize,
    pub extracted_chars: usize,
    pub prompt_chars: usize,
    pub response_chars: usize,
    /// `None` in offline mode.
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub extract_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// PDF metadata, available without an API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_count: usize,
    pub pdf_version: String,
    pub is_encrypted: bool,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub producer: Option<String>,
}
