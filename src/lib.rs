//! # edgequake-pdf2anki
//!
//! Turn PDF documents into Anki flashcard decks using Large Language Models.
//!
//! ## How it works
//!
//! The text of the PDF is extracted, substituted into a prompt template and
//! sent to an LLM in a single request. The model answers with flashcards in
//! a plain marker format (`Q:`/`A:` or `Text:`/`Extra:`), which is parsed
//! leniently: a block that does not parse is skipped and reported, it never
//! aborts the run. The parsed cards are written as an `.apkg` package that
//! Anki imports directly.
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     check path and %PDF magic
//!  ├─ 2. Extract   page text via lopdf / pdf-extract (spawn_blocking)
//!  ├─ 3. Prompt    template + {text} (+ cloze format instructions)
//!  ├─ 4. Request   one call to OpenAI / Anthropic / Perplexity
//!  ├─ 5. Parse     marker blocks → cards, malformed blocks skipped
//!  └─ 6. Build     SQLite collection zipped into <deck>.apkg
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2anki::{run, Credentials, RunConfig, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::builder()
//!         .credentials(Credentials::from_env())
//!         .build()?;
//!     let request = RunRequest::new("lecture.pdf").deck_name("Lecture 3");
//!     let output = run(&request, &config).await?;
//!     println!("{} → {}", output.summary(), output.deck_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2anki` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! edgequake-pdf2anki = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod apkg;
pub mod card;
pub mod config;
pub mod credentials;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod preferences;
pub mod progress;
pub mod prompts;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use card::{Card, CardMode, Deck};
pub use config::{ExtractionMode, LlmOptions, PageSelection, RunConfig, RunConfigBuilder, RunRequest};
pub use credentials::{Credentials, Provider};
pub use error::{ErrorKind, ParseFailure, Pdf2AnkiError, SkipReason};
pub use output::{DocumentInfo, RunOutput, RunStats};
pub use pipeline::deck::{build_deck, read_deck, DeckSummary};
pub use pipeline::llm::{CompletionProvider, LlmClient, ModelResponse};
pub use pipeline::parse::{parse_cards, ParseOutcome};
pub use preferences::Preferences;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use prompts::{build_prompt, PromptRequest};
pub use run::{inspect, preview_prompt, run, run_sync, RunFailure, RunState};
