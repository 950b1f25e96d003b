//! Integration tests for the whole run: generated PDF in, `.apkg` out.
//!
//! The model is replaced by [`ScriptedProvider`], so these run offline and
//! deterministically. `LlmClient` itself is covered by unit tests
//! against a loopback responder in `pipeline::llm`.

mod common;

use async_trait::async_trait;
use edgequake_pdf2anki::{
    read_deck, run, Card, CardMode, CompletionProvider, Credentials, ErrorKind, ModelResponse,
    PageSelection, ParseFailure, Pdf2AnkiError, PipelineProgressCallback, Provider, RunConfig,
    RunRequest, RunState, SkipReason,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Returns a fixed reply (or error) and records every prompt it receives.
struct ScriptedProvider {
    reply: Result<String, fn() -> Pdf2AnkiError>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(err: fn() -> Pdf2AnkiError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(err),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str) -> Result<ModelResponse, Pdf2AnkiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(text) => Ok(ModelResponse {
                text: text.clone(),
                provider: Provider::OpenAi,
                model: "scripted".into(),
                input_tokens: Some(120),
                output_tokens: Some(40),
            }),
            Err(make) => Err(make()),
        }
    }

    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingCallback {
    states: Mutex<Vec<RunState>>,
    skipped: Mutex<Vec<ParseFailure>>,
    extracted: Mutex<Option<(usize, usize)>>,
    completed: Mutex<Option<(usize, usize)>>,
    failed_at: Mutex<Option<RunState>>,
}

impl PipelineProgressCallback for RecordingCallback {
    fn on_state_change(&self, _from: RunState, to: RunState) {
        self.states.lock().unwrap().push(to);
    }

    fn on_text_extracted(&self, pages: usize, chars: usize) {
        *self.extracted.lock().unwrap() = Some((pages, chars));
    }

    fn on_block_skipped(&self, failure: &ParseFailure) {
        self.skipped.lock().unwrap().push(failure.clone());
    }

    fn on_run_complete(&self, _deck_path: &Path, cards: usize, skipped: usize) {
        *self.completed.lock().unwrap() = Some((cards, skipped));
    }

    fn on_run_failed(&self, stage: RunState, _error: &Pdf2AnkiError) {
        *self.failed_at.lock().unwrap() = Some(stage);
    }
}

fn config_with(provider: Arc<ScriptedProvider>) -> RunConfig {
    RunConfig::builder().provider(provider).build().unwrap()
}

fn apkg_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.contains(".apkg"))
        .collect()
}

const BASIC_REPLY: &str = "Here are your flashcards:

Q: What produces most of the ATP in a cell?
A: Mitochondria.

Q: An orphan question with no answer

Q: Where is DNA stored?
A: In the nucleus.
";

// ── Basic mode ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn basic_run_writes_deck_matching_parsed_cards() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = common::biology_pdf(dir.path());
    let out_dir = dir.path().join("decks");

    let provider = ScriptedProvider::replying(BASIC_REPLY);
    let req = RunRequest::new(&pdf)
        .deck_name("Biology")
        .output_dir(&out_dir);
    let output = run(&req, &config_with(provider.clone())).await.unwrap();

    // The prompt carries the PDF text where the placeholder was.
    assert_eq!(provider.calls(), 1);
    let prompt = provider.last_prompt();
    assert!(prompt.contains("Mitochondria produce most of the ATP"));
    assert!(prompt.contains("DNA stores genetic information"));
    assert!(!prompt.contains("{text}"));

    assert_eq!(
        output.cards,
        vec![
            Card::basic("What produces most of the ATP in a cell?", "Mitochondria."),
            Card::basic("Where is DNA stored?", "In the nucleus."),
        ]
    );
    assert_eq!(output.skipped.len(), 1);
    assert_eq!(output.skipped[0].reason, SkipReason::MissingAnswer);
    assert_eq!(output.summary(), "2 cards generated, 1 blocks skipped");
    assert_eq!(output.deck_path, out_dir.join("Biology.apkg"));
    assert_eq!(output.stats.pages_read, 2);
    assert_eq!(output.stats.input_tokens, Some(120));

    let deck = read_deck(&output.deck_path).unwrap();
    assert_eq!(deck.decks, vec!["Biology".to_string()]);
    assert_eq!(deck.notes.len(), output.cards.len());
    assert_eq!(deck.card_count(), 2);
    assert_eq!(deck.notes[0].fields[0], "What produces most of the ATP in a cell?");
    assert_eq!(deck.notes[0].fields[1], "Mitochondria.");
    assert_eq!(deck.notes[0].fields[2], "biology.pdf");
    assert_eq!(deck.notes[1].fields[0], "Where is DNA stored?");
}

#[tokio::test]
async fn deck_name_defaults_to_pdf_stem() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = common::biology_pdf(dir.path());
    let provider = ScriptedProvider::replying("Q: q?\nA: a.");
    let req = RunRequest::new(&pdf).output_dir(dir.path());
    let output = run(&req, &config_with(provider)).await.unwrap();

    assert_eq!(output.deck_name, "biology");
    assert_eq!(output.deck_path, dir.path().join("biology.apkg"));
}

#[tokio::test]
async fn page_selection_limits_prompt_text() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = common::biology_pdf(dir.path());
    let provider = ScriptedProvider::replying("Q: q?\nA: a.");
    let req = RunRequest::new(&pdf)
        .output_dir(dir.path())
        .pages(PageSelection::Single(2));
    let output = run(&req, &config_with(provider.clone())).await.unwrap();

    assert_eq!(output.stats.total_pages, 2);
    assert_eq!(output.stats.pages_read, 1);
    let prompt = provider.last_prompt();
    assert!(prompt.contains("DNA stores"));
    assert!(!prompt.contains("Mitochondria"));
}

// ── Cloze mode ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn cloze_run_produces_one_card_per_deletion_number() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = common::biology_pdf(dir.path());
    let reply = "Text: {{c1::Mitochondria}} produce most of the {{c2::ATP}} in a cell.
Extra: Cellular respiration.

Text: Ribosomes build proteins.
Extra: no deletion here

Text: {{c1::DNA}} is stored in the nucleus.
";
    let provider = ScriptedProvider::replying(reply);
    let req = RunRequest::new(&pdf)
        .deck_name("Bio")
        .card_mode(CardMode::Cloze)
        .output_dir(dir.path());
    let output = run(&req, &config_with(provider.clone())).await.unwrap();

    // Cloze format instructions were appended to the default cloze template.
    assert!(provider.last_prompt().contains("{{c1::"));

    assert_eq!(output.cards.len(), 2);
    assert_eq!(output.skipped.len(), 1);
    assert_eq!(output.skipped[0].reason, SkipReason::MissingClozeDeletion);
    assert_eq!(output.deck_path, dir.path().join("Bio_cloze.apkg"));

    let deck = read_deck(&output.deck_path).unwrap();
    assert_eq!(deck.notes.len(), 2);
    assert_eq!(deck.notes[0].note_type, "PDFToAnki Cloze");
    assert_eq!(deck.notes[0].cards, 2);
    assert_eq!(deck.notes[1].cards, 1);
    assert_eq!(deck.notes[1].fields[1], "");
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unparseable_reply_fails_with_empty_deck_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = common::biology_pdf(dir.path());
    let provider = ScriptedProvider::replying("Sorry, I cannot help with that.\nQ: only a question");
    let req = RunRequest::new(&pdf).output_dir(dir.path());

    let failure = run(&req, &config_with(provider)).await.unwrap_err();
    assert_eq!(failure.stage, RunState::Building);
    assert_eq!(failure.error.kind(), ErrorKind::Configuration);
    assert!(matches!(
        failure.error,
        Pdf2AnkiError::EmptyDeck { skipped: 1, .. }
    ));
    assert!(apkg_files(dir.path()).is_empty());
}

#[tokio::test]
async fn template_without_placeholder_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = common::biology_pdf(dir.path());
    let provider = ScriptedProvider::replying("Q: q?\nA: a.");
    let req = RunRequest::new(&pdf)
        .template("Make flashcards please.")
        .output_dir(dir.path());

    let failure = run(&req, &config_with(provider.clone())).await.unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Configuration);
    assert!(failure.error.to_string().contains("{text}"));
    assert_eq!(provider.calls(), 0);
    assert!(apkg_files(dir.path()).is_empty());
}

#[tokio::test]
async fn missing_key_for_chosen_provider_is_authentication_error() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = common::biology_pdf(dir.path());
    let config = RunConfig::builder()
        .credentials(Credentials::empty().with_key(Provider::OpenAi, "sk-test"))
        .build()
        .unwrap();
    let req = RunRequest::new(&pdf)
        .provider(Provider::Perplexity)
        .output_dir(dir.path());

    let failure = run(&req, &config).await.unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Authentication);
    assert!(failure.error.to_string().contains("PERPLEXITY_API_KEY"));
    assert!(apkg_files(dir.path()).is_empty());
}

#[tokio::test]
async fn transport_error_is_reported_with_stage() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = common::biology_pdf(dir.path());
    let provider = ScriptedProvider::failing(|| Pdf2AnkiError::Timeout {
        provider: "openai".into(),
        secs: 120,
    });
    let cb = Arc::new(RecordingCallback::default());
    let config = RunConfig::builder()
        .provider(provider)
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let req = RunRequest::new(&pdf).output_dir(dir.path());

    let failure = run(&req, &config).await.unwrap_err();
    assert_eq!(failure.stage, RunState::Requesting);
    assert_eq!(failure.error.kind(), ErrorKind::Transport);
    assert_eq!(*cb.failed_at.lock().unwrap(), Some(RunState::Requesting));
    assert_eq!(cb.states.lock().unwrap().last(), Some(&RunState::Failed));
    assert!(apkg_files(dir.path()).is_empty());
}

#[tokio::test]
async fn non_pdf_input_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let fake = dir.path().join("notes.pdf");
    std::fs::write(&fake, "just some text").unwrap();
    let provider = ScriptedProvider::replying("Q: q?\nA: a.");
    let req = RunRequest::new(&fake).output_dir(dir.path());

    let failure = run(&req, &config_with(provider.clone())).await.unwrap_err();
    assert_eq!(failure.stage, RunState::Extracting);
    assert_eq!(failure.error.kind(), ErrorKind::Io);
    assert_eq!(provider.calls(), 0);
}

// ── Progress and offline ─────────────────────────────────────────────────────

#[tokio::test]
async fn progress_callback_sees_every_stage_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = common::biology_pdf(dir.path());
    let cb = Arc::new(RecordingCallback::default());
    let config = RunConfig::builder()
        .provider(ScriptedProvider::replying(BASIC_REPLY))
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let req = RunRequest::new(&pdf).output_dir(dir.path());

    run(&req, &config).await.unwrap();

    assert_eq!(
        *cb.states.lock().unwrap(),
        vec![
            RunState::Extracting,
            RunState::Prompting,
            RunState::Requesting,
            RunState::Parsing,
            RunState::Building,
            RunState::Done,
        ]
    );
    let extracted = *cb.extracted.lock().unwrap();
    let (pages, chars) = extracted.unwrap();
    assert_eq!(pages, 2);
    assert!(chars > 0);
    assert_eq!(cb.skipped.lock().unwrap().len(), 1);
    assert_eq!(*cb.completed.lock().unwrap(), Some((2, 1)));
    assert!(cb.failed_at.lock().unwrap().is_none());
}

#[tokio::test]
async fn offline_run_uses_markers_in_the_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = common::write_pdf(
        dir.path(),
        "faq.pdf",
        &["Q: What is osmosis?\nA: Diffusion of water across a membrane.\nQ: What is a gene?\nA: A unit of heredity."],
    );
    let cb = Arc::new(RecordingCallback::default());
    let config = RunConfig::builder()
        .progress_callback(cb.clone())
        .build()
        .unwrap();
    let req = RunRequest::new(&pdf).offline(true).output_dir(dir.path());

    let output = run(&req, &config).await.unwrap();
    assert_eq!(output.cards.len(), 2);
    assert_eq!(output.cards[0].front(), "What is osmosis?");
    assert!(output.stats.provider.is_none());

    let states = cb.states.lock().unwrap().clone();
    assert!(!states.contains(&RunState::Requesting));
    assert!(!states.contains(&RunState::Prompting));
    assert_eq!(states.last(), Some(&RunState::Done));

    let deck = read_deck(&output.deck_path).unwrap();
    assert_eq!(deck.notes.len(), 2);
    assert_eq!(deck.notes[0].note_type, "PDFToAnki Basic");
}
