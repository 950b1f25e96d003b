//! CLI binary for edgequake-pdf2anki.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `RunRequest` + `RunConfig`, runs the pipeline and reports the result.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2anki::{
    inspect, preview_prompt, read_deck, run, CardMode, Credentials, ErrorKind, ExtractionMode,
    PageSelection, ParseFailure, Pdf2AnkiError, PipelineProgressCallback, Preferences,
    ProgressCallback, Provider, RunConfig, RunOutput, RunRequest, RunState,
};
use std::future::Future;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that shows the current stage and logs extraction and skipped
/// blocks above itself.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_state_change(&self, _from: RunState, to: RunState) {
        let (prefix, msg) = match to {
            RunState::Extracting => ("Reading", "extracting PDF text…"),
            RunState::Prompting => ("Prompt", "building prompt…"),
            RunState::Requesting => ("Model", "waiting for the model (this can take a minute)…"),
            RunState::Parsing => ("Parsing", "turning the response into cards…"),
            RunState::Building => ("Writing", "packaging deck…"),
            RunState::Idle | RunState::Done | RunState::Failed => return,
        };
        self.bar.set_prefix(prefix);
        self.bar.set_message(msg);
    }

    fn on_text_extracted(&self, pages: usize, chars: usize) {
        self.bar.println(format!(
            "  {} Extracted {} from {} page{}",
            green("✓"),
            dim(&format!("{chars} chars")),
            pages,
            if pages == 1 { "" } else { "s" }
        ));
    }

    fn on_block_skipped(&self, failure: &ParseFailure) {
        self.bar.println(format!(
            "  {} Skipped block {}: {}  {}",
            yellow("⚠"),
            failure.block,
            failure.reason,
            dim(&failure.excerpt)
        ));
    }

    fn on_run_complete(&self, _deck_path: &Path, _cards: usize, _skipped: usize) {
        self.bar.finish_and_clear();
    }

    fn on_run_failed(&self, _stage: RunState, _error: &Pdf2AnkiError) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic Q/A deck named after the file (writes ./lecture.apkg)
  pdf2anki lecture.pdf

  # Cloze cards from pages 3-10 with a custom deck name
  pdf2anki --cloze --pages 3-10 --deck-name "Cell Biology" lecture.pdf

  # Pick provider and model explicitly
  pdf2anki --provider anthropic --model claude-3-5-sonnet-latest notes.pdf

  # Multi-column PDF: use layout-aware extraction
  pdf2anki --layout paper.pdf -o decks/paper.apkg

  # No API key: derive cards from Q:/A: markers or question sentences
  pdf2anki --offline faq.pdf

  # See the prompt that would be sent, without calling the model
  pdf2anki --print-prompt --prompt-file my_prompt.txt notes.pdf

  # Remember a custom prompt for future cloze runs
  pdf2anki --save-prompt --cloze --prompt-file cloze_prompt.txt

  # PDF metadata / contents of a written deck (no API key needed)
  pdf2anki --inspect-only notes.pdf
  pdf2anki --inspect-deck notes.apkg

PROMPT TEMPLATES:
  A template is plain text containing the placeholder {text} exactly once;
  the extracted PDF text is substituted there. The model must answer with
  blocks of "Q: … / A: …" (basic) or "Text: … {{c1::…}} … / Extra: …" (cloze).
  Cloze format instructions are appended automatically unless the template
  already shows {{c1:: syntax.

SUPPORTED PROVIDERS:
  Provider     Default model          Key variable
  ─────────    ─────────────────────  ──────────────────
  openai       gpt-4o                 OPENAI_API_KEY
  anthropic    claude-3-sonnet-20240229 ANTHROPIC_API_KEY
  perplexity   sonar-pro              PERPLEXITY_API_KEY

EXIT CODES:
  0  success            3  authentication error
  1  other failure      4  network / provider error
  2  configuration      5  file read / write error
  130  interrupted (Ctrl-C); no deck is written

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY, ANTHROPIC_API_KEY, PERPLEXITY_API_KEY
  PDF2ANKI_PROVIDER, PDF2ANKI_MODEL   Override provider / model
  RUST_LOG                            Fine-grained log filter
  A .env file in the working directory is loaded automatically.
"#;

/// Turn PDF documents into Anki flashcard decks using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2anki",
    version,
    about = "Turn PDF documents into Anki flashcard decks using LLMs",
    long_about = "Extract the text of a PDF, ask an LLM (OpenAI, Anthropic or Perplexity) to \
write flashcards from it, and package the result as an .apkg deck ready to import into Anki.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to convert (or the .apkg file with --inspect-deck).
    #[arg(required_unless_present_any = ["list_providers", "save_prompt"])]
    input: Option<PathBuf>,

    /// Write the deck to this exact file.
    #[arg(short, long, env = "PDF2ANKI_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for the default-named deck file (<deck>.apkg / <deck>_cloze.apkg).
    #[arg(long, env = "PDF2ANKI_OUTPUT_DIR", conflicts_with = "output")]
    output_dir: Option<PathBuf>,

    /// Deck name. Default: the PDF file name without extension.
    #[arg(long, env = "PDF2ANKI_DECK_NAME")]
    deck_name: Option<String>,

    /// LLM provider: openai, anthropic, perplexity.
    #[arg(
        long,
        env = "PDF2ANKI_PROVIDER",
        long_help = "LLM provider. Inferred from --model, or from whichever API key is set, \
if omitted.\nSupported: openai, anthropic, perplexity."
    )]
    provider: Option<String>,

    /// Model ID (e.g. gpt-4o, claude-3-5-sonnet-latest, sonar-pro).
    #[arg(long, env = "PDF2ANKI_MODEL")]
    model: Option<String>,

    /// Text file holding a prompt template with a {text} placeholder.
    #[arg(long, env = "PDF2ANKI_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Generate cloze-deletion cards instead of question/answer cards.
    #[arg(long, env = "PDF2ANKI_CLOZE")]
    cloze: bool,

    /// Layout-aware text extraction (multi-column pages, tables).
    #[arg(long, env = "PDF2ANKI_LAYOUT")]
    layout: bool,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2ANKI_PAGES", default_value = "all")]
    pages: String,

    /// Build cards from Q:/A: markers or question sentences in the PDF, without an LLM.
    #[arg(long, env = "PDF2ANKI_OFFLINE")]
    offline: bool,

    /// Max tokens the model may generate.
    #[arg(long, env = "PDF2ANKI_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0). Default: provider default.
    #[arg(long, env = "PDF2ANKI_TEMPERATURE")]
    temperature: Option<f32>,

    /// LLM request timeout in seconds.
    #[arg(long, env = "PDF2ANKI_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Print the prompt that would be sent and exit.
    #[arg(long)]
    print_prompt: bool,

    /// Print PDF metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// List the decks and notes of an existing .apkg file.
    #[arg(long)]
    inspect_deck: bool,

    /// Show supported providers and which API keys are set.
    #[arg(long)]
    list_providers: bool,

    /// Save --prompt-file (and --provider/--model) as defaults for future runs.
    #[arg(long)]
    save_prompt: bool,

    /// Print the run result as JSON on stdout.
    #[arg(long, env = "PDF2ANKI_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PDF2ANKI_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2ANKI_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2ANKI_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Missing .env is the normal case.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs out of its way.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    match real_main(cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            ExitCode::from(exit_status(&e))
        }
    }
}

async fn real_main(cli: Cli, show_progress: bool) -> Result<()> {
    let credentials = Credentials::from_env();

    // ── Informational modes ──────────────────────────────────────────────
    if cli.list_providers {
        print_providers(&credentials);
        return Ok(());
    }

    let mode = if cli.cloze {
        CardMode::Cloze
    } else {
        CardMode::Basic
    };
    let provider = cli
        .provider
        .as_deref()
        .map(str::parse::<Provider>)
        .transpose()?;

    let prompt_from_file = match cli.prompt_file {
        Some(ref path) => Some(read_template(path).await?),
        None => None,
    };

    let mut prefs = Preferences::load().unwrap_or_else(|e| {
        warn!("Ignoring saved preferences: {e}");
        Preferences::default()
    });

    if cli.save_prompt {
        if let Some(ref template) = prompt_from_file {
            prefs.set_template(mode, template.clone());
        }
        if provider.is_some() {
            prefs.provider = provider;
        }
        if cli.model.is_some() {
            prefs.model = cli.model.clone();
        }
        let path = prefs.save().context("Failed to save preferences")?;
        if !cli.quiet {
            eprintln!("{} Saved preferences to {}", green("✔"), path.display());
        }
    }

    let Some(input) = cli.input.clone() else {
        return Ok(());
    };

    if cli.inspect_deck {
        let contents = read_deck(&input).context("Failed to inspect deck")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&contents).context("Failed to serialise deck")?
            );
        } else {
            println!("Decks:  {}", contents.decks.join(", "));
            println!("Notes:  {}", contents.notes.len());
            println!("Cards:  {}", contents.card_count());
            for (i, note) in contents.notes.iter().enumerate() {
                let front = note.fields.first().map(String::as_str).unwrap_or("");
                println!("{:>4}. [{}] {}", i + 1, note.note_type, front);
            }
        }
        return Ok(());
    }

    if cli.inspect_only {
        let info = inspect(&input).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise metadata")?
            );
        } else {
            println!("File:         {}", input.display());
            if let Some(ref t) = info.title {
                println!("Title:        {t}");
            }
            if let Some(ref a) = info.author {
                println!("Author:       {a}");
            }
            if let Some(ref s) = info.subject {
                println!("Subject:      {s}");
            }
            println!("Pages:        {}", info.page_count);
            println!("PDF Version:  {}", info.pdf_version);
            println!("Encrypted:    {}", info.is_encrypted);
            if let Some(ref p) = info.producer {
                println!("Producer:     {p}");
            }
        }
        return Ok(());
    }

    // ── Build request ────────────────────────────────────────────────────
    let mut request = RunRequest::new(input)
        .card_mode(mode)
        .pages(parse_pages(&cli.pages)?)
        .offline(cli.offline);
    if cli.layout {
        request = request.extraction(ExtractionMode::Layout);
    }
    if let Some(ref path) = cli.output {
        request = request.output(path);
    }
    if let Some(ref dir) = cli.output_dir {
        request = request.output_dir(dir);
    }
    if let Some(ref name) = cli.deck_name {
        request = request.deck_name(name);
    }
    if let Some(template) = prompt_from_file.or_else(|| prefs.template_for(mode).map(String::from)) {
        request = request.template(template);
    }
    request.provider = provider.or(prefs.provider);
    request.model = pick_model(provider, cli.model.clone(), &prefs);

    if cli.print_prompt {
        let prompt = preview_prompt(&request)
            .await
            .context("Failed to build prompt")?;
        println!("{prompt}");
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = RunConfig::builder()
        .credentials(credentials)
        .max_tokens(cli.max_tokens)
        .timeout_secs(cli.timeout);
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = run_until_interrupted(request, config, ctrl_c()).await?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        let mark = if output.skipped.is_empty() {
            green("✔")
        } else {
            yellow("⚠")
        };
        eprintln!(
            "{}  {}  →  {}",
            mark,
            output.summary(),
            bold(&output.deck_path.display().to_string())
        );
        if let (Some(i), Some(o)) = (output.stats.input_tokens, output.stats.output_tokens) {
            eprintln!(
                "   {} tokens in  /  {} tokens out  —  {}ms total",
                dim(&i.to_string()),
                dim(&o.to_string()),
                output.stats.total_duration_ms
            );
        }
    }

    Ok(())
}

/// `--model`, else the saved model when it belongs to the provider in use.
///
/// A saved model for a different provider than `--provider` is dropped so
/// that provider's default model is requested instead.
fn pick_model(cli_provider: Option<Provider>, cli_model: Option<String>, prefs: &Preferences) -> Option<String> {
    if cli_model.is_some() {
        return cli_model;
    }
    let saved = prefs.model.clone()?;
    match (cli_provider, prefs.provider) {
        (None, _) => Some(saved),
        (Some(p), Some(saved_provider)) => (p == saved_provider).then_some(saved),
        (Some(p), None) => (Provider::infer_from_model(&saved) == p).then_some(saved),
    }
}

/// Ctrl-C was pressed while the pipeline was running.
#[derive(Debug, thiserror::Error)]
#[error("Interrupted; no deck was written")]
struct Interrupted;

/// Resolves on the first Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Drive the pipeline on its own task until it finishes or `interrupt` fires.
///
/// On interrupt the task is aborted and awaited, so the run is dropped at its
/// current await point and any half-written package is discarded with it.
async fn run_until_interrupted(
    request: RunRequest,
    config: RunConfig,
    interrupt: impl Future<Output = ()>,
) -> Result<RunOutput> {
    let mut task = tokio::spawn(async move { run(&request, &config).await });
    tokio::select! {
        biased;
        () = interrupt => {
            task.abort();
            let _ = (&mut task).await;
            Err(Interrupted.into())
        }
        joined = &mut task => {
            let output = joined
                .context("Pipeline task panicked")?
                .context("Deck generation failed")?;
            Ok(output)
        }
    }
}

async fn read_template(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|source| {
        Pdf2AnkiError::TemplateReadFailed {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

fn print_providers(credentials: &Credentials) {
    println!("{:<12} {:<26} {:<20} Key", "Provider", "Default model", "Variable");
    for p in Provider::ALL {
        let status = if credentials.has(p) {
            green("set")
        } else {
            dim("missing")
        };
        println!(
            "{:<12} {:<26} {:<20} {}",
            p.as_str(),
            p.default_model(),
            p.env_var(),
            status
        );
    }
}

/// Map the error taxonomy to process exit codes.
fn exit_status(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<Interrupted>().is_some() {
        return 130;
    }
    let kind = e
        .chain()
        .find_map(|c| c.downcast_ref::<Pdf2AnkiError>())
        .map(Pdf2AnkiError::kind);
    match kind {
        Some(ErrorKind::Configuration) => 2,
        Some(ErrorKind::Authentication) => 3,
        Some(ErrorKind::Transport) => 4,
        Some(ErrorKind::Io) => 5,
        None => 1,
    }
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start.trim().parse().context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;
        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {start})");
        }
        if start > end {
            anyhow::bail!("Invalid page range '{start}-{end}': start must be <= end");
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        if pages.contains(&0) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got 0)");
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {page})");
    }
    Ok(PageSelection::Single(page))
}
