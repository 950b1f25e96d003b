//! Error types for the edgequake-pdf2anki library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2AnkiError`] — **Fatal**: the run cannot proceed at all (bad
//!   template, missing API key, provider unreachable, PDF unreadable, deck
//!   not writable). Every variant belongs to exactly one [`ErrorKind`].
//!
//! * [`ParseFailure`] — **Non-fatal**: a single block of the model response
//!   did not match the expected marker format. It is skipped and reported in
//!   the run summary; the other cards still make it into the deck.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse category of a fatal error, used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad template, empty deck name, invalid option values.
    Configuration,
    /// Missing or rejected provider credential.
    Authentication,
    /// Network or provider failure.
    Transport,
    /// File read/write failure, including unreadable PDFs.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Transport => "transport",
            ErrorKind::Io => "i/o",
        };
        f.write_str(s)
    }
}

/// All fatal errors returned by the edgequake-pdf2anki library.
#[derive(Debug, Error)]
pub enum Pdf2AnkiError {
    // ── Configuration errors ─────────────────────────────────────────────
    /// The prompt template does not contain the text placeholder.
    #[error("Prompt template is missing the '{placeholder}' placeholder.\nAdd it where the extracted PDF text should go.")]
    MissingPlaceholder { placeholder: String },

    /// The prompt template contains the placeholder more than once.
    #[error("Prompt template must contain '{placeholder}' exactly once (found {found}).")]
    DuplicatePlaceholder { placeholder: String, found: usize },

    /// Deck name was empty or whitespace only.
    #[error("Deck name must not be empty.")]
    EmptyDeckName,

    /// The deck builder was handed no cards.
    #[error("Deck '{deck}' has no cards to write ({skipped} response blocks were skipped).")]
    EmptyDeck { deck: String, skipped: usize },

    /// Selected pages are outside the document.
    #[error("Page selection {selection} is out of range (document has {total} pages)")]
    PageOutOfRange { selection: String, total: usize },

    /// Unknown provider name.
    #[error("Unknown provider '{name}'. Supported: openai, anthropic, perplexity.")]
    UnknownProvider { name: String },

    /// No provider credential is present at all.
    #[error("No LLM provider is configured.\nSet OPENAI_API_KEY, ANTHROPIC_API_KEY or PERPLEXITY_API_KEY, or use --offline.")]
    NoProviderConfigured,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Authentication errors ────────────────────────────────────────────
    /// The credential for the selected provider is not set.
    #[error("No API key for provider '{provider}'.\nSet the {env_var} environment variable.")]
    MissingCredential { provider: String, env_var: String },

    /// The provider rejected the credential (HTTP 401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthRejected { provider: String, detail: String },

    // ── Transport errors ─────────────────────────────────────────────────
    /// The request could not be sent or the connection broke.
    #[error("Request to provider '{provider}' failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    /// The request timed out.
    #[error("Request to provider '{provider}' timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// The provider returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// The provider returned another non-success status.
    #[error("Provider '{provider}' returned HTTP {status}: {body}")]
    ApiStatus {
        provider: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded into text.
    #[error("Malformed response from provider '{provider}': {detail}")]
    MalformedResponse { provider: String, detail: String },

    // ── I/O errors ───────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The PDF could not be parsed or its text could not be extracted.
    #[error("Could not extract text from '{path}': {detail}")]
    ExtractionFailed { path: PathBuf, detail: String },

    /// Extraction succeeded but yielded only whitespace.
    #[error("No text could be extracted from '{path}'.\nThe file may be empty or contain only scanned images.")]
    NoTextExtracted { path: PathBuf },

    /// A prompt template file could not be read.
    #[error("Failed to read prompt template '{path}': {source}")]
    TemplateReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output package.
    #[error("Failed to write deck package '{path}': {detail}")]
    DeckWriteFailed { path: PathBuf, detail: String },

    /// Could not read back a package.
    #[error("Failed to read deck package '{path}': {detail}")]
    DeckReadFailed { path: PathBuf, detail: String },

    /// Saved preferences could not be loaded or stored.
    #[error("Preferences file '{path}': {detail}")]
    Preferences { path: PathBuf, detail: String },

    /// A blocking task panicked or the runtime could not be created.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2AnkiError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use Pdf2AnkiError::*;
        match self {
            MissingPlaceholder { .. }
            | DuplicatePlaceholder { .. }
            | EmptyDeckName
            | EmptyDeck { .. }
            | PageOutOfRange { .. }
            | UnknownProvider { .. }
            | NoProviderConfigured
            | InvalidConfig(_) => ErrorKind::Configuration,
            MissingCredential { .. } | AuthRejected { .. } => ErrorKind::Authentication,
            RequestFailed { .. }
            | Timeout { .. }
            | RateLimited { .. }
            | ApiStatus { .. }
            | MalformedResponse { .. } => ErrorKind::Transport,
            FileNotFound { .. }
            | PermissionDenied { .. }
            | NotAPdf { .. }
            | ExtractionFailed { .. }
            | NoTextExtracted { .. }
            | TemplateReadFailed { .. }
            | DeckWriteFailed { .. }
            | DeckReadFailed { .. }
            | Preferences { .. }
            | Internal(_) => ErrorKind::Io,
        }
    }
}

/// A response block that did not parse into a card.
///
/// Collected by the card parser and the offline heuristics, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Block {block}: {reason} ({excerpt:?})")]
pub struct ParseFailure {
    /// 1-indexed position of the block among all blocks found in the response.
    pub block: usize,
    /// Why the block was rejected.
    pub reason: SkipReason,
    /// First characters of the block, for log lines and the run summary.
    pub excerpt: String,
}

/// Why a block was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// A question marker with no answer marker after it.
    MissingAnswer,
    /// Question or answer text was empty after trimming.
    EmptyField,
    /// A cloze block without a well-formed `{{cN::…}}` deletion.
    MissingClozeDeletion,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::MissingAnswer => "no answer marker",
            SkipReason::EmptyField => "empty question or answer",
            SkipReason::MissingClozeDeletion => "no cloze deletion",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_placeholder_names_placeholder() {
        let e = Pdf2AnkiError::MissingPlaceholder {
            placeholder: "{text}".into(),
        };
        assert!(e.to_string().contains("{text}"));
        assert_eq!(e.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn missing_credential_names_env_var() {
        let e = Pdf2AnkiError::MissingCredential {
            provider: "anthropic".into(),
            env_var: "ANTHROPIC_API_KEY".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("anthropic"), "got: {msg}");
        assert!(msg.contains("ANTHROPIC_API_KEY"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn transport_errors_classified() {
        let e = Pdf2AnkiError::RateLimited {
            provider: "openai".into(),
            retry_after_secs: Some(30),
        };
        assert_eq!(e.kind(), ErrorKind::Transport);
        let e = Pdf2AnkiError::ApiStatus {
            provider: "perplexity".into(),
            status: 500,
            body: "boom".into(),
        };
        assert!(e.to_string().contains("500"));
        assert_eq!(e.kind(), ErrorKind::Transport);
    }

    #[test]
    fn deck_write_failure_carries_path() {
        let e = Pdf2AnkiError::DeckWriteFailed {
            path: PathBuf::from("/nope/deck.apkg"),
            detail: "read-only file system".into(),
        };
        assert!(e.to_string().contains("/nope/deck.apkg"));
        assert_eq!(e.kind(), ErrorKind::Io);
    }

    #[test]
    fn parse_failure_display() {
        let f = ParseFailure {
            block: 2,
            reason: SkipReason::MissingAnswer,
            excerpt: "Q: orphan".into(),
        };
        let msg = f.to_string();
        assert!(msg.contains("Block 2"), "got: {msg}");
        assert!(msg.contains("no answer marker"), "got: {msg}");
    }
}
