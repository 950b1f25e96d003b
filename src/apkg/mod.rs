//! Anki package (`.apkg`) writer and reader.
//!
//! An `.apkg` file is a zip archive holding:
//!
//! * `collection.anki2`: a SQLite database in the legacy schema 11 layout
//!   that every Anki release (desktop, AnkiDroid, AnkiMobile) can import;
//! * `media`: a JSON map of bundled media files, always `{}` here.
//!
//! [`write_package`] produces such an archive from a [`crate::card::Deck`];
//! [`read_package`] opens one back up and returns its notes, which is what
//! the integration tests and `pdf2anki --inspect-deck` use.

mod models;
mod package;
mod schema;

pub use models::{NoteType, BASIC_NOTE_TYPE, CLOZE_NOTE_TYPE};
pub use package::{
    deck_id_for, read_package, write_package, PackageContents, PackageNote, PackageStats,
};

use thiserror::Error;

/// Low-level package failure. The deck builder wraps it together with the
/// output path into [`crate::error::Pdf2AnkiError`].
#[derive(Debug, Error)]
pub enum ApkgError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid package: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ApkgError>;
