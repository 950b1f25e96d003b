//! Deck building: validate a [`Deck`] and write it as an `.apkg` file.
//!
//! The package is written to a temporary file next to the destination and
//! renamed into place once complete, so a failed build never leaves a
//! partial package behind and an existing file is only replaced by a
//! finished one.
//!
//! The temporary file is handed back from the blocking writer and renamed
//! on the async side. If the build future is dropped mid-write (the run was
//! cancelled), the writer's result is discarded with it and the temporary
//! file is removed; the destination is never touched.

use crate::apkg::{self, PackageContents, PackageStats};
use crate::card::Deck;
use crate::error::Pdf2AnkiError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// What ended up in the written package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeckSummary {
    pub path: PathBuf,
    pub deck_name: String,
    pub deck_id: i64,
    pub notes: usize,
    pub cards: usize,
}

/// Validate `deck` and write it to `output_path`.
///
/// # Errors
/// * Configuration: blank deck name, or no cards.
/// * I/O ([`Pdf2AnkiError::DeckWriteFailed`]): the directory cannot be
///   created or written, or packaging failed. Carries `output_path`.
pub async fn build_deck(deck: &Deck, output_path: &Path) -> Result<DeckSummary, Pdf2AnkiError> {
    if deck.name.trim().is_empty() {
        return Err(Pdf2AnkiError::EmptyDeckName);
    }
    if deck.is_empty() {
        return Err(Pdf2AnkiError::EmptyDeck {
            deck: deck.name.clone(),
            skipped: 0,
        });
    }

    let deck_owned = deck.clone();
    let path = output_path.to_path_buf();
    let (tmp, stats) = tokio::task::spawn_blocking(move || write_temp(&deck_owned, &path))
        .await
        .map_err(|e| Pdf2AnkiError::DeckWriteFailed {
            path: output_path.to_path_buf(),
            detail: format!("package task panicked: {e}"),
        })??;
    tmp.persist(output_path)
        .map_err(|e| Pdf2AnkiError::DeckWriteFailed {
            path: output_path.to_path_buf(),
            detail: e.error.to_string(),
        })?;

    info!(
        "Wrote deck '{}' to {} ({} notes, {} cards)",
        deck.name,
        output_path.display(),
        stats.notes,
        stats.cards
    );

    Ok(DeckSummary {
        path: output_path.to_path_buf(),
        deck_name: deck.name.clone(),
        deck_id: stats.deck_id,
        notes: stats.notes,
        cards: stats.cards,
    })
}

/// Reopen a written package and list its decks and notes.
pub fn read_deck(path: &Path) -> Result<PackageContents, Pdf2AnkiError> {
    if !path.exists() {
        return Err(Pdf2AnkiError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    apkg::read_package(path).map_err(|e| Pdf2AnkiError::DeckReadFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Write the package into a temporary file in `path`'s directory.
fn write_temp(deck: &Deck, path: &Path) -> Result<(NamedTempFile, PackageStats), Pdf2AnkiError> {
    let fail = |detail: String| Pdf2AnkiError::DeckWriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| fail(e.to_string()))?;

    // Same directory as the target so the final rename never crosses filesystems.
    let mut tmp = tempfile::Builder::new()
        .prefix(".pdf2anki-")
        .suffix(".apkg.tmp")
        .tempfile_in(&parent)
        .map_err(|e| fail(e.to_string()))?;

    let stats = apkg::write_package(deck, tmp.as_file_mut()).map_err(|e| fail(e.to_string()))?;
    Ok((tmp, stats))
}
