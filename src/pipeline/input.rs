//! Input validation: make sure the user-supplied path is a readable PDF.
//!
//! We check existence, read permission and the `%PDF` magic bytes up front so
//! callers get a precise I/O error instead of a parser error from deep inside
//! `lopdf` or `pdf-extract`.

use crate::error::Pdf2AnkiError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local PDF path, returning it as an owned `PathBuf`.
pub fn resolve_local(path: &Path) -> Result<PathBuf, Pdf2AnkiError> {
    let path = path.to_path_buf();

    if !path.exists() {
        return Err(Pdf2AnkiError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => {}
                Ok(()) => return Err(Pdf2AnkiError::NotAPdf { path, magic }),
                // Shorter than four bytes: cannot be a PDF either.
                Err(_) => return Err(Pdf2AnkiError::NotAPdf { path, magic }),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2AnkiError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Pdf2AnkiError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}
