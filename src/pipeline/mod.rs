//! Pipeline stages for PDF-to-Anki conversion.
//!
//! Each submodule implements one step. [`crate::run`] strings them together
//! and owns the state machine; the stages themselves know nothing about it.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ (prompt) ──▶ llm ──▶ postprocess ──▶ parse ──▶ deck
//! (path)    (lopdf)                 (HTTP)   (cleanup)      (cards)   (.apkg)
//!                 └──────────────▶ heuristic ─────────────────────────┘
//!                                  (offline)
//! ```
//!
//! 1. [`input`]     — check the path exists, is readable and is a PDF
//! 2. [`extract`]   — pull page text out; runs in `spawn_blocking`
//! 3. [`llm`]       — one completion request; the only stage with network I/O
//! 4. [`postprocess`] — strip fences, list bullets and bold from the response
//! 5. [`parse`]     — turn marker blocks into cards, collecting skipped blocks
//! 6. [`heuristic`] — offline alternative to 3–5: Q/A pairs straight from text
//! 7. [`deck`]      — write the `.apkg` atomically

pub mod deck;
pub mod extract;
pub mod heuristic;
pub mod input;
pub mod llm;
pub mod parse;
pub mod postprocess;
