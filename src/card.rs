//! Card and deck value types.
//!
//! A [`Card`] is a tagged variant rather than a trait object: the parser
//! produces one of two shapes and the deck builder matches on it exhaustively
//! to pick the Anki note type.

use serde::{Deserialize, Serialize};

/// One flashcard parsed from a model response (or, offline, from the PDF text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Card {
    /// Front/back question card.
    Basic { question: String, answer: String },
    /// Single text block with `{{cN::…}}` deletions kept verbatim.
    Cloze { text: String, extra: String },
}

impl Card {
    pub fn basic(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Card::Basic {
            question: question.into(),
            answer: answer.into(),
        }
    }

    pub fn cloze(text: impl Into<String>, extra: impl Into<String>) -> Self {
        Card::Cloze {
            text: text.into(),
            extra: extra.into(),
        }
    }

    /// Which card mode produced this card.
    pub fn mode(&self) -> CardMode {
        match self {
            Card::Basic { .. } => CardMode::Basic,
            Card::Cloze { .. } => CardMode::Cloze,
        }
    }

    /// The text shown on the front, used for log lines and sort fields.
    pub fn front(&self) -> &str {
        match self {
            Card::Basic { question, .. } => question,
            Card::Cloze { text, .. } => text,
        }
    }
}

/// Card flavour requested for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardMode {
    /// `Q:` / `A:` question-answer cards. (default)
    #[default]
    Basic,
    /// `Text:` / `Extra:` cloze-deletion cards.
    Cloze,
}

/// A named, ordered collection of cards ready to be packaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub name: String,
    /// Written into the "Source" field of every note.
    pub source: String,
    pub cards: Vec<Card>,
}

impl Deck {
    pub fn new(name: impl Into<String>, source: impl Into<String>, cards: Vec<Card>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            cards,
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_matches_variant() {
        assert_eq!(Card::basic("q", "a").mode(), CardMode::Basic);
        assert_eq!(Card::cloze("{{c1::x}}", "").mode(), CardMode::Cloze);
    }

    #[test]
    fn serialises_with_type_tag() {
        let json = serde_json::to_string(&Card::basic("Q?", "A.")).unwrap();
        assert!(json.contains("\"type\":\"basic\""), "got: {json}");
    }
}
