//! Offline card extraction: build basic cards straight from the PDF text.
//!
//! Used when a run is started with `offline` set, so no provider is called.
//! Two passes, the second only when the first finds nothing:
//!
//! 1. **Structured**: the document already contains `Q:` / `A:` (or
//!    `Question:` / `Answer:`, `### Q` / `### A`) markers, as exported quiz
//!    sheets and FAQ pages do. Every question marker followed by an answer
//!    marker before the next question becomes a card.
//! 2. **Sentences**: the text is split into sentences and every sentence that
//!    reads like a question becomes the front of a card whose back is the
//!    sentence that follows it.

use crate::card::Card;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Words that open a question.
const QUESTION_WORDS: [&str; 9] = [
    "what", "why", "how", "when", "where", "which", "who", "whose", "whom",
];

/// Auxiliary verbs that open a yes/no question.
const AUX_VERBS: [&str; 15] = [
    "is", "are", "was", "were", "do", "does", "did", "have", "has", "had", "can", "could",
    "should", "would", "will",
];

/// Run both passes and return whatever the first productive one finds.
pub fn extract_cards(text: &str) -> Vec<Card> {
    let structured = structured_pairs(text);
    let pairs = if structured.is_empty() {
        let pairs = sentence_pairs(text);
        debug!("No Q/A markers in text, {} sentence pairs found", pairs.len());
        pairs
    } else {
        debug!("Found {} marked Q/A pairs", structured.len());
        structured
    };
    pairs.into_iter().map(|(q, a)| Card::basic(q, a)).collect()
}

// ── Pass 1: explicit markers ─────────────────────────────────────────────────

static RE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)###[ \t]*(Q(?:uestion)?|A(?:nswer)?)[ \t]*\d*\b[ \t]*:?|\b(Q(?:uestion)?|A(?:nswer)?)[ \t]*\d*[ \t]*:",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Question,
    Answer,
}

/// A marker occurrence: its kind and the byte span it covers.
#[derive(Debug, Clone, Copy)]
struct Marker {
    kind: MarkerKind,
    start: usize,
    end: usize,
}

fn find_markers(text: &str) -> Vec<Marker> {
    RE_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let word = caps.get(1).or_else(|| caps.get(2))?.as_str();
            let kind = if word.starts_with(['q', 'Q']) {
                MarkerKind::Question
            } else {
                MarkerKind::Answer
            };
            Some(Marker {
                kind,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Pairs from explicitly marked text. Pairs with an empty side are dropped.
pub fn structured_pairs(text: &str) -> Vec<(String, String)> {
    let markers = find_markers(text);
    let mut pairs = Vec::new();

    let mut i = 0;
    while i < markers.len() {
        let q = markers[i];
        // A question marker must be followed directly by an answer marker.
        let Some(a) = markers
            .get(i + 1)
            .filter(|m| q.kind == MarkerKind::Question && m.kind == MarkerKind::Answer)
            .copied()
        else {
            i += 1;
            continue;
        };
        let next_q = markers[i + 2..]
            .iter()
            .position(|m| m.kind == MarkerKind::Question)
            .map(|offset| i + 2 + offset);
        let answer_end = next_q.map_or(text.len(), |idx| markers[idx].start);

        let question = collapse_whitespace(&text[q.end..a.start]);
        let answer = collapse_whitespace(&text[a.end..answer_end]);
        if !question.is_empty() && !answer.is_empty() {
            pairs.push((question, answer));
        }

        i = next_q.unwrap_or(markers.len());
    }
    pairs
}

// ── Pass 2: question-looking sentences ───────────────────────────────────────

/// Split on `.`, `!` or `?` followed by whitespace and an upper-case letter.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if j > i + 1 && j < chars.len() && chars[j].1.is_uppercase() {
                let end = pos + c.len_utf8();
                sentences.push(&text[start..end]);
                start = chars[j].0;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
        .collect()
}

/// A sentence reads like a question when it contains `?` or opens with a
/// question word or an auxiliary verb.
pub fn is_question(sentence: &str) -> bool {
    if sentence.contains('?') {
        return true;
    }
    let Some(first) = sentence.split_whitespace().next() else {
        return false;
    };
    let first = first.to_lowercase();
    QUESTION_WORDS.contains(&first.as_str()) || AUX_VERBS.contains(&first.as_str())
}

/// Each question-like sentence paired with the sentence after it.
pub fn sentence_pairs(text: &str) -> Vec<(String, String)> {
    let sentences = split_sentences(text);
    sentences
        .windows(2)
        .filter(|w| is_question(&w[0]))
        .map(|w| (w[0].clone(), w[1].clone()))
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_markers_inline_and_multiline() {
        let text = "Chapter 1 review\nQ: What is osmosis?\nA: Diffusion of water\nacross a membrane.\nQuestion: Where is DNA stored? Answer: In the nucleus.";
        let pairs = structured_pairs(text);
        assert_eq!(
            pairs,
            vec![
                (
                    "What is osmosis?".to_string(),
                    "Diffusion of water across a membrane.".to_string()
                ),
                (
                    "Where is DNA stored?".to_string(),
                    "In the nucleus.".to_string()
                ),
            ]
        );
    }

    #[test]
    fn heading_markers() {
        let text = "### Q1\nWhat is 2+2?\n### A\nFour\n### Q2\nWhat is 3+3?\n### A\nSix";
        let pairs = structured_pairs(text);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], ("What is 3+3?".to_string(), "Six".to_string()));
    }

    #[test]
    fn question_without_answer_is_dropped() {
        let text = "Q: Lonely question?\nQ: Paired?\nA: Yes.";
        let pairs = structured_pairs(text);
        assert_eq!(pairs, vec![("Paired?".to_string(), "Yes.".to_string())]);
    }

    #[test]
    fn words_containing_q_are_not_markers() {
        assert!(structured_pairs("The FAQ: read it. Quantum: small.").is_empty());
    }

    #[test]
    fn sentence_split() {
        let s = split_sentences("Cells divide. Why do they divide?  Growth!  e.g. not split");
        assert_eq!(s, vec!["Cells divide.", "Why do they divide?", "Growth! e.g. not split"]);
    }

    #[test]
    fn question_detection() {
        assert!(is_question("Photosynthesis happens where?"));
        assert!(is_question("How do plants grow"));
        assert!(is_question("Does water boil at 100C"));
        assert!(!is_question("Water boils at 100C."));
        assert!(!is_question(""));
    }

    #[test]
    fn unmarked_text_falls_back_to_sentences() {
        let text = "Plants need light. What do leaves capture? They capture sunlight. The end.";
        let cards = extract_cards(text);
        assert_eq!(
            cards,
            vec![Card::basic("What do leaves capture?", "They capture sunlight.")]
        );
    }

    #[test]
    fn marked_text_wins_over_sentences() {
        let text = "Why bother? Because.\nQ: Real question\nA: Real answer";
        let cards = extract_cards(text);
        assert_eq!(cards, vec![Card::basic("Real question", "Real answer")]);
    }

    #[test]
    fn nothing_to_find() {
        assert!(extract_cards("Just a statement. Another statement.").is_empty());
    }
}
