//! Card parsing: turn a model response into cards.
//!
//! The response is scanned line by line for markers. A question marker
//! (`Q:`, `Question:`, `### Q`) or, in cloze mode, a `Text:` marker opens a
//! block; the next opening marker closes it. Inside a block the answer
//! marker (`A:`, `Answer:`, `### A`) or `Extra:` switches the field that
//! continuation lines are appended to.
//!
//! Blocks that do not form a complete card are reported as [`ParseFailure`]s
//! and skipped. Lines before the first opening marker are preamble ("Here are
//! your flashcards:") and are neither cards nor failures.

use crate::card::{Card, CardMode};
use crate::error::{ParseFailure, SkipReason};
use crate::pipeline::postprocess::clean_response;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

/// Characters of a skipped block kept for the report.
const EXCERPT_CHARS: usize = 60;

/// Cards in response order plus the blocks that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseOutcome {
    pub cards: Vec<Card>,
    pub skipped: Vec<ParseFailure>,
}

// ── Markers ──────────────────────────────────────────────────────────────────

static RE_QUESTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:#{1,6}[ \t]*(?:Q|Question)[ \t]*\d*[ \t]*(?::|$)|(?:Q|Question)[ \t]*\d*[ \t]*:)[ \t]*(.*)$")
        .unwrap()
});

static RE_ANSWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:#{1,6}[ \t]*(?:A|Answer)[ \t]*\d*[ \t]*(?::|$)|(?:A|Answer)[ \t]*\d*[ \t]*:)[ \t]*(.*)$")
        .unwrap()
});

static RE_CLOZE_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:#{1,6}[ \t]*)?Text[ \t]*\d*[ \t]*:[ \t]*(.*)$").unwrap()
});

static RE_CLOZE_EXTRA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:#{1,6}[ \t]*)?(?:Back[ \t]+)?Extra[ \t]*:[ \t]*(.*)$").unwrap()
});

/// A well-formed cloze deletion: `{{c1::answer}}` or `{{c2::answer::hint}}`.
static RE_CLOZE_DELETION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{c[1-9]\d*::.+?\}\}").unwrap());

/// Does `text` contain at least one well-formed cloze deletion?
pub fn has_cloze_deletion(text: &str) -> bool {
    RE_CLOZE_DELETION.is_match(text)
}

/// Distinct cloze numbers used in `text`, ascending (`c1`, `c3` → `[1, 3]`).
pub fn cloze_numbers(text: &str) -> Vec<u32> {
    static RE_NUM: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)\{\{c([1-9]\d*)::.+?\}\}").unwrap());
    let mut nums: Vec<u32> = RE_NUM
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    nums.sort_unstable();
    nums.dedup();
    nums
}

fn capture_rest(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)
        .map(|c| c.get(1).map_or("", |m| m.as_str()).to_string())
}

// ── Block accumulator ────────────────────────────────────────────────────────

/// An open block: the opening field and, once its marker was seen, the second one.
struct Block {
    index: usize,
    first: Vec<String>,
    second: Option<Vec<String>>,
    raw: Vec<String>,
}

impl Block {
    fn new(index: usize, line: &str, rest: String) -> Self {
        Self {
            index,
            first: vec![rest],
            second: None,
            raw: vec![line.to_string()],
        }
    }

    fn push(&mut self, line: &str) {
        self.raw.push(line.to_string());
        match self.second.as_mut() {
            Some(field) => field.push(line.to_string()),
            None => self.first.push(line.to_string()),
        }
    }

    fn open_second(&mut self, line: &str, rest: String) {
        self.raw.push(line.to_string());
        match self.second.as_mut() {
            // A repeated answer marker continues the open answer.
            Some(field) => field.push(rest),
            None => self.second = Some(vec![rest]),
        }
    }

    fn excerpt(&self) -> String {
        let joined = self
            .raw
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.chars().count() > EXCERPT_CHARS {
            let cut: String = joined.chars().take(EXCERPT_CHARS).collect();
            format!("{cut}…")
        } else {
            joined
        }
    }

    fn failure(&self, reason: SkipReason) -> ParseFailure {
        ParseFailure {
            block: self.index,
            reason,
            excerpt: self.excerpt(),
        }
    }

    fn finish(self, mode: CardMode) -> Result<Card, ParseFailure> {
        let first = join_field(&self.first);
        match mode {
            CardMode::Basic => {
                let Some(answer) = self.second.as_deref().map(join_field) else {
                    return Err(self.failure(SkipReason::MissingAnswer));
                };
                if first.is_empty() || answer.is_empty() {
                    return Err(self.failure(SkipReason::EmptyField));
                }
                Ok(Card::basic(first, answer))
            }
            CardMode::Cloze => {
                if first.is_empty() {
                    return Err(self.failure(SkipReason::EmptyField));
                }
                if !has_cloze_deletion(&first) {
                    return Err(self.failure(SkipReason::MissingClozeDeletion));
                }
                let extra = self.second.as_deref().map(join_field).unwrap_or_default();
                Ok(Card::cloze(first, extra))
            }
        }
    }
}

/// Join field lines, trimming each line and the whole value.
fn join_field(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| l.trim())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// ── Parser ───────────────────────────────────────────────────────────────────

/// Parse a model response into cards.
///
/// Never fails: an empty or marker-free response yields an empty outcome.
pub fn parse_cards(response: &str, mode: CardMode) -> ParseOutcome {
    let cleaned = clean_response(response);
    let (open_re, second_re): (&Regex, &Regex) = match mode {
        CardMode::Basic => (&*RE_QUESTION, &*RE_ANSWER),
        CardMode::Cloze => (&*RE_CLOZE_TEXT, &*RE_CLOZE_EXTRA),
    };

    let mut outcome = ParseOutcome::default();
    let mut current: Option<Block> = None;
    let mut blocks = 0usize;

    let close = |block: Block, outcome: &mut ParseOutcome| match block.finish(mode) {
        Ok(card) => outcome.cards.push(card),
        Err(failure) => {
            warn!("Skipping response {failure}");
            outcome.skipped.push(failure);
        }
    };

    for line in cleaned.lines() {
        let trimmed = line.trim();

        if let Some(rest) = capture_rest(open_re, trimmed) {
            if let Some(block) = current.take() {
                close(block, &mut outcome);
            }
            blocks += 1;
            current = Some(Block::new(blocks, trimmed, rest));
            continue;
        }

        let Some(block) = current.as_mut() else {
            // Preamble.
            continue;
        };

        match capture_rest(second_re, trimmed) {
            Some(rest) => block.open_second(trimmed, rest),
            None => block.push(trimmed),
        }
    }
    if let Some(block) = current.take() {
        close(block, &mut outcome);
    }

    debug!(
        "Parsed {} cards from {} blocks ({:?})",
        outcome.cards.len(),
        blocks,
        mode
    );
    outcome
}
