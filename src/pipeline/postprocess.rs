//! Post-processing: deterministic cleanup of the raw model response.
//!
//! Well-prompted models still decorate their output: a ```` ```text ```` fence
//! around everything, `**Q:**` in bold, `1. Q:` numbering, Windows line
//! endings, zero-width spaces pasted in from the source PDF. None of that is
//! content, and all of it gets in the way of the line-oriented card parser.
//!
//! Rules (applied in order):
//! 1. Strip outer markdown fences
//! 2. Normalise line endings (CRLF → LF)
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Trim trailing whitespace per line
//! 5. Drop list numbering / bullets in front of card markers
//! 6. Unwrap bold card markers (`**Q:**` → `Q:`)
//!
//! Card text itself, including `{{c1::…}}` cloze markers, is never touched.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a model response.
pub fn clean_response(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = strip_list_prefixes(&s);
    unwrap_bold_markers(&s)
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: List prefixes before markers ─────────────────────────────────────
//
// `1. Q: …`, `2) Text: …`, `- **Q:** …`, `• A: …`. Only prefixes directly in
// front of a marker are removed; ordinary numbered lines inside an answer stay.

static RE_LIST_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*(?:\d+[.)]|[-•*])[ \t]+((?:\*\*)?(?:Q|A|Question|Answer|Text|Extra|Back Extra)(?:\*\*)?[ \t]*:)",
    )
    .unwrap()
});

fn strip_list_prefixes(input: &str) -> String {
    RE_LIST_PREFIX.replace_all(input, "$1").to_string()
}

// ── Rule 6: Bold markers ─────────────────────────────────────────────────────
//
// Both `**Q:**` and `**Q**:` appear in practice.

static RE_BOLD_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mi)^([ \t]*)\*\*((?:Q|A|Question|Answer|Text|Extra|Back Extra)[ \t]*)(?::\*\*|\*\*[ \t]*:)",
    )
    .unwrap()
});

fn unwrap_bold_markers(input: &str) -> String {
    RE_BOLD_MARKER.replace_all(input, "$1$2:").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
