//! Prompt templates and the prompt builder.
//!
//! Every built-in prompt lives here so the marker format the card parser
//! expects and the format the model is asked to produce can be changed side
//! by side. Callers can override the template via [`crate::config::RunRequest::template`];
//! the constants here are used only when no override is provided.

use crate::card::CardMode;
use crate::error::Pdf2AnkiError;

/// Placeholder replaced by the extracted PDF text.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Default template for question/answer cards.
pub const DEFAULT_BASIC_TEMPLATE: &str = r#"Given the following text from a PDF, create high-quality flashcards in a question and answer format.
Follow these guidelines:
1. Create clear, concise questions that test understanding
2. Ensure answers are comprehensive but focused
3. Break complex concepts into multiple cards
4. Use proper terminology
5. Format output as:
Q: [Question]
A: [Answer]

Text:
{text}"#;

/// Default template for cloze-deletion cards.
pub const DEFAULT_CLOZE_TEMPLATE: &str = r#"Create Anki cloze deletion cards from the following text.
Use {{c1::text}} format for cloze deletions.
Include relevant extra information after "Extra:" for each card.
Format each card as:

Text: [text with cloze deletions]
Extra: [additional information]

Text:
{text}"#;

/// Appended in cloze mode when a custom template says nothing about cloze syntax.
pub const CLOZE_FORMAT_SUFFIX: &str = r#"

Output the cards as Anki cloze deletions instead of questions and answers.
Mark each hidden span as {{c1::hidden text}}, numbering c1, c2, … within a card.
Format each card as:

Text: [sentence with cloze deletions]
Extra: [optional additional information]"#;

/// Marker that signals a template already asks for cloze output.
const CLOZE_SYNTAX_HINT: &str = "{{c1::";

/// The built-in template for a card mode.
pub fn default_template(mode: CardMode) -> &'static str {
    match mode {
        CardMode::Basic => DEFAULT_BASIC_TEMPLATE,
        CardMode::Cloze => DEFAULT_CLOZE_TEMPLATE,
    }
}

/// Template + text + options: everything needed to render one prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptRequest<'a> {
    pub template: &'a str,
    pub text: &'a str,
    pub mode: CardMode,
}

/// Check that a template contains the placeholder exactly once.
pub fn validate_template(template: &str) -> Result<(), Pdf2AnkiError> {
    match template.matches(TEXT_PLACEHOLDER).count() {
        1 => Ok(()),
        0 => Err(Pdf2AnkiError::MissingPlaceholder {
            placeholder: TEXT_PLACEHOLDER.to_string(),
        }),
        found => Err(Pdf2AnkiError::DuplicatePlaceholder {
            placeholder: TEXT_PLACEHOLDER.to_string(),
            found,
        }),
    }
}

/// Render the final prompt.
///
/// The placeholder is replaced verbatim (no trimming or escaping), so two
/// different texts always yield two different prompts. In cloze mode
/// [`CLOZE_FORMAT_SUFFIX`] is appended unless the template already shows
/// cloze syntax.
pub fn build_prompt(req: &PromptRequest<'_>) -> Result<String, Pdf2AnkiError> {
    validate_template(req.template)?;

    let mut prompt = req.template.replacen(TEXT_PLACEHOLDER, req.text, 1);
    if req.mode == CardMode::Cloze && !req.template.contains(CLOZE_SYNTAX_HINT) {
        prompt.push_str(CLOZE_FORMAT_SUFFIX);
    }
    Ok(prompt)
}
