//! The two note types every generated deck uses.

use crate::card::CardMode;

/// Anki model definition: fields, one card template and styling.
#[derive(Debug, Clone, Copy)]
pub struct NoteType {
    /// Fixed model id so repeated imports reuse the same note type.
    pub id: i64,
    pub name: &'static str,
    pub mode: CardMode,
    pub fields: &'static [&'static str],
    pub template_name: &'static str,
    pub qfmt: &'static str,
    pub afmt: &'static str,
    pub css: &'static str,
}

impl NoteType {
    pub fn for_mode(mode: CardMode) -> &'static NoteType {
        match mode {
            CardMode::Basic => &BASIC_NOTE_TYPE,
            CardMode::Cloze => &CLOZE_NOTE_TYPE,
        }
    }

    /// Anki's model type code: 0 = standard, 1 = cloze.
    pub fn kind_code(&self) -> i64 {
        match self.mode {
            CardMode::Basic => 0,
            CardMode::Cloze => 1,
        }
    }
}

const BASE_CSS: &str = ".card {
    font-family: Arial, sans-serif;
    font-size: 16px;
    text-align: left;
    color: black;
    background-color: white;
    padding: 20px;
}
.source {
    font-size: 12px;
    color: #666;
}
";

const CLOZE_CSS: &str = ".card {
    font-family: Arial, sans-serif;
    font-size: 16px;
    text-align: left;
    color: black;
    background-color: white;
    padding: 20px;
}
.cloze {
    font-weight: bold;
    color: blue;
}
.source {
    font-size: 12px;
    color: #666;
}
";

pub const BASIC_NOTE_TYPE: NoteType = NoteType {
    id: 1_607_392_319,
    name: "PDFToAnki Basic",
    mode: CardMode::Basic,
    fields: &["Question", "Answer", "Source"],
    template_name: "Card 1",
    qfmt: r#"{{Question}}<br><br><div class="source"><em>Source: {{Source}}</em></div>"#,
    afmt: r#"{{FrontSide}}
<hr id="answer">
{{Answer}}"#,
    css: BASE_CSS,
};

pub const CLOZE_NOTE_TYPE: NoteType = NoteType {
    id: 1_607_392_320,
    name: "PDFToAnki Cloze",
    mode: CardMode::Cloze,
    fields: &["Text", "Back Extra", "Source"],
    template_name: "Cloze",
    qfmt: r#"{{cloze:Text}}<br><br><div class="source"><em>Source: {{Source}}</em></div>"#,
    afmt: r#"{{cloze:Text}}<br>
<hr id="answer">
{{Back Extra}}<br><br>
<div class="source"><em>Source: {{Source}}</em></div>"#,
    css: CLOZE_CSS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_types_have_three_fields_and_distinct_ids() {
        assert_eq!(BASIC_NOTE_TYPE.fields.len(), 3);
        assert_eq!(CLOZE_NOTE_TYPE.fields.len(), 3);
        assert_ne!(BASIC_NOTE_TYPE.id, CLOZE_NOTE_TYPE.id);
        assert_eq!(NoteType::for_mode(CardMode::Cloze).kind_code(), 1);
        assert!(CLOZE_NOTE_TYPE.qfmt.contains("{{cloze:Text}}"));
    }
}
