//! Saved user preferences: prompt templates and preferred provider/model.
//!
//! Stored as pretty-printed JSON at
//! `<config dir>/pdf2anki/preferences.json` (`~/.config` on Linux,
//! `~/Library/Application Support` on macOS, `%APPDATA%` on Windows).
//! A missing file means "no preferences", not an error.

use crate::card::CardMode;
use crate::credentials::Provider;
use crate::error::Pdf2AnkiError;
use crate::prompts;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "pdf2anki";
const FILE_NAME: &str = "preferences.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Template used for basic cards instead of the built-in one.
    pub basic_template: Option<String>,
    /// Template used for cloze cards instead of the built-in one.
    pub cloze_template: Option<String>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
}

impl Preferences {
    /// Default location of the preferences file, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(FILE_NAME))
    }

    /// Load from the default location. No config dir or no file yields defaults.
    pub fn load() -> Result<Self, Pdf2AnkiError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, Pdf2AnkiError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No preferences at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(prefs_error(path, e.to_string())),
        };
        let prefs: Self =
            serde_json::from_str(&raw).map_err(|e| prefs_error(path, e.to_string()))?;
        prefs.validate(path)?;
        Ok(prefs)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<PathBuf, Pdf2AnkiError> {
        let path = Self::default_path().ok_or_else(|| {
            Pdf2AnkiError::InvalidConfig("no configuration directory on this platform".into())
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn save_to(&self, path: &Path) -> Result<(), Pdf2AnkiError> {
        self.validate(path)?;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| prefs_error(path, e.to_string()))?;

        let json =
            serde_json::to_string_pretty(self).map_err(|e| prefs_error(path, e.to_string()))?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| prefs_error(path, e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| prefs_error(path, e.to_string()))?;
        tmp.persist(path)
            .map_err(|e| prefs_error(path, e.error.to_string()))?;
        debug!("Saved preferences to {}", path.display());
        Ok(())
    }

    /// The saved template for `mode`, if any.
    pub fn template_for(&self, mode: CardMode) -> Option<&str> {
        match mode {
            CardMode::Basic => self.basic_template.as_deref(),
            CardMode::Cloze => self.cloze_template.as_deref(),
        }
    }

    pub fn set_template(&mut self, mode: CardMode, template: impl Into<String>) {
        let template = Some(template.into());
        match mode {
            CardMode::Basic => self.basic_template = template,
            CardMode::Cloze => self.cloze_template = template,
        }
    }

    // A hand-edited file with a broken template should fail here, not at run time.
    fn validate(&self, path: &Path) -> Result<(), Pdf2AnkiError> {
        for template in [&self.basic_template, &self.cloze_template]
            .into_iter()
            .flatten()
        {
            prompts::validate_template(template)
                .map_err(|e| prefs_error(path, e.to_string()))?;
        }
        Ok(())
    }
}

fn prefs_error(path: &Path, detail: String) -> Pdf2AnkiError {
    Pdf2AnkiError::Preferences {
        path: path.to_path_buf(),
        detail,
    }
}
