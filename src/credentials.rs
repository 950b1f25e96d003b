//! LLM providers and their API credentials.
//!
//! Credentials are read from the environment exactly once, into a
//! [`Credentials`] value that is then passed by reference to
//! [`crate::pipeline::llm::LlmClient::new`]. The client itself never calls
//! `std::env::var`, which keeps tests hermetic: a test builds a
//! `Credentials` by hand and no process-wide state leaks in.

use crate::error::Pdf2AnkiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The fixed set of supported LLM vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Perplexity,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Perplexity];

    /// Lower-case identifier used on the command line and in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Perplexity => "perplexity",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Perplexity => "PERPLEXITY_API_KEY",
        }
    }

    /// Model used when the caller names a provider but no model.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o",
            Provider::Anthropic => "claude-3-sonnet-20240229",
            Provider::Perplexity => "sonar-pro",
        }
    }

    /// Default API base URL (without the endpoint path).
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::Perplexity => "https://api.perplexity.ai",
        }
    }

    /// Guess the provider from a model identifier.
    ///
    /// `claude-*` → Anthropic, `sonar*` → Perplexity, anything else → OpenAI.
    pub fn infer_from_model(model: &str) -> Provider {
        let m = model.trim().to_ascii_lowercase();
        if m.starts_with("claude") {
            Provider::Anthropic
        } else if m.starts_with("sonar") {
            Provider::Perplexity
        } else {
            Provider::OpenAi
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Pdf2AnkiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "gpt" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "perplexity" | "sonar" => Ok(Provider::Perplexity),
            _ => Err(Pdf2AnkiError::UnknownProvider {
                name: s.to_string(),
            }),
        }
    }
}

/// API keys per provider, populated once at startup.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: BTreeMap<Provider, String>,
}

impl Credentials {
    /// No keys at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read every provider's key from the process environment.
    ///
    /// Empty values are treated as absent.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup (used by tests and `.env` loaders).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut creds = Self::default();
        for provider in Provider::ALL {
            if let Some(key) = lookup(provider.env_var()) {
                creds = creds.with_key(provider, key);
            }
        }
        creds
    }

    /// Set (or replace) the key for one provider. Blank keys are ignored.
    pub fn with_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.keys.insert(provider, key.trim().to_string());
        }
        self
    }

    /// The key for `provider`, or an Authentication error naming the variable.
    pub fn require(&self, provider: Provider) -> Result<&str, Pdf2AnkiError> {
        self.keys
            .get(&provider)
            .map(String::as_str)
            .ok_or_else(|| Pdf2AnkiError::MissingCredential {
                provider: provider.to_string(),
                env_var: provider.env_var().to_string(),
            })
    }

    pub fn has(&self, provider: Provider) -> bool {
        self.keys.contains_key(&provider)
    }

    /// Providers with a key present, in declaration order.
    pub fn available(&self) -> Vec<Provider> {
        self.keys.keys().copied().collect()
    }

    /// Configuration error when no provider at all can be used.
    pub fn ensure_any(&self) -> Result<(), Pdf2AnkiError> {
        if self.keys.is_empty() {
            Err(Pdf2AnkiError::NoProviderConfigured)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.debug_struct("Credentials")
            .field("providers", &self.available())
            .finish()
    }
}
