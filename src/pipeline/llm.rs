//! LLM interaction: send one prompt, get one completion back.
//!
//! [`CompletionProvider`] is the seam between the pipeline and the network.
//! [`LlmClient`] implements it for the three supported vendors; tests and
//! embedders inject their own implementation through
//! [`crate::config::RunConfigBuilder::provider`].
//!
//! ## Backends
//!
//! OpenAI and Anthropic go through `edgequake-llm`, built from the key held
//! in [`Credentials`] (never from the process environment). Perplexity has
//! no provider there, so it is spoken to directly, as is any provider given
//! an explicit `base_url` (gateways, local proxies):
//!
//! | Provider | Endpoint | Auth header |
//! |----------|----------|-------------|
//! | OpenAI | `POST {base}/chat/completions` | `Authorization: Bearer` |
//! | Perplexity | `POST {base}/chat/completions` | `Authorization: Bearer` |
//! | Anthropic | `POST {base}/messages` | `x-api-key` + `anthropic-version` |
//!
//! Requests are sent exactly once. A 429 surfaces as
//! [`Pdf2AnkiError::RateLimited`] and the caller decides whether to try again.

use crate::config::LlmOptions;
use crate::credentials::{Credentials, Provider};
use crate::error::Pdf2AnkiError;
use async_trait::async_trait;
use edgequake_llm::{AnthropicProvider, ChatMessage, CompletionOptions, LLMProvider, OpenAIProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Temperature sent to Perplexity when the caller leaves it unset.
const PERPLEXITY_DEFAULT_TEMPERATURE: f32 = 0.2;

/// Error bodies are cut to this many characters before they land in an error.
const MAX_ERROR_BODY: usize = 500;

/// Text produced by the model plus bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub provider: Provider,
    pub model: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Anything that turns a prompt into a completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send `prompt` as a single user message and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<ModelResponse, Pdf2AnkiError>;

    fn provider(&self) -> Provider;

    fn model(&self) -> &str;
}

// ── Request / response bodies ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    /// Anthropic and Perplexity.
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    /// OpenAI; o-series and newer models reject `max_tokens`.
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct MessagesUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

// ── Client ───────────────────────────────────────────────────────────────

enum Backend {
    Library(Arc<dyn LLMProvider>),
    Http {
        http: reqwest::Client,
        api_key: String,
        base_url: String,
    },
}

/// Client for one provider/model pair.
pub struct LlmClient {
    backend: Backend,
    provider: Provider,
    model: String,
    options: LlmOptions,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Library(_) => "edgequake-llm".to_string(),
            Backend::Http { base_url, .. } => base_url.clone(),
        };
        f.debug_struct("LlmClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("backend", &backend)
            .finish()
    }
}

/// `edgequake-llm` provider for `provider`, if the library has one.
fn library_provider(provider: Provider, api_key: &str, model: &str) -> Option<Arc<dyn LLMProvider>> {
    match provider {
        Provider::OpenAi => {
            Some(Arc::new(OpenAIProvider::new(api_key).with_model(model)) as Arc<dyn LLMProvider>)
        }
        Provider::Anthropic => {
            Some(Arc::new(AnthropicProvider::new(api_key).with_model(model)) as Arc<dyn LLMProvider>)
        }
        Provider::Perplexity => None,
    }
}

impl LlmClient {
    /// Build a client, failing with an Authentication error when the
    /// provider's key is missing. No network traffic happens here.
    pub fn new(
        provider: Provider,
        model: impl Into<String>,
        credentials: &Credentials,
        options: &LlmOptions,
    ) -> Result<Self, Pdf2AnkiError> {
        let model = model.into();
        let api_key = credentials.require(provider)?;

        let library = match options.base_url {
            Some(_) => None,
            None => library_provider(provider, api_key, &model),
        };
        let backend = match library {
            Some(llm) => Backend::Library(llm),
            None => {
                let http = reqwest::Client::builder()
                    .timeout(Duration::from_secs(options.timeout_secs))
                    .build()
                    .map_err(|e| Pdf2AnkiError::RequestFailed {
                        provider: provider.to_string(),
                        reason: format!("could not build HTTP client: {e}"),
                    })?;
                let base_url = options
                    .base_url
                    .as_deref()
                    .unwrap_or(provider.default_base_url())
                    .trim_end_matches('/')
                    .to_string();
                Backend::Http {
                    http,
                    api_key: api_key.to_string(),
                    base_url,
                }
            }
        };

        Ok(Self {
            backend,
            provider,
            model,
            options: options.clone(),
        })
    }

    fn uses_library(&self) -> bool {
        matches!(self.backend, Backend::Library(_))
    }

    fn temperature(&self) -> Option<f32> {
        match (self.options.temperature, self.provider) {
            (Some(t), _) => Some(t),
            (None, Provider::Perplexity) => Some(PERPLEXITY_DEFAULT_TEMPERATURE),
            (None, _) => None,
        }
    }

    fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature(),
            max_tokens: Some(self.options.max_tokens),
            ..Default::default()
        }
    }

    fn request_body<'a>(&'a self, prompt: &str) -> ChatRequest<'a> {
        let (max_tokens, max_completion_tokens) = match self.provider {
            Provider::OpenAi => (None, Some(self.options.max_tokens)),
            Provider::Anthropic | Provider::Perplexity => (Some(self.options.max_tokens), None),
        };
        ChatRequest {
            model: &self.model,
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            max_completion_tokens,
            temperature: self.temperature(),
        }
    }

    fn timeout_error(&self) -> Pdf2AnkiError {
        Pdf2AnkiError::Timeout {
            provider: self.provider.to_string(),
            secs: self.options.timeout_secs,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> Pdf2AnkiError {
        if e.is_timeout() {
            self.timeout_error()
        } else {
            Pdf2AnkiError::RequestFailed {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            }
        }
    }

    fn malformed(&self, detail: impl Into<String>) -> Pdf2AnkiError {
        Pdf2AnkiError::MalformedResponse {
            provider: self.provider.to_string(),
            detail: detail.into(),
        }
    }

    async fn complete_library(
        &self,
        llm: &Arc<dyn LLMProvider>,
        prompt: &str,
    ) -> Result<(String, Option<u64>, Option<u64>), Pdf2AnkiError> {
        let messages = vec![ChatMessage::user(prompt)];
        let options = self.completion_options();
        let limit = Duration::from_secs(self.options.timeout_secs);

        let response = tokio::time::timeout(limit, llm.chat(&messages, Some(&options)))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| library_error(self.provider, self.options.timeout_secs, &e.to_string()))?;

        if response.content.trim().is_empty() {
            return Err(self.malformed("completion text is empty"));
        }
        Ok((
            response.content,
            Some(response.prompt_tokens as u64),
            Some(response.completion_tokens as u64),
        ))
    }

    async fn complete_http(
        &self,
        http: &reqwest::Client,
        api_key: &str,
        base_url: &str,
        prompt: &str,
    ) -> Result<(String, Option<u64>, Option<u64>), Pdf2AnkiError> {
        let req = http
            .post(endpoint(self.provider, base_url))
            .json(&self.request_body(prompt));
        let req = match self.provider {
            Provider::Anthropic => req
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Provider::OpenAi | Provider::Perplexity => req.bearer_auth(api_key),
        };

        let response = req.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            warn!("{} returned HTTP {}", self.provider, status.as_u16());
            return Err(status_error(self.provider, status.as_u16(), retry_after, &body));
        }
        self.decode(&body)
    }

    /// Pull the reply text and token counts out of a success body.
    fn decode(&self, body: &str) -> Result<(String, Option<u64>, Option<u64>), Pdf2AnkiError> {
        let (text, input, output) = match self.provider {
            Provider::Anthropic => {
                let resp: MessagesResponse =
                    serde_json::from_str(body).map_err(|e| self.malformed(e.to_string()))?;
                let text: String = resp
                    .content
                    .into_iter()
                    .filter(|b| b.kind == "text")
                    .map(|b| b.text)
                    .collect();
                let usage = resp.usage;
                (
                    text,
                    usage.as_ref().and_then(|u| u.input_tokens),
                    usage.as_ref().and_then(|u| u.output_tokens),
                )
            }
            Provider::OpenAi | Provider::Perplexity => {
                let resp: ChatResponse =
                    serde_json::from_str(body).map_err(|e| self.malformed(e.to_string()))?;
                let text = resp
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| self.malformed("response has no choices"))?;
                let usage = resp.usage;
                (
                    text,
                    usage.as_ref().and_then(|u| u.prompt_tokens),
                    usage.as_ref().and_then(|u| u.completion_tokens),
                )
            }
        };
        if text.trim().is_empty() {
            return Err(self.malformed("completion text is empty"));
        }
        Ok((text, input, output))
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<ModelResponse, Pdf2AnkiError> {
        let start = Instant::now();
        debug!(
            "Sending {} char prompt to {} ({})",
            prompt.len(),
            self.provider,
            self.model
        );

        let (text, input_tokens, output_tokens) = match &self.backend {
            Backend::Library(llm) => self.complete_library(llm, prompt).await?,
            Backend::Http {
                http,
                api_key,
                base_url,
            } => self.complete_http(http, api_key, base_url, prompt).await?,
        };
        debug!(
            "{}: {:?} input tokens, {:?} output tokens, {:?}",
            self.provider,
            input_tokens,
            output_tokens,
            start.elapsed()
        );

        Ok(ModelResponse {
            text,
            provider: self.provider,
            model: self.model.clone(),
            input_tokens,
            output_tokens,
        })
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn endpoint(provider: Provider, base_url: &str) -> String {
    match provider {
        Provider::Anthropic => format!("{base_url}/messages"),
        Provider::OpenAi | Provider::Perplexity => format!("{base_url}/chat/completions"),
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
fn status_error(
    provider: Provider,
    status: u16,
    retry_after_secs: Option<u64>,
    body: &str,
) -> Pdf2AnkiError {
    let body: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    let provider = provider.to_string();
    match status {
        401 | 403 => Pdf2AnkiError::AuthRejected {
            provider,
            detail: format!("HTTP {status}: {body}"),
        },
        429 => Pdf2AnkiError::RateLimited {
            provider,
            retry_after_secs,
        },
        _ => Pdf2AnkiError::ApiStatus {
            provider,
            status,
            body,
        },
    }
}

/// Map an `edgequake-llm` failure onto the error taxonomy.
///
/// The library reports vendor failures as text carrying the upstream status
/// or message, so classification goes by that text.
fn library_error(provider: Provider, timeout_secs: u64, detail: &str) -> Pdf2AnkiError {
    let detail: String = detail.trim().chars().take(MAX_ERROR_BODY).collect();
    let lower = detail.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    let provider_name = provider.to_string();

    if has(&["401", "403", "unauthorized", "invalid api key", "incorrect api key", "invalid x-api-key", "authentication"]) {
        Pdf2AnkiError::AuthRejected {
            provider: provider_name,
            detail,
        }
    } else if has(&["429", "rate limit", "rate_limit"]) {
        Pdf2AnkiError::RateLimited {
            provider: provider_name,
            retry_after_secs: None,
        }
    } else if has(&["timed out", "timeout"]) {
        Pdf2AnkiError::Timeout {
            provider: provider_name,
            secs: timeout_secs,
        }
    } else {
        Pdf2AnkiError::RequestFailed {
            provider: provider_name,
            reason: detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a loopback port and hand back the
    /// raw request that was received.
    async fn serve_once(
        status_line: &'static str,
        extra_headers: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let raw = String::from_utf8_lossy(&buf);
                if let Some(header_end) = raw.find("\r\n\r\n") {
                    let content_length = raw[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\n{extra_headers}content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn client(provider: Provider, base_url: String) -> LlmClient {
        let creds = Credentials::empty().with_key(provider, "test-key");
        let options = LlmOptions {
            base_url: Some(base_url),
            timeout_secs: 5,
            ..LlmOptions::default()
        };
        LlmClient::new(provider, provider.default_model(), &creds, &options).unwrap()
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let err = LlmClient::new(
            Provider::Anthropic,
            "claude-3-haiku-20240307",
            &Credentials::empty(),
            &LlmOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn endpoints_follow_provider() {
        assert_eq!(endpoint(Provider::Anthropic, "http://x/v1"), "http://x/v1/messages");
        assert_eq!(endpoint(Provider::Perplexity, "http://x"), "http://x/chat/completions");
        let c = client(Provider::Anthropic, "http://x/v1/".into());
        assert!(format!("{c:?}").contains("http://x/v1\""));
    }

    #[test]
    fn openai_and_anthropic_use_the_llm_library() {
        let creds = Credentials::empty()
            .with_key(Provider::OpenAi, "sk-test")
            .with_key(Provider::Anthropic, "sk-ant-test")
            .with_key(Provider::Perplexity, "pplx-test");
        let options = LlmOptions::default();
        for (provider, library) in [
            (Provider::OpenAi, true),
            (Provider::Anthropic, true),
            (Provider::Perplexity, false),
        ] {
            let c = LlmClient::new(provider, provider.default_model(), &creds, &options).unwrap();
            assert_eq!(c.uses_library(), library, "{provider}");
        }
        // An explicit base URL always goes direct.
        assert!(!client(Provider::OpenAi, "http://x".into()).uses_library());
    }

    #[test]
    fn completion_options_carry_limits() {
        let creds = Credentials::empty().with_key(Provider::OpenAi, "sk-test");
        let options = LlmOptions {
            max_tokens: 1500,
            temperature: Some(0.3),
            ..LlmOptions::default()
        };
        let c = LlmClient::new(Provider::OpenAi, "gpt-4.1-nano", &creds, &options).unwrap();
        let opts = c.completion_options();
        assert_eq!(opts.max_tokens, Some(1500));
        assert_eq!(opts.temperature, Some(0.3));
    }

    #[test]
    fn openai_body_uses_max_completion_tokens() {
        let c = client(Provider::OpenAi, "http://x".into());
        let body = serde_json::to_value(c.request_body("p")).unwrap();
        assert_eq!(body["max_completion_tokens"], 4096);
        assert!(body.get("max_tokens").is_none());

        for provider in [Provider::Anthropic, Provider::Perplexity] {
            let c = client(provider, "http://x".into());
            let body = serde_json::to_value(c.request_body("p")).unwrap();
            assert_eq!(body["max_tokens"], 4096, "{provider}");
            assert!(body.get("max_completion_tokens").is_none());
        }
    }

    #[test]
    fn library_error_mapping() {
        let e = library_error(Provider::OpenAi, 60, "API error: 401 Unauthorized: Incorrect API key");
        assert_eq!(e.kind(), ErrorKind::Authentication);
        let e = library_error(Provider::Anthropic, 60, "Rate limited: 429 Too Many Requests");
        assert!(matches!(e, Pdf2AnkiError::RateLimited { .. }));
        let e = library_error(Provider::OpenAi, 60, "Network error: operation timed out");
        assert!(matches!(e, Pdf2AnkiError::Timeout { secs: 60, .. }));
        let e = library_error(Provider::OpenAi, 60, "Network error: connection refused");
        assert_eq!(e.kind(), ErrorKind::Transport);
    }

    #[test]
    fn perplexity_gets_default_temperature() {
        let c = client(Provider::Perplexity, "http://x".into());
        assert_eq!(c.temperature(), Some(0.2));
        let c = client(Provider::OpenAi, "http://x".into());
        assert_eq!(c.temperature(), None);
    }

    #[test]
    fn status_mapping() {
        let e = status_error(Provider::OpenAi, 401, None, "bad key");
        assert_eq!(e.kind(), ErrorKind::Authentication);
        let e = status_error(Provider::OpenAi, 429, Some(7), "");
        assert!(matches!(
            e,
            Pdf2AnkiError::RateLimited {
                retry_after_secs: Some(7),
                ..
            }
        ));
        let e = status_error(Provider::Anthropic, 529, None, "overloaded");
        assert!(matches!(e, Pdf2AnkiError::ApiStatus { status: 529, .. }));
        assert_eq!(e.kind(), ErrorKind::Transport);
    }

    #[test]
    fn decode_rejects_empty_choices() {
        let c = client(Provider::OpenAi, "http://x".into());
        let err = c.decode(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, Pdf2AnkiError::MalformedResponse { .. }));
        let err = c.decode("not json").unwrap_err();
        assert!(matches!(err, Pdf2AnkiError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn openai_round_trip_over_loopback() {
        let (base, server) = serve_once(
            "200 OK",
            "",
            r#"{"choices":[{"message":{"role":"assistant","content":"Q: What boils at 100C?\nA: Water"}}],"usage":{"prompt_tokens":12,"completion_tokens":9}}"#,
        )
        .await;
        let c = client(Provider::OpenAi, base);
        let resp = c.complete("Text:\nWater boils at 100C.").await.unwrap();
        assert_eq!(resp.text, "Q: What boils at 100C?\nA: Water");
        assert_eq!(resp.input_tokens, Some(12));
        assert_eq!(resp.output_tokens, Some(9));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer test-key"));
        assert!(request.contains("Water boils at 100C."));
        assert!(request.contains("\"max_completion_tokens\":4096"));
    }

    #[tokio::test]
    async fn anthropic_round_trip_over_loopback() {
        let (base, server) = serve_once(
            "200 OK",
            "",
            r#"{"content":[{"type":"text","text":"Q: Capital of France?\nA: Paris"}],"usage":{"input_tokens":5,"output_tokens":8}}"#,
        )
        .await;
        let c = client(Provider::Anthropic, base);
        let resp = c.complete("prompt").await.unwrap();
        assert_eq!(resp.provider, Provider::Anthropic);
        assert!(resp.text.contains("Paris"));

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /messages"));
        assert!(request.contains("x-api-key: test-key"));
        assert!(request.contains("anthropic-version: 2023-06-01"));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let (base, _server) =
            serve_once("429 Too Many Requests", "retry-after: 30\r\n", "{}").await;
        let c = client(Provider::Perplexity, base);
        let err = c.complete("prompt").await.unwrap_err();
        assert!(matches!(
            err,
            Pdf2AnkiError::RateLimited {
                retry_after_secs: Some(30),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn rejected_key_is_authentication_error() {
        let (base, _server) =
            serve_once("401 Unauthorized", "", r#"{"error":"invalid api key"}"#).await;
        let c = client(Provider::OpenAi, base);
        let err = c.complete("prompt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let c = client(Provider::OpenAi, format!("http://{addr}"));
        let err = c.complete("prompt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
