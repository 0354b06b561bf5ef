/// LLM Client — every provider round-trip in the parser goes through this module.
///
/// A call is split in two layers:
/// - `ProviderBinding` (see `providers`) knows one vendor's wire format
/// - `CompletionBackend` performs the call; `HttpCompletionClient` is the real
///   one, `mock::ScriptedBackend` replays canned replies in tests
///
/// There is deliberately no retry in here. Model fallback lives in `fallback`,
/// whole-attempt retry lives in the orchestrator.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::ParserError;

pub mod fallback;
pub mod mock;
pub mod prompts;
pub mod providers;

pub use fallback::{run_model_fallback, ModelFallbackError, DEFAULT_FALLBACK_DELAY};
pub use providers::{binding_for, ProviderBinding, ProviderRequest};

pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const MAX_OUTPUT_TOKENS: u32 = 4000;
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

// ────────────────────────────────────────────────────────────────────────────
// Providers
// ────────────────────────────────────────────────────────────────────────────

/// The LLM vendors the parser can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "google")]
    Gemini,
    OpenAi,
    #[serde(alias = "claude")]
    Anthropic,
    Groq,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Gemini,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Groq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Groq => "groq",
        }
    }

    /// Whether the binding for this provider was compiled in (cargo feature).
    pub fn is_available(&self) -> bool {
        match self {
            ProviderKind::Gemini => cfg!(feature = "gemini"),
            ProviderKind::OpenAi => cfg!(feature = "openai"),
            ProviderKind::Anthropic => cfg!(feature = "anthropic"),
            ProviderKind::Groq => cfg!(feature = "groq"),
        }
    }

    /// Candidate models, tried in order by the fallback loop.
    pub fn default_models(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Gemini => &["gemini-2.0-flash", "gemini-1.5-flash", "gemini-1.5-pro"],
            ProviderKind::OpenAi => &["gpt-4o-mini", "gpt-4o", "gpt-3.5-turbo"],
            ProviderKind::Anthropic => &["claude-sonnet-4-5", "claude-3-5-haiku-latest"],
            ProviderKind::Groq => &[
                "llama-3.3-70b-versatile",
                "llama-3.1-8b-instant",
                "mixtral-8x7b-32768",
            ],
        }
    }

    /// Environment variables holding the API key, first match wins.
    pub fn api_key_env(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            ProviderKind::OpenAi => &["OPENAI_API_KEY"],
            ProviderKind::Anthropic => &["ANTHROPIC_API_KEY"],
            ProviderKind::Groq => &["GROQ_API_KEY"],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "groq" => Ok(ProviderKind::Groq),
            other => Err(ParserError::Configuration(format!(
                "unsupported provider '{other}'"
            ))),
        }
    }
}

/// Providers compiled into this build.
pub fn list_available_providers() -> Vec<ProviderKind> {
    ProviderKind::ALL
        .into_iter()
        .filter(ProviderKind::is_available)
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model '{model}' not found: {message}")]
    ModelNotFound { model: String, message: String },

    #[error("access to model '{model}' denied: {message}")]
    AccessDenied { model: String, message: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("reply was not valid JSON: {message}")]
    Unparseable {
        message: String,
        raw_response: String,
    },

    #[error("no candidate models configured")]
    NoCandidates,
}

impl LlmError {
    /// Maps a non-success HTTP status to a typed error. Some providers only
    /// report a missing model in the message body, so that is checked too.
    pub fn from_status(status: u16, model: &str, message: String) -> Self {
        match status {
            404 => LlmError::ModelNotFound {
                model: model.to_string(),
                message,
            },
            403 => LlmError::AccessDenied {
                model: model.to_string(),
                message,
            },
            429 => LlmError::RateLimited(message),
            _ if mentions_missing_model(&message) => LlmError::ModelNotFound {
                model: model.to_string(),
                message,
            },
            _ => LlmError::Api { status, message },
        }
    }

    /// Errors that make the next candidate model worth trying without delay.
    pub fn skips_immediately(&self) -> bool {
        match self {
            LlmError::ModelNotFound { .. } | LlmError::AccessDenied { .. } => true,
            LlmError::Api { status, message } => {
                *status == 404 || *status == 403 || mentions_missing_model(message)
            }
            _ => false,
        }
    }
}

fn mentions_missing_model(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not found") || lower.contains("does not exist") || lower.contains("access denied")
}

// ────────────────────────────────────────────────────────────────────────────
// Backends
// ────────────────────────────────────────────────────────────────────────────

/// Per-call generation knobs shared by every provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub temperature: f64,
    pub max_tokens: u32,
    pub system: String,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: MAX_OUTPUT_TOKENS,
            system: prompts::SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

/// Sends one prompt to one model and returns the raw completion text.
///
/// Held as `Arc<dyn CompletionBackend>` by the provider adapter.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<String, LlmError>;
}

/// Real backend: a provider binding plus a shared reqwest client.
pub struct HttpCompletionClient {
    client: Client,
    binding: Box<dyn ProviderBinding>,
    api_key: String,
}

impl HttpCompletionClient {
    pub fn new(provider: ProviderKind, api_key: String) -> Result<Self, ParserError> {
        let binding = binding_for(provider).ok_or(ParserError::ProviderUnavailable(provider))?;
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ParserError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            binding,
            api_key,
        })
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionClient {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<String, LlmError> {
        let request = self
            .binding
            .build_request(&self.api_key, model, prompt, settings)?;

        let mut builder = self
            .client
            .post(&request.url)
            .header("content-type", "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.json(&request.body).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = self.binding.error_message(&body);
            warn!(
                "{} API returned {} for model {}: {}",
                self.binding.kind(),
                status,
                model,
                message
            );
            return Err(LlmError::from_status(status.as_u16(), model, message));
        }

        let text = self.binding.extract_completion(&body)?;
        debug!(
            "{} completion received: model={}, chars={}",
            self.binding.kind(),
            model,
            text.len()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names_and_aliases() {
        assert_eq!("google".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!(" Claude ".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::OpenAi.to_string(), "openai");

        let err = "cohere".parse::<ProviderKind>().unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Configuration);
    }

    #[test]
    fn test_provider_serde_aliases() {
        let kind: ProviderKind = serde_json::from_str("\"claude\"").unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAi).unwrap(), "\"openai\"");
    }

    #[test]
    fn test_default_build_lists_all_providers() {
        assert_eq!(list_available_providers(), ProviderKind::ALL.to_vec());
    }

    #[test]
    fn test_status_classification() {
        assert!(LlmError::from_status(404, "m", "nope".into()).skips_immediately());
        assert!(LlmError::from_status(403, "m", "nope".into()).skips_immediately());
        assert!(matches!(
            LlmError::from_status(429, "m", "slow down".into()),
            LlmError::RateLimited(_)
        ));
        let body_only = LlmError::from_status(400, "m", "The model `x` does not exist".into());
        assert!(matches!(body_only, LlmError::ModelNotFound { .. }));
        assert!(!LlmError::from_status(500, "m", "overloaded".into()).skips_immediately());
        assert!(!LlmError::EmptyContent.skips_immediately());
    }

    #[test]
    fn test_default_settings() {
        let s = CompletionSettings::default();
        assert_eq!(s.max_tokens, 4000);
        assert!((s.temperature - 0.1).abs() < f64::EPSILON);
        assert_eq!(s.system, "Extract CV data and return valid JSON only");
    }
}
