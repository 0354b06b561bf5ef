//! Provider Adapter — one schema-driven extraction against one provider.
//!
//! Builds the prompt, walks the candidate models, and parses the reply. A reply
//! that is not JSON is treated like any other model failure and triggers the
//! next candidate; if it is still the last word, the unparseable extraction is
//! returned rather than an error so the caller can decide whether to retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::compress::{ParsingLevel, PromptInfo};
use crate::errors::ParserError;
use crate::llm_client::{
    run_model_fallback, CompletionBackend, CompletionSettings, HttpCompletionClient, LlmError,
    ProviderKind, DEFAULT_FALLBACK_DELAY,
};
use crate::prompts::PromptBuilder;
use crate::response_parser::{parse_llm_response, Extraction};
use crate::schema::Schema;

/// What one adapter call produced. Diagnostics travel with the result.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub extraction: Extraction,
    pub provider: ProviderKind,
    pub model: String,
    pub prompt_info: PromptInfo,
}

/// Lightweight description of the adapter, for logs.
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub provider: ProviderKind,
    pub models: Vec<String>,
    pub temperature: f64,
}

#[derive(Clone)]
pub struct ProviderAdapter {
    provider: ProviderKind,
    backend: Arc<dyn CompletionBackend>,
    models: Vec<String>,
    settings: CompletionSettings,
    prompt_builder: PromptBuilder,
    fallback_delay: Duration,
}

impl ProviderAdapter {
    /// Adapter over an arbitrary backend, using the provider's default models.
    pub fn new(provider: ProviderKind, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            provider,
            backend,
            models: provider
                .default_models()
                .iter()
                .map(|m| m.to_string())
                .collect(),
            settings: CompletionSettings::default(),
            prompt_builder: PromptBuilder::default(),
            fallback_delay: DEFAULT_FALLBACK_DELAY,
        }
    }

    /// Adapter over the real HTTP client. Fails fast when the provider was
    /// compiled out or the key is blank.
    pub fn connect(provider: ProviderKind, api_key: &str) -> Result<Self, ParserError> {
        if !provider.is_available() {
            return Err(ParserError::ProviderUnavailable(provider));
        }
        if api_key.trim().is_empty() {
            return Err(ParserError::Configuration(format!(
                "no API key configured for provider '{provider}' (set {})",
                provider.api_key_env().join(" or ")
            )));
        }
        let client = HttpCompletionClient::new(provider, api_key.to_string())?;
        Ok(Self::new(provider, Arc::new(client)))
    }

    /// Narrows the candidate list to a single model.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.models = vec![model];
        }
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.settings.temperature = temperature;
        self
    }

    pub fn with_prompt_builder(mut self, builder: PromptBuilder) -> Self {
        self.prompt_builder = builder;
        self
    }

    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    pub fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: self.provider,
            models: self.models.clone(),
            temperature: self.settings.temperature,
        }
    }

    pub async fn process_with_schema(
        &self,
        text: &str,
        schema: &Schema,
        level: Option<ParsingLevel>,
    ) -> Result<ProcessOutcome, ParserError> {
        let built = self.prompt_builder.build_with_info(text, schema, level);
        debug!(
            "Prompt built: provider={}, level={:?}, chars={}, est_tokens={}",
            self.provider, level, built.info.prompt_length, built.info.estimated_tokens
        );

        let backend = &self.backend;
        let prompt = built.prompt.as_str();
        let settings = &self.settings;

        let result = run_model_fallback(self.provider, &self.models, self.fallback_delay, |model| async move {
            let raw = backend.complete(&model, prompt, settings).await?;
            match parse_llm_response(&raw) {
                parsed @ Extraction::Parsed { .. } => Ok(parsed),
                Extraction::Unparseable {
                    error,
                    raw_response,
                } => Err(LlmError::Unparseable {
                    message: error,
                    raw_response,
                }),
            }
        })
        .await;

        match result {
            Ok((model, extraction)) => Ok(ProcessOutcome {
                extraction,
                provider: self.provider,
                model,
                prompt_info: built.info,
            }),
            Err(failure) => match failure.last {
                LlmError::Unparseable {
                    message,
                    raw_response,
                } => Ok(ProcessOutcome {
                    extraction: Extraction::Unparseable {
                        error: message,
                        raw_response,
                    },
                    provider: self.provider,
                    model: failure.last_model,
                    prompt_info: built.info,
                }),
                last => Err(ParserError::ProviderCall {
                    provider: self.provider,
                    model: Some(failure.last_model),
                    message: last.to_string(),
                }),
            },
        }
    }
}
