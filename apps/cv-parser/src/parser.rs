//! Orchestrator — the top-level parse operation.
//!
//! Per call:
//! 1. resolve options (per-call > per-instance > built-in)
//! 2. extract document text
//! 3. compress, prompt, call the provider with model fallback, parse; retried as a unit
//! 4. validate / normalize, then the post-validation pass
//! 5. inject metadata and keywords, check the confidence threshold
//!
//! A fresh `ProviderAdapter` is built for every call, so one `CvParser` can be
//! shared across concurrent tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::adapter::ProviderAdapter;
use crate::compress::PromptInfo;
use crate::confidence::overall_confidence;
use crate::config::{Config, ParseOptions, ResolvedOptions};
use crate::document::{DefaultExtractor, DocumentExtractor, DocumentSource, ExtractedDocument};
use crate::errors::{ErrorKind, ParserError};
use crate::keywords::extract_keywords;
use crate::llm_client::{CompletionBackend, ProviderKind, DEFAULT_FALLBACK_DELAY};
use crate::normalize::post_normalize;
use crate::prompts::PromptBuilder;
use crate::response_parser::Extraction;
use crate::schema::{default_schema, FieldTypeRegistry, Schema};
use crate::validation::{SchemaValidator, ValidationIssue};

/// Base delay between whole-attempt retries; attempt `n` waits `n` times this.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

// ────────────────────────────────────────────────────────────────────────────
// Results
// ────────────────────────────────────────────────────────────────────────────

/// Validation outcome without the data copy (the data lives in `ParseResult`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub data: Value,
    /// Result-level completeness score, also reported as `metadata.parseConfidence`.
    pub confidence: f64,
    /// Score attached to the raw provider reply.
    pub provider_confidence: f64,
    pub provider: ProviderKind,
    pub model: String,
    pub attempts: u32,
    pub prompt_info: PromptInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSummary>,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ParseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchError>,
}

impl BatchItem {
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Fraction of successful items, two decimals.
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub summary: BatchSummary,
}

/// One successful provider round-trip.
struct Attempted {
    data: Value,
    provider_confidence: f64,
    model: String,
    prompt_info: PromptInfo,
    attempts: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// Parser
// ────────────────────────────────────────────────────────────────────────────

pub struct CvParser {
    config: Config,
    defaults: ParseOptions,
    schema: Schema,
    registry: FieldTypeRegistry,
    extractor: Arc<dyn DocumentExtractor>,
    backends: HashMap<ProviderKind, Arc<dyn CompletionBackend>>,
    retry_base_delay: Duration,
    fallback_delay: Duration,
}

impl CvParser {
    /// Fails fast when the default provider is compiled out or has no API key.
    pub fn new(config: Config, defaults: ParseOptions) -> Result<Self, ParserError> {
        let defaults = defaults.over(&config.option_defaults());
        let resolved = defaults.resolve()?;
        ensure_provider(&config, resolved.provider)?;

        Ok(Self {
            config,
            defaults,
            schema: default_schema().clone(),
            registry: FieldTypeRegistry::new(),
            extractor: Arc::new(DefaultExtractor),
            backends: HashMap::new(),
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            fallback_delay: DEFAULT_FALLBACK_DELAY,
        })
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_registry(mut self, registry: FieldTypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Routes calls for `provider` to `backend` instead of the HTTP client.
    pub fn with_backend(mut self, provider: ProviderKind, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backends.insert(provider, backend);
        self
    }

    pub fn with_retry_delay(mut self, base: Duration) -> Self {
        self.retry_base_delay = base;
        self
    }

    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parses one document. `options` override the instance defaults.
    pub async fn parse(
        &self,
        source: &DocumentSource,
        options: &ParseOptions,
    ) -> Result<ParseResult, ParserError> {
        let opts = options.over(&self.defaults).resolve()?;
        with_deadline(opts.timeout, async {
            let adapter = self.adapter_for(&opts)?;
            info!("Extracting text from {}", source.label());
            let doc = self.extractor.extract(source).await?;
            self.process_document(&adapter, &doc, &opts).await
        })
        .await
    }

    /// Parses text that was already extracted.
    pub async fn parse_text(
        &self,
        text: &str,
        options: &ParseOptions,
    ) -> Result<ParseResult, ParserError> {
        let opts = options.over(&self.defaults).resolve()?;
        if text.trim().is_empty() {
            return Err(ParserError::DocumentExtraction(
                "no text to parse".to_string(),
            ));
        }
        with_deadline(opts.timeout, async {
            let adapter = self.adapter_for(&opts)?;
            let doc = ExtractedDocument::from_text(text);
            self.process_document(&adapter, &doc, &opts).await
        })
        .await
    }

    /// Parses each source in turn. A failing item never stops the batch.
    pub async fn parse_batch(&self, sources: &[DocumentSource], options: &ParseOptions) -> BatchReport {
        let mut items = Vec::with_capacity(sources.len());
        for (i, source) in sources.iter().enumerate() {
            info!("Batch item {}/{}: {}", i + 1, sources.len(), source.label());
            let item = match self.parse(source, options).await {
                Ok(result) => BatchItem {
                    source: source.label(),
                    result: Some(result),
                    error: None,
                },
                Err(e) => {
                    warn!("Batch item {} failed: {}", source.label(), e);
                    BatchItem {
                        source: source.label(),
                        result: None,
                        error: Some(BatchError {
                            kind: e.kind(),
                            message: e.to_string(),
                        }),
                    }
                }
            };
            items.push(item);
        }

        let total = items.len();
        let successful = items.iter().filter(|i| i.is_success()).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            (successful as f64 / total as f64 * 100.0).round() / 100.0
        };
        info!("Batch finished: {}/{} succeeded", successful, total);
        BatchReport {
            items,
            summary: BatchSummary {
                total,
                successful,
                failed: total - successful,
                success_rate,
            },
        }
    }

    fn adapter_for(&self, opts: &ResolvedOptions) -> Result<ProviderAdapter, ParserError> {
        let adapter = match self.backends.get(&opts.provider) {
            Some(backend) => {
                if !opts.provider.is_available() {
                    return Err(ParserError::ProviderUnavailable(opts.provider));
                }
                ProviderAdapter::new(opts.provider, backend.clone())
            }
            None => {
                ensure_provider(&self.config, opts.provider)?;
                let key = self.config.api_key(opts.provider).unwrap_or_default();
                ProviderAdapter::connect(opts.provider, key)?
            }
        };
        Ok(adapter
            .with_model(opts.model.clone())
            .with_temperature(opts.temperature)
            .with_prompt_builder(
                PromptBuilder::new().with_canned_field_lists(!opts.full_schema_prompts),
            )
            .with_fallback_delay(self.fallback_delay))
    }

    /// Prompt through parse, retried with a linearly growing delay.
    async fn extract_with_retry(
        &self,
        adapter: &ProviderAdapter,
        text: &str,
        opts: &ResolvedOptions,
    ) -> Result<Attempted, ParserError> {
        let max_attempts = opts.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = adapter
                .process_with_schema(text, &self.schema, opts.parsing_level)
                .await
                .and_then(|outcome| match outcome.extraction {
                    Extraction::Parsed { data, confidence } => Ok(Attempted {
                        data,
                        provider_confidence: confidence,
                        model: outcome.model,
                        prompt_info: outcome.prompt_info,
                        attempts: attempt,
                    }),
                    Extraction::Unparseable {
                        error,
                        raw_response,
                    } => Err(ParserError::ResponseParse {
                        message: error,
                        raw_response,
                    }),
                });

            match result {
                Ok(attempted) => return Ok(attempted),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry_base_delay * attempt;
                    warn!(
                        "Parse attempt {}/{} failed ({}), retrying after {}ms...",
                        attempt,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if attempt > 1 => {
                    return Err(ParserError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn process_document(
        &self,
        adapter: &ProviderAdapter,
        doc: &ExtractedDocument,
        opts: &ResolvedOptions,
    ) -> Result<ParseResult, ParserError> {
        let info = adapter.info();
        info!(
            "Parsing document: provider={}, models={:?}, temperature={}, level={}, words={}",
            info.provider,
            info.models,
            info.temperature,
            opts.parsing_level.map_or("full", |l| l.as_str()),
            doc.word_count()
        );
        let attempted = self.extract_with_retry(adapter, doc.text(), opts).await?;
        let mut data = attempted.data;

        let validation = if opts.validate_data {
            let report = SchemaValidator::new(self.registry.clone())
                .with_normalization(opts.normalize_data)
                .validate(&data, &self.schema);
            if !report.warnings.is_empty() {
                warn!("Validation produced {} warning(s)", report.warnings.len());
            }
            if opts.strict_validation && !report.is_valid {
                return Err(ParserError::Validation {
                    errors: report.errors,
                });
            }
            data = report.data;
            Some(ValidationSummary {
                is_valid: report.is_valid,
                errors: report.errors,
                warnings: report.warnings,
            })
        } else {
            None
        };

        if opts.normalize_data {
            post_normalize(&mut data, Utc::now().date_naive());
        }

        let confidence = overall_confidence(&data);
        let low_confidence = confidence < opts.confidence_threshold;
        if low_confidence {
            warn!(
                "Low confidence parse: {:.2} below threshold {:.2}",
                confidence, opts.confidence_threshold
            );
        }

        if let Value::Object(map) = &mut data {
            if let Some(metadata) = build_metadata(doc, opts, &attempted.model, confidence, low_confidence) {
                map.insert("metadata".to_string(), Value::Object(metadata));
            }
        }

        info!(
            "Parse complete: model={}, attempts={}, confidence={:.2}",
            attempted.model, attempted.attempts, confidence
        );
        Ok(ParseResult {
            data,
            confidence,
            provider_confidence: attempted.provider_confidence,
            provider: opts.provider,
            model: attempted.model,
            attempts: attempted.attempts,
            prompt_info: attempted.prompt_info,
            validation,
            low_confidence,
        })
    }
}

fn ensure_provider(config: &Config, provider: ProviderKind) -> Result<(), ParserError> {
    if !provider.is_available() {
        return Err(ParserError::ProviderUnavailable(provider));
    }
    if config.api_key(provider).is_none() {
        return Err(ParserError::Configuration(format!(
            "no API key configured for provider '{provider}' (set {})",
            provider.api_key_env().join(" or ")
        )));
    }
    Ok(())
}

async fn with_deadline<F>(timeout: Option<Duration>, fut: F) -> Result<ParseResult, ParserError>
where
    F: std::future::Future<Output = Result<ParseResult, ParserError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ParserError::Timeout(limit))?,
        None => fut.await,
    }
}

/// `None` when neither metadata nor keywords were requested.
fn build_metadata(
    doc: &ExtractedDocument,
    opts: &ResolvedOptions,
    model: &str,
    confidence: f64,
    low_confidence: bool,
) -> Option<Map<String, Value>> {
    if !opts.include_metadata && !opts.include_keywords {
        return None;
    }
    let mut metadata = Map::new();
    if opts.include_metadata {
        metadata.insert("parseDate".into(), json!(Utc::now().to_rfc3339()));
        metadata.insert("parseConfidence".into(), json!(confidence));
        metadata.insert("provider".into(), json!(opts.provider));
        metadata.insert("model".into(), json!(model));
        metadata.insert("wordCount".into(), json!(doc.word_count()));
        metadata.insert("lineCount".into(), json!(doc.line_count()));
        metadata.insert(
            "parsingLevel".into(),
            json!(opts.parsing_level.map_or("full", |l| l.as_str())),
        );
        if low_confidence {
            metadata.insert("lowConfidence".into(), json!(true));
        }
    }
    if opts.include_keywords {
        metadata.insert(
            "keywords".into(),
            json!(extract_keywords(doc.text(), opts.max_keywords)),
        );
    }
    Some(metadata)
}
