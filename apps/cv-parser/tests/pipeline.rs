//! End-to-end parses against a scripted provider backend.

use std::sync::Arc;
use std::time::Duration;

use cv_parser::llm_client::mock::{Scripted, ScriptedBackend};
use cv_parser::llm_client::LlmError;
use cv_parser::prompts::LOW_LEVEL_FIELDS;
use cv_parser::schema::{minimal_schema, FieldHandler, FieldTypeRegistry};
use cv_parser::{
    Config, CvParser, DocumentExtractor, DocumentSource, ErrorKind, ExtractedDocument, FieldType,
    LevelSetting, ParseOptions, ParserError, ParsingLevel, ProviderKind,
};
use serde_json::{json, Value};

const JANE: &str = "Jane Doe\njane@x.com\n555-1234\nSkills: Python, SQL";
const JANE_REPLY: &str = r#"{"personal":{"fullName":"Jane Doe","email":"jane@x.com","phone":"555-1234"},
    "skills":{"technical":["Python","SQL"],"soft":[]}}"#;

fn parser_with(provider: ProviderKind, backend: &ScriptedBackend) -> CvParser {
    let config = Config::with_keys(provider, [(provider, "test-key".to_string())]);
    CvParser::new(config, ParseOptions::default())
        .unwrap()
        .with_backend(provider, Arc::new(backend.clone()))
        .with_fallback_delay(Duration::ZERO)
        .with_retry_delay(Duration::ZERO)
}

fn low() -> ParseOptions {
    ParseOptions {
        parsing_level: Some(LevelSetting::Level(ParsingLevel::Low)),
        ..Default::default()
    }
}

#[tokio::test]
async fn low_level_prompt_uses_canned_fields_and_full_text() {
    let backend = ScriptedBackend::always(JANE_REPLY);
    let result = parser_with(ProviderKind::Gemini, &backend)
        .parse_text(JANE, &low())
        .await
        .unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].prompt.contains(LOW_LEVEL_FIELDS));
    assert!(calls[0].prompt.contains(JANE));
    assert!(calls[0].prompt.ends_with("Return only the JSON object."));
    assert_eq!(result.prompt_info.compressed_text_length, JANE.chars().count());

    assert!(result.data["personal"]["fullName"].is_string());
    assert_eq!(result.data["metadata"]["parsingLevel"], "low");
}

#[tokio::test]
async fn chatty_fenced_reply_is_recovered() {
    let backend = ScriptedBackend::always(
        "Sure! ```json\n{\"personal\":{\"fullName\":\"A B\",\"email\":\"a@b.com\"}}\n```",
    );
    let result = parser_with(ProviderKind::OpenAi, &backend)
        .parse_text("A B\na@b.com", &ParseOptions::default())
        .await
        .unwrap();

    assert_eq!(result.data["personal"]["email"], "a@b.com");
    assert_eq!(result.provider_confidence, 0.8);
    assert_eq!(result.attempts, 1);
}

#[tokio::test]
async fn strict_validation_fails_on_missing_required_field() {
    let backend = ScriptedBackend::always(r#"{"personal":{"email":"a@b.com"}}"#);
    let strict = ParseOptions {
        strict_validation: Some(true),
        ..Default::default()
    };
    let err = parser_with(ProviderKind::Anthropic, &backend)
        .parse_text("a@b.com", &strict)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("personal.fullName"));
}

#[tokio::test]
async fn lenient_validation_returns_null_and_reports_errors() {
    let backend = ScriptedBackend::always(r#"{"personal":{"email":"a@b.com"}}"#);
    let result = parser_with(ProviderKind::Anthropic, &backend)
        .parse_text("a@b.com", &ParseOptions::default())
        .await
        .unwrap();

    assert_eq!(result.data["personal"]["fullName"], Value::Null);
    let validation = result.validation.expect("validation report");
    assert!(!validation.is_valid);
    assert!(validation
        .errors
        .iter()
        .any(|e| e.path == "personal.fullName"));
}

#[tokio::test(start_paused = true)]
async fn missing_models_fall_through_without_delay() {
    let backend = ScriptedBackend::new()
        .on_model(
            "gemini-2.0-flash",
            Scripted::Fail(LlmError::from_status(404, "gemini-2.0-flash", "not found".into())),
        )
        .on_model(
            "gemini-1.5-flash",
            Scripted::Fail(LlmError::from_status(
                400,
                "gemini-1.5-flash",
                "models/gemini-1.5-flash is not found for API version v1beta".into(),
            )),
        )
        .on_model("gemini-1.5-pro", Scripted::Reply(JANE_REPLY.into()));

    let config = Config::with_keys(ProviderKind::Gemini, [(ProviderKind::Gemini, "k".to_string())]);
    let parser = CvParser::new(config, ParseOptions::default())
        .unwrap()
        .with_backend(ProviderKind::Gemini, Arc::new(backend.clone()));

    let start = tokio::time::Instant::now();
    let result = parser.parse_text(JANE, &ParseOptions::default()).await.unwrap();

    assert_eq!(result.model, "gemini-1.5-pro");
    assert_eq!(start.elapsed(), Duration::ZERO);
    let models: Vec<_> = backend.calls().into_iter().map(|c| c.model).collect();
    assert_eq!(models, ["gemini-2.0-flash", "gemini-1.5-flash", "gemini-1.5-pro"]);
}

#[tokio::test]
async fn retry_recovers_from_unparseable_reply() {
    let backend = ScriptedBackend::new()
        .reply("I am unable to help with that.")
        .reply(JANE_REPLY);
    let opts = ParseOptions {
        model: Some("gpt-4o-mini".into()),
        ..Default::default()
    };
    let result = parser_with(ProviderKind::OpenAi, &backend)
        .parse_text(JANE, &opts)
        .await
        .unwrap();
    assert_eq!(result.attempts, 2);
}

#[tokio::test]
async fn disabled_retry_surfaces_raw_response() {
    let backend = ScriptedBackend::always("no json at all");
    let opts = ParseOptions {
        model: Some("gpt-4o-mini".into()),
        retry_on_failure: Some(false),
        ..Default::default()
    };
    let err = parser_with(ProviderKind::OpenAi, &backend)
        .parse_text(JANE, &opts)
        .await
        .unwrap_err();
    assert!(matches!(err, ParserError::ResponseParse { .. }));
    assert_eq!(err.raw_response(), Some("no json at all"));
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn batch_items_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let cv = dir.path().join("jane.txt");
    std::fs::write(&cv, JANE).unwrap();

    let backend = ScriptedBackend::always(JANE_REPLY);
    let parser = parser_with(ProviderKind::Groq, &backend).with_schema(minimal_schema().clone());
    let sources = vec![
        DocumentSource::path(&cv),
        DocumentSource::path(dir.path().join("missing.pdf")),
        DocumentSource::buffer(JANE, None),
    ];

    let report = parser.parse_batch(&sources, &ParseOptions::default()).await;

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.successful, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.success_rate, 0.67);
    assert!(report.items[0].is_success());
    assert_eq!(
        report.items[1].error.as_ref().map(|e| e.kind),
        Some(ErrorKind::DocumentExtraction)
    );
    assert!(report.items[2].is_success());
    assert_eq!(report.items[0].result.as_ref().unwrap().data["metadata"]["wordCount"], 7);
    // Minimal schema has no experience section
    assert!(report.items[0].result.as_ref().unwrap().data.get("experience").is_none());
}

#[tokio::test]
async fn full_prompt_enumerates_schema() {
    let backend = ScriptedBackend::always(JANE_REPLY);
    let opts = ParseOptions {
        parsing_level: Some(LevelSetting::Full),
        ..Default::default()
    };
    let result = parser_with(ProviderKind::Gemini, &backend)
        .parse_text(JANE, &opts)
        .await
        .unwrap();
    assert!(backend.calls()[0].prompt.contains("- experience[].company (string, REQUIRED)"));
    assert_eq!(result.prompt_info.level, None);
    assert_eq!(result.data["metadata"]["parsingLevel"], "full");
}

/// Hands back fixed text for any source, whatever its format.
struct FixedTextExtractor(&'static str);

#[async_trait::async_trait]
impl DocumentExtractor for FixedTextExtractor {
    async fn extract(&self, _source: &DocumentSource) -> Result<ExtractedDocument, ParserError> {
        Ok(ExtractedDocument::from_text(self.0))
    }
}

#[tokio::test]
async fn custom_extractor_registry_and_keywords_only_metadata() {
    let mut registry = FieldTypeRegistry::new();
    let email = registry.handler(FieldType::Email);
    registry.register(
        FieldType::Email,
        FieldHandler {
            validate: email.validate,
            normalize: |value| Ok(json!(value.as_str().unwrap_or_default().to_uppercase())),
        },
    );

    let backend = ScriptedBackend::always(JANE_REPLY);
    let parser = parser_with(ProviderKind::Gemini, &backend)
        .with_registry(registry)
        .with_extractor(Arc::new(FixedTextExtractor(JANE)));
    let opts = ParseOptions {
        include_metadata: Some(false),
        include_keywords: Some(true),
        ..Default::default()
    };

    // The default extractor would reject an .odt file outright
    let result = parser
        .parse(&DocumentSource::path("resume.odt"), &opts)
        .await
        .unwrap();

    assert!(backend.calls()[0].prompt.contains("Skills: Python, SQL"));
    assert_eq!(result.data["personal"]["email"], "JANE@X.COM");

    let metadata = result.data["metadata"].as_object().unwrap();
    assert_eq!(metadata.len(), 1);
    let keywords = metadata["keywords"].as_array().unwrap();
    assert!(keywords.contains(&json!("python")));
    assert!(keywords.contains(&json!("sql")));
}
