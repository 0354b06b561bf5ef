//! Per-vendor wire formats.
//!
//! Each binding turns a prompt into an HTTP request and pulls the single
//! completion string back out of the response envelope. Bindings are gated by
//! cargo feature; `binding_for` returns `None` for a provider compiled out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CompletionSettings, LlmError, ProviderKind};

/// A ready-to-send request. Headers are in addition to `content-type`.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

pub trait ProviderBinding: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn build_request(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<ProviderRequest, LlmError>;

    fn extract_completion(&self, body: &str) -> Result<String, LlmError>;

    /// Best-effort human message from an error body. All four vendors use
    /// `{"error": {"message": ...}}`; anything else is returned verbatim.
    fn error_message(&self, body: &str) -> String {
        serde_json::from_str::<ErrorEnvelope>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn non_empty(text: Option<String>) -> Result<String, LlmError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(LlmError::EmptyContent),
    }
}

pub fn binding_for(kind: ProviderKind) -> Option<Box<dyn ProviderBinding>> {
    match kind {
        #[cfg(feature = "gemini")]
        ProviderKind::Gemini => Some(Box::new(GeminiBinding)),
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => Some(Box::new(OpenAiBinding)),
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => Some(Box::new(AnthropicBinding)),
        #[cfg(feature = "groq")]
        ProviderKind::Groq => Some(Box::new(GroqBinding)),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini
// ────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "gemini")]
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[cfg(feature = "gemini")]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiReplyContent>,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[cfg(feature = "gemini")]
#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    text: Option<String>,
}

#[cfg(feature = "gemini")]
pub struct GeminiBinding;

#[cfg(feature = "gemini")]
impl ProviderBinding for GeminiBinding {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn build_request(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<ProviderRequest, LlmError> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: settings.temperature,
                max_output_tokens: settings.max_tokens,
            },
        };
        Ok(ProviderRequest {
            url: format!("{GEMINI_API_BASE}/{model}:generateContent"),
            headers: vec![("x-goog-api-key", api_key.to_string())],
            body: serde_json::to_value(&body)?,
        })
    }

    fn extract_completion(&self, body: &str) -> Result<String, LlmError> {
        let response: GeminiResponse = serde_json::from_str(body)?;
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text);
        non_empty(text)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible chat (OpenAI, Groq)
// ────────────────────────────────────────────────────────────────────────────

#[cfg(any(feature = "openai", feature = "groq"))]
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[cfg(any(feature = "openai", feature = "groq"))]
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[cfg(any(feature = "openai", feature = "groq"))]
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[cfg(any(feature = "openai", feature = "groq"))]
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[cfg(any(feature = "openai", feature = "groq"))]
#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[cfg(any(feature = "openai", feature = "groq"))]
fn chat_request(
    url: &str,
    api_key: &str,
    model: &str,
    prompt: &str,
    settings: &CompletionSettings,
) -> Result<ProviderRequest, LlmError> {
    let body = ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: &settings.system,
            },
            ChatMessage {
                role: "user",
                content: prompt,
            },
        ],
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    };
    Ok(ProviderRequest {
        url: url.to_string(),
        headers: vec![("authorization", format!("Bearer {api_key}"))],
        body: serde_json::to_value(&body)?,
    })
}

#[cfg(any(feature = "openai", feature = "groq"))]
fn chat_completion(body: &str) -> Result<String, LlmError> {
    let response: ChatResponse = serde_json::from_str(body)?;
    non_empty(
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content),
    )
}

#[cfg(feature = "openai")]
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[cfg(feature = "openai")]
pub struct OpenAiBinding;

#[cfg(feature = "openai")]
impl ProviderBinding for OpenAiBinding {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn build_request(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<ProviderRequest, LlmError> {
        chat_request(OPENAI_API_URL, api_key, model, prompt, settings)
    }

    fn extract_completion(&self, body: &str) -> Result<String, LlmError> {
        chat_completion(body)
    }
}

#[cfg(feature = "groq")]
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

#[cfg(feature = "groq")]
pub struct GroqBinding;

#[cfg(feature = "groq")]
impl ProviderBinding for GroqBinding {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }

    fn build_request(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<ProviderRequest, LlmError> {
        chat_request(GROQ_API_URL, api_key, model, prompt, settings)
    }

    fn extract_completion(&self, body: &str) -> Result<String, LlmError> {
        chat_completion(body)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Anthropic
// ────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "anthropic")]
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
#[cfg(feature = "anthropic")]
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[cfg(feature = "anthropic")]
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[cfg(feature = "anthropic")]
#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[cfg(feature = "anthropic")]
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[cfg(feature = "anthropic")]
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[cfg(feature = "anthropic")]
pub struct AnthropicBinding;

#[cfg(feature = "anthropic")]
impl ProviderBinding for AnthropicBinding {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn build_request(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<ProviderRequest, LlmError> {
        let body = AnthropicRequest {
            model,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            system: &settings.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };
        Ok(ProviderRequest {
            url: ANTHROPIC_API_URL.to_string(),
            headers: vec![
                ("x-api-key", api_key.to_string()),
                ("anthropic-version", ANTHROPIC_VERSION.to_string()),
            ],
            body: serde_json::to_value(&body)?,
        })
    }

    fn extract_completion(&self, body: &str) -> Result<String, LlmError> {
        let response: AnthropicResponse = serde_json::from_str(body)?;
        let text = response
            .content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text);
        non_empty(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(kind: ProviderKind) -> Box<dyn ProviderBinding> {
        binding_for(kind).expect("provider compiled in")
    }

    #[test]
    fn test_gemini_request_shape() {
        let req = binding(ProviderKind::Gemini)
            .build_request("k", "gemini-1.5-flash", "PROMPT", &CompletionSettings::default())
            .unwrap();
        assert!(req.url.ends_with("/gemini-1.5-flash:generateContent"));
        assert_eq!(req.headers, vec![("x-goog-api-key", "k".to_string())]);
        assert_eq!(req.body["contents"][0]["parts"][0]["text"], "PROMPT");
        assert_eq!(req.body["generationConfig"]["maxOutputTokens"], 4000);
        assert!(req.body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_gemini_extracts_first_candidate() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":1}"}]}}]}"#;
        let text = binding(ProviderKind::Gemini).extract_completion(body).unwrap();
        assert_eq!(text, "{\"a\":1}");
    }

    #[test]
    fn test_chat_providers_send_system_instruction() {
        for (kind, url) in [
            (ProviderKind::OpenAi, "https://api.openai.com/v1/chat/completions"),
            (ProviderKind::Groq, "https://api.groq.com/openai/v1/chat/completions"),
        ] {
            let req = binding(kind)
                .build_request("sk", "m", "PROMPT", &CompletionSettings::default())
                .unwrap();
            assert_eq!(req.url, url);
            assert_eq!(req.headers[0].1, "Bearer sk");
            assert_eq!(req.body["messages"][0]["role"], "system");
            assert_eq!(
                req.body["messages"][0]["content"],
                "Extract CV data and return valid JSON only"
            );
            assert_eq!(req.body["messages"][1]["content"], "PROMPT");
            assert_eq!(req.body["max_tokens"], 4000);
        }
    }

    #[test]
    fn test_openai_extracts_message_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(
            binding(ProviderKind::OpenAi).extract_completion(body).unwrap(),
            "hello"
        );
        let empty = r#"{"choices":[]}"#;
        assert!(matches!(
            binding(ProviderKind::OpenAi).extract_completion(empty),
            Err(LlmError::EmptyContent)
        ));
    }

    #[test]
    fn test_anthropic_request_and_reply() {
        let b = binding(ProviderKind::Anthropic);
        let req = b
            .build_request("key", "claude-sonnet-4-5", "PROMPT", &CompletionSettings::default())
            .unwrap();
        assert!(req.headers.contains(&("anthropic-version", "2023-06-01".to_string())));
        assert_eq!(req.body["system"], "Extract CV data and return valid JSON only");

        let body = r#"{"content":[{"type":"thinking"},{"type":"text","text":"{}"}]}"#;
        assert_eq!(b.extract_completion(body).unwrap(), "{}");
    }

    #[test]
    fn test_error_message_from_envelope() {
        let b = binding(ProviderKind::OpenAi);
        assert_eq!(
            b.error_message(r#"{"error":{"message":"model not found","type":"x"}}"#),
            "model not found"
        );
        assert_eq!(b.error_message("Bad Gateway"), "Bad Gateway");
    }
}
