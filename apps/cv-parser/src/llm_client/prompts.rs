// Provider-facing prompt fragments.
// The extraction prompt itself is rendered by `crate::prompts`; this file only
// holds what every chat-style binding sends alongside it.

/// System instruction sent by chat-style providers (OpenAI, Anthropic, Groq).
/// Gemini has no system slot in the request shape used here and relies on the
/// JSON-only rules embedded in the extraction prompt.
pub const SYSTEM_INSTRUCTION: &str = "Extract CV data and return valid JSON only";
