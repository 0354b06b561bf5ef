//! Response Parser — recovers the JSON object from raw LLM text.
//!
//! Best-effort only: strips code fences and surrounding prose, then hands the
//! remaining span to a strict JSON parse. Truncated JSON, trailing commas and
//! unbalanced braces are reported as failures, never repaired.

use serde_json::Value;

use crate::confidence::provider_confidence;

/// Outcome of parsing one LLM reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Parsed {
        data: Value,
        confidence: f64,
    },
    /// The raw reply is kept verbatim for offline diagnosis.
    Unparseable {
        error: String,
        raw_response: String,
    },
}

impl Extraction {
    pub fn is_success(&self) -> bool {
        matches!(self, Extraction::Parsed { .. })
    }
}

fn slice_braces(s: &str) -> &str {
    let mut s = s;
    if let Some(start) = s.find('{') {
        if start > 0 {
            s = &s[start..];
        }
    }
    if let Some(end) = s.rfind('}') {
        if end > 0 {
            s = &s[..=end];
        }
    }
    s
}

/// Applies the recovery steps in order: trim, strip fences, cut before the first
/// `{`, cut after the last `}`, strict parse.
pub fn clean_response(raw: &str) -> String {
    let without_fences = raw.trim().replace("```json", "").replace("```", "");
    slice_braces(&without_fences).to_string()
}

pub fn parse_llm_response(raw: &str) -> Extraction {
    let candidate = clean_response(raw);
    match serde_json::from_str::<Value>(&candidate) {
        Ok(data @ Value::Object(_)) => {
            let confidence = provider_confidence(&data);
            Extraction::Parsed { data, confidence }
        }
        Ok(_) => Extraction::Unparseable {
            error: "expected a JSON object".to_string(),
            raw_response: raw.to_string(),
        },
        Err(e) => Extraction::Unparseable {
            error: e.to_string(),
            raw_response: raw.to_string(),
        },
    }
}
