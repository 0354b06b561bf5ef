//! Text Compressor — bounds how much document text reaches the LLM.
//!
//! Truncation is a hard character cut with no sentence awareness. Downstream
//! quality comparisons between levels depend on exactly this behavior.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Named tier trading extraction completeness against token cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ParsingLevel {
    Low,
    #[default]
    Moderate,
    High,
    Ultra,
}

impl ParsingLevel {
    /// Unrecognized names resolve to `Moderate`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => ParsingLevel::Low,
            "moderate" => ParsingLevel::Moderate,
            "high" => ParsingLevel::High,
            "ultra" => ParsingLevel::Ultra,
            _ => ParsingLevel::Moderate,
        }
    }

    /// Character budget for the compressed text. `None` means unbounded.
    pub fn max_chars(&self) -> Option<usize> {
        match self {
            ParsingLevel::Low => Some(2000),
            ParsingLevel::Moderate => Some(3500),
            ParsingLevel::High => Some(5000),
            ParsingLevel::Ultra => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParsingLevel::Low => "low",
            ParsingLevel::Moderate => "moderate",
            ParsingLevel::High => "high",
            ParsingLevel::Ultra => "ultra",
        }
    }
}

impl From<String> for ParsingLevel {
    fn from(name: String) -> Self {
        ParsingLevel::from_name(&name)
    }
}

impl fmt::Display for ParsingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics for one prompt build. Returned alongside every provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInfo {
    /// `None` when the full, level-less prompt was used.
    pub level: Option<ParsingLevel>,
    pub original_text_length: usize,
    pub compressed_text_length: usize,
    pub prompt_length: usize,
    pub estimated_tokens: usize,
    pub compression_ratio: f64,
}

impl PromptInfo {
    pub fn new(
        level: Option<ParsingLevel>,
        original_text_length: usize,
        compressed_text_length: usize,
        prompt_length: usize,
    ) -> Self {
        let compression_ratio = if original_text_length == 0 {
            1.0
        } else {
            compressed_text_length as f64 / original_text_length as f64
        };
        Self {
            level,
            original_text_length,
            compressed_text_length,
            prompt_length,
            estimated_tokens: estimate_tokens(prompt_length),
            compression_ratio,
        }
    }
}

/// Rough token estimate: four characters per token, rounded up.
pub fn estimate_tokens(chars: usize) -> usize {
    chars.div_ceil(4)
}

static PAGE_FOOTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpage\s+\d+\s+of\s+\d+\b").unwrap());
static REFERENCES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)references\s+(?:are\s+)?available\s+(?:up)?on\s+request\.?").unwrap()
});
static HORIZONTAL_WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}\f\r\v]+").unwrap());
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Collapses horizontal whitespace, trims every line and squeezes runs of blank
/// lines down to one. Single line breaks survive.
pub fn collapse_whitespace(text: &str) -> String {
    let lines: Vec<String> = text
        .split('\n')
        .map(|line| HORIZONTAL_WS_RE.replace_all(line, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");
    BLANK_LINES_RE
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

/// Removes page footers and boilerplate that carry no CV data.
pub fn strip_noise(text: &str) -> String {
    let text = PAGE_FOOTER_RE.replace_all(text, "");
    REFERENCES_RE.replace_all(&text, "").into_owned()
}

pub fn compress(text: &str, level: ParsingLevel) -> String {
    let cleaned = collapse_whitespace(&strip_noise(text));
    let Some(max) = level.max_chars() else {
        return cleaned;
    };
    if cleaned.chars().count() <= max {
        cleaned
    } else {
        cleaned.chars().take(max).collect()
    }
}
