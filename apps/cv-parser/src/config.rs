use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::compress::ParsingLevel;
use crate::errors::ParserError;
use crate::keywords::DEFAULT_MAX_KEYWORDS;
use crate::llm_client::{ProviderKind, DEFAULT_TEMPERATURE};

// ────────────────────────────────────────────────────────────────────────────
// Environment configuration
// ────────────────────────────────────────────────────────────────────────────

/// Process configuration loaded from environment variables (and `.env`).
/// No key is strictly required here; a missing key only fails once the
/// matching provider is actually selected.
#[derive(Clone)]
pub struct Config {
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub parsing_level: Option<LevelSetting>,
    pub rust_log: String,
    api_keys: HashMap<ProviderKind, String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.api_keys.keys().map(ProviderKind::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("parsing_level", &self.parsing_level)
            .field("rust_log", &self.rust_log)
            .field("api_keys_for", &keys)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("CV_PARSER_PROVIDER") {
            Some(name) => name
                .parse::<ProviderKind>()
                .with_context(|| "CV_PARSER_PROVIDER must name a supported provider")?,
            None => ProviderKind::Gemini,
        };

        let api_keys = ProviderKind::ALL
            .into_iter()
            .filter_map(|kind| {
                kind.api_key_env()
                    .iter()
                    .find_map(|var| get(*var))
                    .map(|key| (kind, key))
            })
            .collect();

        Ok(Config {
            provider,
            model: get("CV_PARSER_MODEL"),
            parsing_level: get("CV_PARSER_LEVEL").map(LevelSetting::from),
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            api_keys,
        })
    }

    /// Config with explicit keys and nothing read from the environment.
    pub fn with_keys(provider: ProviderKind, keys: impl IntoIterator<Item = (ProviderKind, String)>) -> Self {
        Config {
            provider,
            model: None,
            parsing_level: None,
            rust_log: "info".to_string(),
            api_keys: keys.into_iter().collect(),
        }
    }

    pub fn api_key(&self, provider: ProviderKind) -> Option<&str> {
        self.api_keys.get(&provider).map(String::as_str)
    }

    /// Instance-level option layer contributed by the environment.
    pub fn option_defaults(&self) -> ParseOptions {
        ParseOptions {
            provider: Some(self.provider),
            model: self.model.clone(),
            parsing_level: self.parsing_level,
            ..ParseOptions::default()
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Parse options
// ────────────────────────────────────────────────────────────────────────────

/// Either a compression tier or the uncompressed full-schema prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LevelSetting {
    Full,
    Level(ParsingLevel),
}

impl LevelSetting {
    pub fn level(&self) -> Option<ParsingLevel> {
        match self {
            LevelSetting::Full => None,
            LevelSetting::Level(level) => Some(*level),
        }
    }
}

impl From<String> for LevelSetting {
    fn from(name: String) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "full" | "none" => LevelSetting::Full,
            other => LevelSetting::Level(ParsingLevel::from_name(other)),
        }
    }
}

impl From<LevelSetting> for String {
    fn from(setting: LevelSetting) -> Self {
        setting.to_string()
    }
}

impl From<ParsingLevel> for LevelSetting {
    fn from(level: ParsingLevel) -> Self {
        LevelSetting::Level(level)
    }
}

impl FromStr for LevelSetting {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(LevelSetting::from(s.to_string()))
    }
}

impl fmt::Display for LevelSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelSetting::Full => f.write_str("full"),
            LevelSetting::Level(level) => fmt::Display::fmt(level, f),
        }
    }
}

/// One layer of parse options. Every field is optional; layers are merged with
/// `over` and turned into concrete values by `resolve`.
///
/// Precedence: per-call > per-instance > built-in default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOptions {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub parsing_level: Option<LevelSetting>,
    pub include_metadata: Option<bool>,
    pub include_keywords: Option<bool>,
    pub validate_data: Option<bool>,
    pub normalize_data: Option<bool>,
    pub strict_validation: Option<bool>,
    pub confidence_threshold: Option<f64>,
    pub retry_on_failure: Option<bool>,
    pub max_retries: Option<u32>,
    pub temperature: Option<f64>,
    /// Whole-parse deadline in milliseconds.
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
    pub max_keywords: Option<usize>,
    pub full_schema_prompts: Option<bool>,
}

macro_rules! layer {
    ($top:expr, $base:expr, $($field:ident),+ $(,)?) => {
        ParseOptions {
            $($field: $top.$field.clone().or_else(|| $base.$field.clone()),)+
        }
    };
}

impl ParseOptions {
    /// Returns `self` layered over `base`: fields set here win.
    pub fn over(&self, base: &ParseOptions) -> ParseOptions {
        layer!(
            self,
            base,
            provider,
            model,
            parsing_level,
            include_metadata,
            include_keywords,
            validate_data,
            normalize_data,
            strict_validation,
            confidence_threshold,
            retry_on_failure,
            max_retries,
            temperature,
            timeout_ms,
            max_keywords,
            full_schema_prompts,
        )
    }

    /// Fills the gaps with built-in defaults and range-checks numeric knobs.
    pub fn resolve(&self) -> Result<ResolvedOptions, ParserError> {
        let confidence_threshold = self.confidence_threshold.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ParserError::Configuration(format!(
                "confidenceThreshold must be between 0 and 1, got {confidence_threshold}"
            )));
        }
        let temperature = self.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ParserError::Configuration(format!(
                "temperature must be between 0 and 2, got {temperature}"
            )));
        }

        Ok(ResolvedOptions {
            provider: self.provider.unwrap_or(ProviderKind::Gemini),
            model: self.model.clone().filter(|m| !m.trim().is_empty()),
            parsing_level: self
                .parsing_level
                .unwrap_or(LevelSetting::Level(ParsingLevel::Moderate))
                .level(),
            include_metadata: self.include_metadata.unwrap_or(true),
            include_keywords: self.include_keywords.unwrap_or(true),
            validate_data: self.validate_data.unwrap_or(true),
            normalize_data: self.normalize_data.unwrap_or(true),
            strict_validation: self.strict_validation.unwrap_or(false),
            confidence_threshold,
            retry_on_failure: self.retry_on_failure.unwrap_or(true),
            max_retries: self.max_retries.unwrap_or(2),
            temperature,
            timeout: self.timeout_ms.map(Duration::from_millis),
            max_keywords: self.max_keywords.unwrap_or(DEFAULT_MAX_KEYWORDS),
            full_schema_prompts: self.full_schema_prompts.unwrap_or(false),
        })
    }
}

/// Fully resolved options for a single parse call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub provider: ProviderKind,
    pub model: Option<String>,
    /// `None` selects the full, uncompressed prompt.
    pub parsing_level: Option<ParsingLevel>,
    pub include_metadata: bool,
    pub include_keywords: bool,
    pub validate_data: bool,
    pub normalize_data: bool,
    pub strict_validation: bool,
    pub confidence_threshold: f64,
    pub retry_on_failure: bool,
    pub max_retries: u32,
    pub temperature: f64,
    pub timeout: Option<Duration>,
    pub max_keywords: usize,
    pub full_schema_prompts: bool,
}

impl ResolvedOptions {
    /// Attempts allowed for one parse, counting the first.
    pub fn max_attempts(&self) -> u32 {
        if self.retry_on_failure {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_builtin_defaults() {
        let r = ParseOptions::default().resolve().unwrap();
        assert_eq!(r.provider, ProviderKind::Gemini);
        assert_eq!(r.model, None);
        assert_eq!(r.parsing_level, Some(ParsingLevel::Moderate));
        assert!(r.include_metadata && r.include_keywords && r.validate_data && r.normalize_data);
        assert!(!r.strict_validation);
        assert_eq!(r.confidence_threshold, 0.5);
        assert!(r.retry_on_failure);
        assert_eq!(r.max_retries, 2);
        assert_eq!(r.max_attempts(), 3);
        assert_eq!(r.temperature, 0.1);
        assert_eq!(r.timeout, None);
        assert_eq!(r.max_keywords, 20);
        assert!(!r.full_schema_prompts);
    }

    #[test]
    fn test_per_call_overrides_instance() {
        let instance = ParseOptions {
            provider: Some(ProviderKind::OpenAi),
            max_retries: Some(5),
            strict_validation: Some(true),
            ..Default::default()
        };
        let call = ParseOptions {
            provider: Some(ProviderKind::Groq),
            strict_validation: Some(false),
            ..Default::default()
        };
        let r = call.over(&instance).resolve().unwrap();
        assert_eq!(r.provider, ProviderKind::Groq);
        assert_eq!(r.max_retries, 5);
        assert!(!r.strict_validation);
    }

    #[test]
    fn test_options_from_camel_case_json() {
        let opts: ParseOptions = serde_json::from_str(
            r#"{"provider":"claude","parsingLevel":"low","strictValidation":true,
                "confidenceThreshold":0.7,"timeout":1500,"unknownKey":1}"#,
        )
        .unwrap();
        let r = opts.resolve().unwrap();
        assert_eq!(r.provider, ProviderKind::Anthropic);
        assert_eq!(r.parsing_level, Some(ParsingLevel::Low));
        assert!(r.strict_validation);
        assert_eq!(r.timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_level_setting_names() {
        assert_eq!("full".parse::<LevelSetting>().unwrap(), LevelSetting::Full);
        assert_eq!(
            "HIGH".parse::<LevelSetting>().unwrap(),
            LevelSetting::Level(ParsingLevel::High)
        );
        assert_eq!(
            "weird".parse::<LevelSetting>().unwrap(),
            LevelSetting::Level(ParsingLevel::Moderate)
        );
        assert_eq!(LevelSetting::Full.to_string(), "full");
    }

    #[test]
    fn test_max_attempts_saturates() {
        let opts = ParseOptions {
            max_retries: Some(u32::MAX),
            ..Default::default()
        };
        assert_eq!(opts.resolve().unwrap().max_attempts(), u32::MAX);

        let no_retry = ParseOptions {
            max_retries: Some(u32::MAX),
            retry_on_failure: Some(false),
            ..Default::default()
        };
        assert_eq!(no_retry.resolve().unwrap().max_attempts(), 1);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let opts = ParseOptions {
            confidence_threshold: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(opts.resolve(), Err(ParserError::Configuration(_))));
    }

    #[test]
    fn test_config_from_lookup() {
        let cfg = Config::from_lookup(lookup(&[
            ("CV_PARSER_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-test"),
            ("GOOGLE_API_KEY", "g-key"),
            ("CV_PARSER_LEVEL", "high"),
            ("GROQ_API_KEY", "  "),
        ]))
        .unwrap();
        assert_eq!(cfg.provider, ProviderKind::OpenAi);
        assert_eq!(cfg.api_key(ProviderKind::OpenAi), Some("sk-test"));
        assert_eq!(cfg.api_key(ProviderKind::Gemini), Some("g-key"));
        assert_eq!(cfg.api_key(ProviderKind::Groq), None);
        assert_eq!(cfg.rust_log, "info");
        assert_eq!(
            cfg.option_defaults().resolve().unwrap().parsing_level,
            Some(ParsingLevel::High)
        );
        assert!(!format!("{cfg:?}").contains("sk-test"));
    }

    #[test]
    fn test_config_rejects_unknown_provider() {
        assert!(Config::from_lookup(lookup(&[("CV_PARSER_PROVIDER", "cohere")])).is_err());
    }
}
