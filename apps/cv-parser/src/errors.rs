use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::llm_client::ProviderKind;
use crate::validation::ValidationIssue;

/// Coarse classification of a parser failure.
/// Drives retry decisions and lets callers branch without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    ProviderUnavailable,
    DocumentExtraction,
    ProviderCall,
    ResponseParse,
    Validation,
    Timeout,
}

/// Library-level error type.
/// Every fallible public operation in the crate returns `Result<T, ParserError>`.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider '{0}' is not available in this build")]
    ProviderUnavailable(ProviderKind),

    #[error("Document extraction failed: {0}")]
    DocumentExtraction(String),

    #[error("LLM call to {provider} failed: {message}")]
    ProviderCall {
        provider: ProviderKind,
        model: Option<String>,
        message: String,
    },

    #[error("Could not parse LLM response: {message}")]
    ResponseParse {
        message: String,
        raw_response: String,
    },

    #[error("Validation failed: {}", format_issues(.errors))]
    Validation { errors: Vec<ValidationIssue> },

    #[error("Parsing did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Parsing failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ParserError>,
    },
}

impl ParserError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParserError::Configuration(_) => ErrorKind::Configuration,
            ParserError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            ParserError::DocumentExtraction(_) => ErrorKind::DocumentExtraction,
            ParserError::ProviderCall { .. } => ErrorKind::ProviderCall,
            ParserError::ResponseParse { .. } => ErrorKind::ResponseParse,
            ParserError::Validation { .. } => ErrorKind::Validation,
            ParserError::Timeout(_) => ErrorKind::Timeout,
            ParserError::RetriesExhausted { last, .. } => last.kind(),
        }
    }

    /// Only failures of a single LLM round-trip are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ParserError::ProviderCall { .. } | ParserError::ResponseParse { .. }
        )
    }

    /// Raw LLM output attached to the failure, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ParserError::ResponseParse { raw_response, .. } => Some(raw_response),
            ParserError::RetriesExhausted { last, .. } => last.raw_response(),
            _ => None,
        }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.path, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_error_keeps_kind_and_raw_response() {
        let err = ParserError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ParserError::ResponseParse {
                message: "expected value at line 1 column 1".to_string(),
                raw_response: "not json".to_string(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::ResponseParse);
        assert_eq!(err.raw_response(), Some("not json"));
        assert!(err.to_string().contains("expected value"));
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_retryable_kinds() {
        let call = ParserError::ProviderCall {
            provider: ProviderKind::OpenAi,
            model: None,
            message: "timeout".to_string(),
        };
        assert!(call.is_retryable());
        assert!(!ParserError::Configuration("missing key".to_string()).is_retryable());
        assert!(!ParserError::ProviderUnavailable(ProviderKind::Groq).is_retryable());
    }

    #[test]
    fn test_validation_message_lists_paths() {
        let err = ParserError::Validation {
            errors: vec![
                ValidationIssue::new("personal.fullName", "required field is missing"),
                ValidationIssue::new("experience[0].company", "required field is missing"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("personal.fullName"));
        assert!(msg.contains("experience[0].company"));
    }
}
