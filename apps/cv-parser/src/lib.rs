//! Adaptive CV/resume extraction over pluggable LLM providers.
//!
//! ```text
//! document ─► compress ─► prompt ─► provider (model fallback) ─► parse
//!          ◄─ retry ◄──────────────────────────────────────────────┘
//!          ─► validate/normalize ─► post-normalize ─► metadata/keywords
//! ```
//!
//! `CvParser` is the entry point; everything else is usable on its own.

pub mod adapter;
pub mod cli;
pub mod compress;
pub mod confidence;
pub mod config;
pub mod document;
pub mod errors;
pub mod keywords;
pub mod llm_client;
pub mod normalize;
pub mod parser;
pub mod prompts;
pub mod response_parser;
pub mod schema;
pub mod validation;

pub use adapter::{ProcessOutcome, ProviderAdapter};
pub use compress::{compress, ParsingLevel, PromptInfo};
pub use config::{Config, LevelSetting, ParseOptions, ResolvedOptions};
pub use document::{DefaultExtractor, DocumentExtractor, DocumentSource, ExtractedDocument, FileType};
pub use errors::{ErrorKind, ParserError};
pub use llm_client::{list_available_providers, CompletionBackend, ProviderKind};
pub use parser::{BatchReport, CvParser, ParseResult};
pub use response_parser::{parse_llm_response, Extraction};
pub use schema::{FieldSpec, FieldType, Schema, SchemaPreset};
pub use validation::{SchemaValidator, ValidationIssue, ValidationReport};
