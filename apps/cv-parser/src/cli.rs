//! Command-line definitions for the `cv-parser` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{LevelSetting, ParseOptions};
use crate::llm_client::ProviderKind;
use crate::schema::SchemaPreset;

/// Extract structured data from CVs and resumes with an LLM.
#[derive(Debug, Parser)]
#[command(name = "cv-parser")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse one or more documents (PDF, DOCX, TXT, MD) and print JSON
    Parse(ParseArgs),

    /// List providers compiled into this build and whether a key is configured
    Providers,
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Documents to parse
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// LLM provider (gemini, openai, anthropic, groq)
    #[arg(short, long, value_parser = parse_provider)]
    pub provider: Option<ProviderKind>,

    /// Pin a single model instead of the provider's fallback list
    #[arg(short, long)]
    pub model: Option<String>,

    /// Parsing level: low, moderate, high, ultra or full
    #[arg(short, long)]
    pub level: Option<LevelSetting>,

    /// Built-in schema preset (default, minimal, ats)
    #[arg(long, default_value = "default", conflicts_with = "schema_file")]
    pub schema: SchemaPreset,

    /// JSON schema file of the form {"field": {"type": ..., "required": ...}}
    #[arg(long)]
    pub schema_file: Option<PathBuf>,

    /// Fail when required fields are missing
    #[arg(long)]
    pub strict: bool,

    /// Skip schema validation and normalization
    #[arg(long)]
    pub no_validate: bool,

    /// Omit metadata and keywords from the output
    #[arg(long)]
    pub no_metadata: bool,

    /// Warn when overall confidence falls below this value (0-1)
    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Extra attempts after a failed provider call or unparseable reply
    #[arg(long)]
    pub retries: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Abort a single document after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Enumerate the full schema even for low/moderate levels
    #[arg(long)]
    pub full_schema: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

impl ParseArgs {
    /// Options layer contributed by command-line flags. Unset flags stay `None`
    /// so environment and built-in defaults still apply.
    pub fn to_options(&self) -> ParseOptions {
        let off = |flag: bool| if flag { Some(false) } else { None };
        ParseOptions {
            provider: self.provider,
            model: self.model.clone(),
            parsing_level: self.level,
            include_metadata: off(self.no_metadata),
            include_keywords: off(self.no_metadata),
            validate_data: off(self.no_validate),
            normalize_data: off(self.no_validate),
            strict_validation: self.strict.then_some(true),
            confidence_threshold: self.min_confidence,
            retry_on_failure: None,
            max_retries: self.retries,
            temperature: self.temperature,
            timeout_ms: self.timeout.map(|s| s * 1000),
            max_keywords: None,
            full_schema_prompts: self.full_schema.then_some(true),
        }
    }
}

fn parse_provider(s: &str) -> Result<ProviderKind, String> {
    s.parse::<ProviderKind>().map_err(|e| e.to_string())
}
