//! Prompt Builder — renders a schema and document text into the extraction prompt.
//!
//! Two tiers: without a parsing level the full schema is enumerated next to the
//! untouched text. With a level the text is compressed first, and `low` /
//! `moderate` swap the schema enumeration for a shorter canned field list.

use crate::compress::{compress, ParsingLevel, PromptInfo};
use crate::schema::Schema;

const PROMPT_HEADER: &str =
    "Extract structured information from the CV/resume below and return it as a single JSON object.";

/// Fixed extraction rules shared by every prompt tier.
pub const EXTRACTION_INSTRUCTIONS: [&str; 10] = [
    "Return ONLY valid JSON. No markdown, no code fences, no commentary before or after the object.",
    "Use null for any optional field that is not present in the CV. Never invent values.",
    "Write dates in ISO format (YYYY-MM-DD). Use YYYY-MM-01 when only month and year are known, YYYY-01-01 when only the year is known.",
    "For a position that is still ongoing set endDate to \"Present\" and current to true.",
    "List experience and education entries in reverse chronological order, most recent first.",
    "Split skills into technical skills (languages, frameworks, tools) and soft skills (communication, leadership, ...).",
    "Locate the professional summary even when it has no explicit heading: it is usually the short descriptive paragraph near the top, after the contact details, and may be labelled Profile, About Me or Objective.",
    "Keep the candidate's original wording for descriptions and achievements; do not summarize or embellish.",
    "Copy email addresses, phone numbers and URLs exactly as written.",
    "Use an empty array [] for list sections that do not appear in the CV.",
];

/// Canned field list for `ParsingLevel::Low`.
pub const LOW_LEVEL_FIELDS: &str = "\
- personal.fullName (name, REQUIRED)
- personal.email (email, OPTIONAL)
- personal.phone (phone, OPTIONAL)
- skills.technical (skill_list, OPTIONAL)
- skills.soft (skill_list, OPTIONAL)";

/// Canned field list for `ParsingLevel::Moderate`.
pub const MODERATE_LEVEL_FIELDS: &str = "\
- personal: fullName (REQUIRED), email, phone, location, linkedin
- experience[]: company, position, startDate, endDate, current, description
- education[]: institution, degree, field, startDate, endDate
- skills: technical[], soft[]";

pub const PROMPT_FOOTER: &str = "Return only the JSON object.";

/// A rendered prompt together with its size diagnostics.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub prompt: String,
    pub info: PromptInfo,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    canned_field_lists: bool,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            canned_field_lists: true,
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// When disabled, `low` and `moderate` enumerate the full schema like the
    /// other levels.
    pub fn with_canned_field_lists(mut self, enabled: bool) -> Self {
        self.canned_field_lists = enabled;
        self
    }

    pub fn build(&self, text: &str, schema: &Schema, level: Option<ParsingLevel>) -> String {
        self.build_with_info(text, schema, level).prompt
    }

    pub fn build_with_info(
        &self,
        text: &str,
        schema: &Schema,
        level: Option<ParsingLevel>,
    ) -> BuiltPrompt {
        let original_len = text.chars().count();
        let (body_text, manifest) = match level {
            None => (text.to_string(), render_field_manifest(schema)),
            Some(level) => {
                let manifest = match (self.canned_field_lists, level) {
                    (true, ParsingLevel::Low) => LOW_LEVEL_FIELDS.to_string(),
                    (true, ParsingLevel::Moderate) => MODERATE_LEVEL_FIELDS.to_string(),
                    _ => render_field_manifest(schema),
                };
                (compress(text, level), manifest)
            }
        };

        let prompt = render(&manifest, &body_text);
        let info = PromptInfo::new(
            level,
            original_len,
            body_text.chars().count(),
            prompt.chars().count(),
        );
        BuiltPrompt { prompt, info }
    }
}

/// One line per schema path: `- path (type, REQUIRED|OPTIONAL)`.
pub fn render_field_manifest(schema: &Schema) -> String {
    schema
        .field_paths()
        .iter()
        .map(|p| {
            let tag = if p.required { "REQUIRED" } else { "OPTIONAL" };
            format!("- {} ({}, {})", p.path, p.field_type, tag)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render(manifest: &str, text: &str) -> String {
    let instructions = EXTRACTION_INSTRUCTIONS
        .iter()
        .enumerate()
        .map(|(i, rule)| format!("{}. {}", i + 1, rule))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{PROMPT_HEADER}\n\nFIELDS TO EXTRACT:\n{manifest}\n\nINSTRUCTIONS:\n{instructions}\n\nCV TEXT:\n{text}\n\n{PROMPT_FOOTER}"
    )
}

/// Convenience wrapper using the default builder.
pub fn build_prompt(text: &str, schema: &Schema, level: Option<ParsingLevel>) -> String {
    PromptBuilder::default().build(text, schema, level)
}
