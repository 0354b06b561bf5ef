//! Schema Registry — declarative description of the fields we ask the LLM for
//! and later validate against.
//!
//! A `Schema` is an ordered list of named `FieldSpec`s. Object and array fields may
//! carry a nested schema, which yields dotted paths such as `personal.email` or
//! `experience[].company`. Schemas are immutable once built; the presets below are
//! plain instances built once per process.

pub mod field_types;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub use field_types::{FieldHandler, FieldTypeRegistry};

/// Closed set of semantic field kinds. Each leaf kind is bound to a validator
/// and normalizer in the `FieldTypeRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Email,
    Phone,
    Url,
    Date,
    Number,
    Boolean,
    Array,
    Object,
    Name,
    Address,
    SkillList,
    Experience,
    Education,
    Language,
    Certification,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Url => "url",
            FieldType::Date => "date",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Name => "name",
            FieldType::Address => "address",
            FieldType::SkillList => "skill_list",
            FieldType::Experience => "experience",
            FieldType::Education => "education",
            FieldType::Language => "language",
            FieldType::Certification => "certification",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Schema>,
}

impl FieldSpec {
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
            fields: None,
        }
    }

    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            fields: None,
        }
    }

    pub fn with_fields(mut self, fields: Schema) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// One flattened entry of a schema, as enumerated in prompts.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPath {
    pub path: String,
    pub field_type: FieldType,
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<(String, FieldSpec)>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flattens the schema depth-first. Array items are addressed as `name[]`.
    pub fn field_paths(&self) -> Vec<FieldPath> {
        let mut out = Vec::new();
        collect_paths(self, "", &mut out);
        out
    }

    /// Loads a custom schema from its JSON form:
    /// `{"name": {"type": "...", "required": bool, "fields": {...}}}`.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn collect_paths(schema: &Schema, prefix: &str, out: &mut Vec<FieldPath>) {
    for (name, spec) in schema.iter() {
        let path = format!("{prefix}{name}");
        out.push(FieldPath {
            path: path.clone(),
            field_type: spec.field_type,
            required: spec.required,
        });
        if let Some(nested) = &spec.fields {
            let child_prefix = match spec.field_type {
                FieldType::Array => format!("{path}[]."),
                _ => format!("{path}."),
            };
            collect_paths(nested, &child_prefix, out);
        }
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, spec) in &self.fields {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let mut fields = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            let spec: FieldSpec = serde_json::from_value(value)
                .map_err(|e| D::Error::custom(format!("field '{name}': {e}")))?;
            fields.push((name, spec));
        }
        Ok(Schema { fields })
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<(String, FieldSpec)>,
}

impl SchemaBuilder {
    /// Adds a field. A later field with the same name replaces the earlier one
    /// in place.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = spec,
            None => self.fields.push((name, spec)),
        }
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            fields: self.fields,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Presets
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPreset {
    #[default]
    Default,
    Minimal,
    Ats,
}

impl SchemaPreset {
    pub fn schema(&self) -> &'static Schema {
        match self {
            SchemaPreset::Default => default_schema(),
            SchemaPreset::Minimal => minimal_schema(),
            SchemaPreset::Ats => ats_schema(),
        }
    }
}

impl FromStr for SchemaPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(SchemaPreset::Default),
            "minimal" => Ok(SchemaPreset::Minimal),
            "ats" => Ok(SchemaPreset::Ats),
            other => Err(format!("unknown schema preset '{other}'")),
        }
    }
}

static DEFAULT_SCHEMA: Lazy<Schema> = Lazy::new(build_default_schema);
static MINIMAL_SCHEMA: Lazy<Schema> = Lazy::new(build_minimal_schema);
static ATS_SCHEMA: Lazy<Schema> = Lazy::new(build_ats_schema);

/// Full CV schema: contact details, history, skills, certifications, projects.
pub fn default_schema() -> &'static Schema {
    &DEFAULT_SCHEMA
}

/// Contact details and skills only.
pub fn minimal_schema() -> &'static Schema {
    &MINIMAL_SCHEMA
}

/// Applicant-tracking oriented schema. Stricter on the fields ATS systems key on.
pub fn ats_schema() -> &'static Schema {
    &ATS_SCHEMA
}

fn opt(field_type: FieldType) -> FieldSpec {
    FieldSpec::optional(field_type)
}

fn req(field_type: FieldType) -> FieldSpec {
    FieldSpec::required(field_type)
}

fn personal_schema() -> Schema {
    Schema::builder()
        .field("fullName", req(FieldType::Name))
        .field("email", opt(FieldType::Email))
        .field("phone", opt(FieldType::Phone))
        .field("location", opt(FieldType::Address))
        .field("linkedin", opt(FieldType::Url))
        .field("github", opt(FieldType::Url))
        .field("website", opt(FieldType::Url))
        .build()
}

fn experience_item_schema(strict: bool) -> Schema {
    let position = if strict {
        req(FieldType::String)
    } else {
        opt(FieldType::String)
    };
    Schema::builder()
        .field("company", req(FieldType::String))
        .field("position", position)
        .field("location", opt(FieldType::Address))
        .field("startDate", opt(FieldType::Date))
        .field("endDate", opt(FieldType::Date))
        .field("current", opt(FieldType::Boolean))
        .field("description", opt(FieldType::String))
        .field("achievements", opt(FieldType::Array))
        .field("technologies", opt(FieldType::SkillList))
        .build()
}

fn education_item_schema() -> Schema {
    Schema::builder()
        .field("institution", req(FieldType::String))
        .field("degree", opt(FieldType::String))
        .field("field", opt(FieldType::String))
        .field("startDate", opt(FieldType::Date))
        .field("endDate", opt(FieldType::Date))
        .field("gpa", opt(FieldType::Number))
        .field("honors", opt(FieldType::Array))
        .build()
}

fn skills_schema(with_languages: bool) -> Schema {
    let builder = Schema::builder()
        .field("technical", opt(FieldType::SkillList))
        .field("soft", opt(FieldType::SkillList));
    if !with_languages {
        return builder.build();
    }
    builder
        .field("tools", opt(FieldType::SkillList))
        .field(
            "languages",
            opt(FieldType::Array).with_fields(
                Schema::builder()
                    .field("language", req(FieldType::Language))
                    .field("proficiency", opt(FieldType::String))
                    .build(),
            ),
        )
        .build()
}

fn certification_item_schema() -> Schema {
    Schema::builder()
        .field("name", req(FieldType::Certification))
        .field("issuer", opt(FieldType::String))
        .field("date", opt(FieldType::Date))
        .field("expiryDate", opt(FieldType::Date))
        .field("credentialId", opt(FieldType::String))
        .field("url", opt(FieldType::Url))
        .build()
}

fn project_item_schema() -> Schema {
    Schema::builder()
        .field("name", req(FieldType::String))
        .field("description", opt(FieldType::String))
        .field("technologies", opt(FieldType::SkillList))
        .field("url", opt(FieldType::Url))
        .field("startDate", opt(FieldType::Date))
        .field("endDate", opt(FieldType::Date))
        .build()
}

fn build_default_schema() -> Schema {
    Schema::builder()
        .field(
            "personal",
            req(FieldType::Object).with_fields(personal_schema()),
        )
        .field("summary", opt(FieldType::String))
        .field(
            "experience",
            opt(FieldType::Array).with_fields(experience_item_schema(false)),
        )
        .field(
            "education",
            opt(FieldType::Array).with_fields(education_item_schema()),
        )
        .field("skills", opt(FieldType::Object).with_fields(skills_schema(true)))
        .field(
            "certifications",
            opt(FieldType::Array).with_fields(certification_item_schema()),
        )
        .field(
            "projects",
            opt(FieldType::Array).with_fields(project_item_schema()),
        )
        .build()
}

fn build_minimal_schema() -> Schema {
    Schema::builder()
        .field(
            "personal",
            req(FieldType::Object).with_fields(
                Schema::builder()
                    .field("fullName", req(FieldType::Name))
                    .field("email", opt(FieldType::Email))
                    .field("phone", opt(FieldType::Phone))
                    .build(),
            ),
        )
        .field(
            "skills",
            opt(FieldType::Object).with_fields(skills_schema(false)),
        )
        .build()
}

fn build_ats_schema() -> Schema {
    Schema::builder()
        .field(
            "personal",
            req(FieldType::Object).with_fields(
                Schema::builder()
                    .field("fullName", req(FieldType::Name))
                    .field("email", req(FieldType::Email))
                    .field("phone", req(FieldType::Phone))
                    .field("location", opt(FieldType::Address))
                    .field("linkedin", opt(FieldType::Url))
                    .build(),
            ),
        )
        .field("summary", opt(FieldType::String))
        .field(
            "experience",
            req(FieldType::Array).with_fields(experience_item_schema(true)),
        )
        .field(
            "education",
            opt(FieldType::Array).with_fields(education_item_schema()),
        )
        .field("skills", req(FieldType::Object).with_fields(skills_schema(false)))
        .field(
            "certifications",
            opt(FieldType::Array).with_fields(certification_item_schema()),
        )
        .build()
}
