//! Validator / Normalizer — walks a schema and a payload together.
//!
//! Errors: required fields that are missing or empty, and values a normalizer
//! could not process. Warnings: format mismatches and type coercions. Warnings
//! never block output; errors only block it when the caller asks for strict mode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{FieldSpec, FieldType, FieldTypeRegistry, Schema};

/// A single finding, addressed by dotted path (`experience[2].startDate`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub data: Value,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Default)]
struct Findings {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Findings {
    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue::new(path, message));
    }

    fn warn(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(path, message));
    }
}

/// Missing, null, blank strings, and empty collections all count as empty.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

fn child_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[derive(Debug, Clone)]
pub struct SchemaValidator {
    registry: FieldTypeRegistry,
    normalize: bool,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(FieldTypeRegistry::new())
    }
}

impl SchemaValidator {
    pub fn new(registry: FieldTypeRegistry) -> Self {
        Self {
            registry,
            normalize: true,
        }
    }

    /// With normalization off, values are validated and copied unchanged.
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn validate(&self, data: &Value, schema: &Schema) -> ValidationReport {
        let mut findings = Findings::default();
        let data = match data {
            Value::Object(obj) => Value::Object(self.walk_object(schema, obj, "", &mut findings)),
            other => {
                findings.error("", "expected a JSON object at the top level");
                other.clone()
            }
        };
        ValidationReport {
            is_valid: findings.errors.is_empty(),
            data,
            errors: findings.errors,
            warnings: findings.warnings,
        }
    }

    fn walk_object(
        &self,
        schema: &Schema,
        obj: &Map<String, Value>,
        prefix: &str,
        findings: &mut Findings,
    ) -> Map<String, Value> {
        // Keys the schema does not describe pass through untouched.
        let mut out = obj.clone();
        for (name, spec) in schema.iter() {
            let path = child_path(prefix, name);
            let value = obj.get(name);
            if is_empty_value(value) {
                if spec.required {
                    findings.error(&path, "required field is missing");
                }
                out.insert(name.to_string(), Value::Null);
                continue;
            }
            if let Some(value) = value {
                let processed = self.process(spec, value, &path, findings);
                out.insert(name.to_string(), processed);
            }
        }
        out
    }

    fn process(&self, spec: &FieldSpec, value: &Value, path: &str, findings: &mut Findings) -> Value {
        match (spec.field_type, &spec.fields) {
            (FieldType::Array, nested) => {
                let items = match value {
                    Value::Array(items) => items.clone(),
                    other => {
                        findings.warn(path, "expected an array; wrapped single value");
                        vec![other.clone()]
                    }
                };
                match nested {
                    Some(fields) => Value::Array(
                        items
                            .iter()
                            .enumerate()
                            .map(|(i, item)| {
                                let item_path = format!("{path}[{i}]");
                                match item {
                                    Value::Object(obj) => Value::Object(
                                        self.walk_object(fields, obj, &item_path, findings),
                                    ),
                                    other => {
                                        findings.warn(&item_path, "expected an object");
                                        other.clone()
                                    }
                                }
                            })
                            .collect(),
                    ),
                    None => self.leaf(FieldType::Array, &Value::Array(items), path, findings),
                }
            }
            (FieldType::Object, Some(fields)) => match value {
                Value::Object(obj) => Value::Object(self.walk_object(fields, obj, path, findings)),
                other => {
                    findings.warn(path, "expected an object");
                    other.clone()
                }
            },
            (field_type, _) => self.leaf(field_type, value, path, findings),
        }
    }

    fn leaf(
        &self,
        field_type: FieldType,
        value: &Value,
        path: &str,
        findings: &mut Findings,
    ) -> Value {
        if !self.registry.validate(field_type, value) {
            findings.warn(path, format!("invalid {field_type} format"));
        }
        if !self.normalize {
            return value.clone();
        }
        match self.registry.normalize(field_type, value) {
            Ok(normalized) => normalized,
            Err(message) => {
                findings.error(path, message);
                value.clone()
            }
        }
    }
}

/// Validates and normalizes with the default field registry.
pub fn validate(data: &Value, schema: &Schema) -> ValidationReport {
    SchemaValidator::default().validate(data, schema)
}
