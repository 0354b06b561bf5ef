//! Field Type Registry — binds each `FieldType` to a validator and a normalizer.
//!
//! Validators answer "does this look like a well-formed value of the kind?" and
//! never fail hard: a `false` becomes a warning. Normalizers return the canonical
//! form; an `Err` means the value could not be processed at all and becomes a
//! validation error.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

use super::FieldType;

pub type Validator = fn(&Value) -> bool;
pub type Normalizer = fn(&Value) -> Result<Value, String>;

#[derive(Clone, Copy)]
pub struct FieldHandler {
    pub validate: Validator,
    pub normalize: Normalizer,
}

impl std::fmt::Debug for FieldHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldHandler").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct FieldTypeRegistry {
    handlers: HashMap<FieldType, FieldHandler>,
}

impl Default for FieldTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldTypeRegistry {
    pub fn new() -> Self {
        let entries: [(FieldType, Validator, Normalizer); 16] = [
            (FieldType::String, validate_string, normalize_string),
            (FieldType::Email, validate_email, normalize_email),
            (FieldType::Phone, validate_phone, normalize_phone),
            (FieldType::Url, validate_url, normalize_url),
            (FieldType::Date, validate_date, normalize_date),
            (FieldType::Number, validate_number, normalize_number),
            (FieldType::Boolean, validate_boolean, normalize_boolean),
            (FieldType::Array, validate_array, normalize_array),
            (FieldType::Object, validate_object, normalize_identity),
            (FieldType::Name, validate_name, normalize_name),
            (FieldType::Address, validate_address, normalize_address),
            (FieldType::SkillList, validate_skill_list, normalize_skill_list),
            (FieldType::Experience, validate_record, normalize_record),
            (FieldType::Education, validate_record, normalize_record),
            (FieldType::Language, validate_language, normalize_language),
            (FieldType::Certification, validate_certification, normalize_certification),
        ];
        let handlers = entries
            .into_iter()
            .map(|(ty, validate, normalize)| (ty, FieldHandler { validate, normalize }))
            .collect();
        Self { handlers }
    }

    /// Replaces the handler for one kind on this registry instance.
    pub fn register(&mut self, field_type: FieldType, handler: FieldHandler) {
        self.handlers.insert(field_type, handler);
    }

    pub fn handler(&self, field_type: FieldType) -> FieldHandler {
        self.handlers
            .get(&field_type)
            .copied()
            .unwrap_or(FieldHandler {
                validate: |_| true,
                normalize: normalize_identity,
            })
    }

    pub fn validate(&self, field_type: FieldType, value: &Value) -> bool {
        (self.handler(field_type).validate)(value)
    }

    pub fn normalize(&self, field_type: FieldType, value: &Value) -> Result<Value, String> {
        (self.handler(field_type).normalize)(value)
    }
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[\d\s\-().]+$").unwrap());
static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(https?://)?([a-z0-9-]+\.)+[a-z]{2,}(:\d+)?(/\S*)?$").unwrap()
});
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SKILL_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;|\n]").unwrap());

const PRESENT_WORDS: &[&str] = &["present", "current", "now", "ongoing"];

const FULL_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y",
    "%d %b %Y",
];

// Parsed with a leading day of "1" prepended.
const MONTH_YEAR_FORMATS: &[&str] = &["%d %Y-%m", "%d %m/%Y", "%d %B %Y", "%d %b %Y", "%d %Y/%m"];

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s.trim(), " ").into_owned()
}

fn normalize_identity(value: &Value) -> Result<Value, String> {
    Ok(value.clone())
}

// ── string ──────────────────────────────────────────────────────────────────

fn validate_string(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn normalize_string(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        other => Ok(other.clone()),
    }
}

// ── email ───────────────────────────────────────────────────────────────────

fn validate_email(value: &Value) -> bool {
    value.as_str().is_some_and(|s| EMAIL_RE.is_match(s.trim()))
}

fn normalize_email(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(s.trim().to_lowercase())),
        other => Ok(other.clone()),
    }
}

// ── phone ───────────────────────────────────────────────────────────────────

fn validate_phone(value: &Value) -> bool {
    let Some(s) = value.as_str() else {
        return false;
    };
    let s = s.trim();
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    PHONE_RE.is_match(s) && (7..=15).contains(&digits)
}

/// Keeps digits only, plus a leading `+` when the number starts with one.
pub fn normalize_phone_str(s: &str) -> String {
    let s = s.trim();
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if s.starts_with('+') {
        format!("+{digits}")
    } else {
        digits
    }
}

fn normalize_phone(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(normalize_phone_str(s))),
        Value::Number(n) => Ok(Value::String(normalize_phone_str(&n.to_string()))),
        other => Ok(other.clone()),
    }
}

// ── url ─────────────────────────────────────────────────────────────────────

fn validate_url(value: &Value) -> bool {
    value.as_str().is_some_and(|s| URL_RE.is_match(s.trim()))
}

fn normalize_url(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.contains("://") {
                Ok(Value::String(s.to_string()))
            } else {
                Ok(Value::String(format!("https://{s}")))
            }
        }
        other => Ok(other.clone()),
    }
}

// ── date ────────────────────────────────────────────────────────────────────

pub fn is_present_marker(s: &str) -> bool {
    let lower = s.trim().to_lowercase();
    PRESENT_WORDS.contains(&lower.as_str())
}

/// Best-effort date parsing. Month-only and year-only dates resolve to the first
/// day of the period.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = collapse_whitespace(s);
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.date_naive());
    }
    for fmt in FULL_DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&s, fmt) {
            return Some(d);
        }
    }
    let with_day = format!("1 {s}");
    for fmt in MONTH_YEAR_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&with_day, fmt) {
            return Some(d);
        }
    }
    if YEAR_RE.is_match(&s) {
        let year: i32 = s.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }
    None
}

/// ISO date-only form, `"Present"` for open-ended markers, or `None` when the
/// input is not a recognizable date.
pub fn normalize_date_str(s: &str) -> Option<String> {
    if is_present_marker(s) {
        return Some("Present".to_string());
    }
    parse_date(s).map(|d| d.format("%Y-%m-%d").to_string())
}

fn validate_date(value: &Value) -> bool {
    match value {
        Value::String(s) => normalize_date_str(s).is_some(),
        Value::Number(n) => n.as_u64().is_some_and(|y| (1000..=9999).contains(&y)),
        _ => false,
    }
}

fn normalize_date(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(normalize_date_str(s)
            .map(Value::String)
            .unwrap_or_else(|| Value::String(s.trim().to_string()))),
        Value::Number(n) => Ok(n
            .as_u64()
            .and_then(|y| normalize_date_str(&y.to_string()))
            .map(Value::String)
            .unwrap_or_else(|| value.clone())),
        other => Ok(other.clone()),
    }
}

// ── number / boolean ────────────────────────────────────────────────────────

fn parse_number_str(s: &str) -> Option<Number> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
    if let Ok(i) = cleaned.parse::<i64>() {
        return Some(Number::from(i));
    }
    cleaned.parse::<f64>().ok().and_then(Number::from_f64)
}

fn validate_number(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => parse_number_str(s).is_some(),
        _ => false,
    }
}

fn normalize_number(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(parse_number_str(s)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone())),
        other => Ok(other.clone()),
    }
}

fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn validate_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::String(s) => parse_bool_str(s).is_some(),
        _ => false,
    }
}

fn normalize_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(parse_bool_str(s)
            .map(Value::Bool)
            .unwrap_or_else(|| value.clone())),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        other => Ok(other.clone()),
    }
}

// ── array / object ──────────────────────────────────────────────────────────

fn validate_array(value: &Value) -> bool {
    value.is_array()
}

fn normalize_array(value: &Value) -> Result<Value, String> {
    match value {
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if s.trim().is_empty() => None,
                    Value::String(s) => Some(Value::String(s.trim().to_string())),
                    Value::Null => None,
                    other => Some(other.clone()),
                })
                .collect(),
        )),
        other => Ok(other.clone()),
    }
}

fn validate_object(value: &Value) -> bool {
    value.is_object()
}

// ── name / address ──────────────────────────────────────────────────────────

fn validate_name(value: &Value) -> bool {
    value.as_str().is_some_and(|s| {
        s.chars().any(char::is_alphabetic) && !s.chars().any(|c| c.is_ascii_digit() || c == '@')
    })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Title-cases each whitespace token; hyphenated parts are cased separately.
pub fn title_case(s: &str) -> String {
    collapse_whitespace(s)
        .split(' ')
        .map(|token| token.split('-').map(capitalize).collect::<Vec<_>>().join("-"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_name(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(title_case(s))),
        other => Ok(other.clone()),
    }
}

fn validate_address(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Object(_) => true,
        _ => false,
    }
}

fn normalize_address(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(collapse_whitespace(s))),
        other => Ok(other.clone()),
    }
}

// ── skill lists ─────────────────────────────────────────────────────────────

fn validate_skill_list(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().all(Value::is_string),
        Value::String(_) => true,
        _ => false,
    }
}

/// Trims, drops empties and removes case-insensitive duplicates, keeping the
/// first spelling seen.
pub fn dedup_skills<I, S>(skills: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for skill in skills {
        let skill = collapse_whitespace(skill.as_ref());
        if skill.is_empty() {
            continue;
        }
        if seen.insert(skill.to_lowercase()) {
            out.push(skill);
        }
    }
    out
}

pub fn normalize_skill_list(value: &Value) -> Result<Value, String> {
    let skills = match value {
        Value::String(s) => dedup_skills(SKILL_SPLIT_RE.split(s)),
        Value::Array(items) => {
            let mut raw = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => raw.push(s.clone()),
                    Value::Number(n) => raw.push(n.to_string()),
                    Value::Null => {}
                    Value::Object(obj) => match obj.get("name").and_then(Value::as_str) {
                        Some(name) => raw.push(name.to_string()),
                        None => return Err("skill entry has no name".to_string()),
                    },
                    _ => return Err("expected a list of skill names".to_string()),
                }
            }
            dedup_skills(raw)
        }
        Value::Null => return Ok(Value::Null),
        _ => return Err("expected a list of skill names".to_string()),
    };
    Ok(Value::Array(skills.into_iter().map(Value::String).collect()))
}

// ── composite records ───────────────────────────────────────────────────────

fn validate_record(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().all(Value::is_object),
        _ => false,
    }
}

fn trim_record(value: &Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => Value::String(s.trim().to_string()),
                        other => other.clone(),
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn normalize_record(value: &Value) -> Result<Value, String> {
    match value {
        Value::Array(items) => Ok(Value::Array(items.iter().map(trim_record).collect())),
        other => Ok(trim_record(other)),
    }
}

fn validate_language(value: &Value) -> bool {
    match value {
        Value::String(s) => s.chars().all(|c| c.is_alphabetic() || c.is_whitespace() || c == '-'),
        Value::Object(obj) => obj.get("language").is_some_and(Value::is_string),
        _ => false,
    }
}

fn normalize_language(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(title_case(s))),
        other => Ok(trim_record(other)),
    }
}

fn validate_certification(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Object(obj) => obj.get("name").is_some_and(Value::is_string),
        _ => false,
    }
}

fn normalize_certification(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(collapse_whitespace(s))),
        other => Ok(trim_record(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> FieldTypeRegistry {
        FieldTypeRegistry::new()
    }

    #[test]
    fn test_email_lowercased_and_trimmed() {
        let r = registry();
        assert!(r.validate(FieldType::Email, &json!(" Jane.Doe@Example.COM ")));
        assert_eq!(
            r.normalize(FieldType::Email, &json!(" Jane.Doe@Example.COM ")).unwrap(),
            json!("jane.doe@example.com")
        );
        assert!(!r.validate(FieldType::Email, &json!("jane at example")));
    }

    #[test]
    fn test_phone_keeps_leading_plus() {
        let r = registry();
        assert_eq!(
            r.normalize(FieldType::Phone, &json!("+1 (555) 123-4567")).unwrap(),
            json!("+15551234567")
        );
        assert_eq!(
            r.normalize(FieldType::Phone, &json!("555.123.4567")).unwrap(),
            json!("5551234567")
        );
        assert!(r.validate(FieldType::Phone, &json!("555-1234")));
        assert!(!r.validate(FieldType::Phone, &json!("12")));
        assert!(!r.validate(FieldType::Phone, &json!("call me maybe")));
    }

    #[test]
    fn test_url_gets_https_scheme() {
        let r = registry();
        assert_eq!(
            r.normalize(FieldType::Url, &json!("github.com/janedoe")).unwrap(),
            json!("https://github.com/janedoe")
        );
        assert_eq!(
            r.normalize(FieldType::Url, &json!("http://example.org")).unwrap(),
            json!("http://example.org")
        );
        assert!(r.validate(FieldType::Url, &json!("linkedin.com/in/jane-doe")));
        assert!(!r.validate(FieldType::Url, &json!("not a url")));
    }

    #[test]
    fn test_dates_normalize_to_iso() {
        assert_eq!(normalize_date_str("2020-03-15").as_deref(), Some("2020-03-15"));
        assert_eq!(normalize_date_str("2020-03").as_deref(), Some("2020-03-01"));
        assert_eq!(normalize_date_str("March 2019").as_deref(), Some("2019-03-01"));
        assert_eq!(normalize_date_str("Jan 2018").as_deref(), Some("2018-01-01"));
        assert_eq!(normalize_date_str("07/2021").as_deref(), Some("2021-07-01"));
        assert_eq!(normalize_date_str("2017").as_deref(), Some("2017-01-01"));
        assert_eq!(normalize_date_str("Present").as_deref(), Some("Present"));
        assert_eq!(normalize_date_str("current").as_deref(), Some("Present"));
        assert_eq!(normalize_date_str("sometime"), None);
    }

    #[test]
    fn test_unparseable_date_kept_but_invalid() {
        let r = registry();
        assert!(!r.validate(FieldType::Date, &json!("the nineties")));
        assert_eq!(
            r.normalize(FieldType::Date, &json!(" the nineties ")).unwrap(),
            json!("the nineties")
        );
    }

    #[test]
    fn test_name_title_case() {
        assert_eq!(title_case("  jane   DOE "), "Jane Doe");
        assert_eq!(title_case("mary-jane watson"), "Mary-Jane Watson");
        assert!(!registry().validate(FieldType::Name, &json!("j4ne")));
    }

    #[test]
    fn test_skill_list_from_string_and_array() {
        let r = registry();
        assert_eq!(
            r.normalize(FieldType::SkillList, &json!("Python, SQL; python | Rust"))
                .unwrap(),
            json!(["Python", "SQL", "Rust"])
        );
        assert_eq!(
            r.normalize(FieldType::SkillList, &json!([" Go ", "", "go", {"name": "K8s"}]))
                .unwrap(),
            json!(["Go", "K8s"])
        );
        assert!(r.normalize(FieldType::SkillList, &json!({"a": 1})).is_err());
    }

    #[test]
    fn test_number_and_boolean_coercion() {
        let r = registry();
        assert_eq!(r.normalize(FieldType::Number, &json!("3,500")).unwrap(), json!(3500));
        assert_eq!(r.normalize(FieldType::Number, &json!("3.8")).unwrap(), json!(3.8));
        assert_eq!(r.normalize(FieldType::Boolean, &json!("Yes")).unwrap(), json!(true));
        assert!(!r.validate(FieldType::Boolean, &json!("maybe")));
    }

    #[test]
    fn test_register_overrides_handler() {
        let mut r = registry();
        r.register(
            FieldType::String,
            FieldHandler {
                validate: |_| false,
                normalize: |v| Ok(Value::String(v.as_str().unwrap_or_default().to_uppercase())),
            },
        );
        assert!(!r.validate(FieldType::String, &json!("x")));
        assert_eq!(r.normalize(FieldType::String, &json!("abc")).unwrap(), json!("ABC"));
    }
}
