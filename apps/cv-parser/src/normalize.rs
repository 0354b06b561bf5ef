//! Post-validation normalization pass.
//!
//! Runs after the schema validator on the already-normalized tree. Adds derived
//! fields the schema cannot express (experience `duration`) and re-applies date
//! and skill-list canonicalization to the well-known CV sections.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::schema::field_types::{
    is_present_marker, normalize_date_str, normalize_skill_list, parse_date,
};

/// Average month length used for duration math.
pub const AVG_DAYS_PER_MONTH: f64 = 30.44;

const EXPERIENCE_DATE_FIELDS: &[&str] = &["startDate", "endDate"];
const EDUCATION_DATE_FIELDS: &[&str] = &["startDate", "endDate", "graduationDate"];
const CERTIFICATION_DATE_FIELDS: &[&str] = &["date", "issueDate", "expiryDate"];
const SKILL_FIELDS: &[&str] = &["technical", "soft", "tools"];

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// Human-readable span such as `"2 years 3 months"`. Returns `None` when `end`
/// precedes `start`.
pub fn format_duration(start: NaiveDate, end: NaiveDate) -> Option<String> {
    let days = (end - start).num_days();
    if days < 0 {
        return None;
    }
    let total_months = (days as f64 / AVG_DAYS_PER_MONTH).floor() as i64;
    let years = total_months / 12;
    let months = total_months % 12;

    let mut parts = Vec::new();
    if years > 0 {
        parts.push(plural(years, "year"));
    }
    if months > 0 {
        parts.push(plural(months, "month"));
    }
    if parts.is_empty() {
        return Some("Less than a month".to_string());
    }
    Some(parts.join(" "))
}

fn normalize_dates(obj: &mut Map<String, Value>, fields: &[&str]) {
    for field in fields {
        if let Some(Value::String(s)) = obj.get(*field) {
            if let Some(normalized) = normalize_date_str(s) {
                obj.insert((*field).to_string(), Value::String(normalized));
            }
        }
    }
}

fn experience_duration(obj: &Map<String, Value>, today: NaiveDate) -> Option<String> {
    let start = obj.get("startDate").and_then(Value::as_str).and_then(parse_date)?;
    let is_current = obj.get("current").and_then(Value::as_bool).unwrap_or(false);
    let end = match obj.get("endDate") {
        _ if is_current => today,
        None | Some(Value::Null) => today,
        Some(Value::String(s)) if is_present_marker(s) => today,
        Some(Value::String(s)) => parse_date(s)?,
        Some(_) => return None,
    };
    format_duration(start, end)
}

fn for_each_item(data: &mut Value, section: &str, mut f: impl FnMut(&mut Map<String, Value>)) {
    if let Some(items) = data.get_mut(section).and_then(Value::as_array_mut) {
        for item in items.iter_mut() {
            if let Some(obj) = item.as_object_mut() {
                f(obj);
            }
        }
    }
}

fn renormalize_skills(obj: &mut Map<String, Value>, fields: &[&str]) {
    for field in fields {
        if let Some(value) = obj.get(*field) {
            if let Ok(normalized) = normalize_skill_list(value) {
                obj.insert((*field).to_string(), normalized);
            }
        }
    }
}

/// Applies the second normalization pass in place. `today` closes open-ended
/// positions.
pub fn post_normalize(data: &mut Value, today: NaiveDate) {
    for_each_item(data, "experience", |obj| {
        normalize_dates(obj, EXPERIENCE_DATE_FIELDS);
        if let Some(duration) = experience_duration(obj, today) {
            obj.insert("duration".to_string(), Value::String(duration));
        }
        renormalize_skills(obj, &["technologies"]);
    });
    for_each_item(data, "education", |obj| {
        normalize_dates(obj, EDUCATION_DATE_FIELDS)
    });
    for_each_item(data, "certifications", |obj| {
        normalize_dates(obj, CERTIFICATION_DATE_FIELDS)
    });
    for_each_item(data, "projects", |obj| {
        normalize_dates(obj, EXPERIENCE_DATE_FIELDS);
        renormalize_skills(obj, &["technologies"]);
    });
    if let Some(skills) = data.get_mut("skills").and_then(Value::as_object_mut) {
        renormalize_skills(skills, SKILL_FIELDS);
    }
}
