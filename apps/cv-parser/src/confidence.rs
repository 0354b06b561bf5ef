//! Confidence Scorer — deterministic completeness heuristics.
//!
//! Categories absent from the payload do not count against it: the denominator
//! only grows for the categories the extraction actually attempted.
//!
//! Two weightings exist and are intentionally independent:
//! - `provider_confidence`: attached to each provider call (50/30/10/10)
//! - `overall_confidence`: reported in result metadata (40/30/15/15)

use serde_json::Value;

#[derive(Debug, Clone, Copy)]
struct Weights {
    personal: f64,
    full_name: f64,
    email: f64,
    phone: f64,
    experience: f64,
    per_experience: f64,
    education: f64,
    per_education: f64,
    skills: f64,
}

const PROVIDER_WEIGHTS: Weights = Weights {
    personal: 50.0,
    full_name: 20.0,
    email: 20.0,
    phone: 10.0,
    experience: 30.0,
    per_experience: 10.0,
    education: 10.0,
    per_education: 5.0,
    skills: 10.0,
};

const OVERALL_WEIGHTS: Weights = Weights {
    personal: 40.0,
    full_name: 15.0,
    email: 15.0,
    phone: 10.0,
    experience: 30.0,
    per_experience: 10.0,
    education: 15.0,
    per_education: 7.5,
    skills: 15.0,
};

/// Loose truthiness: null, false, zero and empty strings are falsy; everything
/// else, including empty arrays and objects, is truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn non_empty_len(value: Option<&Value>) -> usize {
    value.and_then(Value::as_array).map_or(0, Vec::len)
}

fn score_with(data: &Value, w: Weights) -> f64 {
    let mut score = 0.0;
    let mut max_score = 0.0;

    if let Some(personal) = data.get("personal").filter(|p| is_truthy(Some(p))) {
        max_score += w.personal;
        if is_truthy(personal.get("fullName")) {
            score += w.full_name;
        }
        if is_truthy(personal.get("email")) {
            score += w.email;
        }
        if is_truthy(personal.get("phone")) {
            score += w.phone;
        }
    }

    let experience = non_empty_len(data.get("experience"));
    if experience > 0 {
        max_score += w.experience;
        score += (experience as f64 * w.per_experience).min(w.experience);
    }

    let education = non_empty_len(data.get("education"));
    if education > 0 {
        max_score += w.education;
        score += (education as f64 * w.per_education).min(w.education);
    }

    if let Some(skills) = data.get("skills").filter(|s| is_truthy(Some(s))) {
        if is_truthy(skills.get("technical")) || is_truthy(skills.get("soft")) {
            max_score += w.skills;
            score += w.skills;
        }
    }

    if max_score > 0.0 {
        (score / max_score * 100.0).round() / 100.0
    } else {
        0.0
    }
}

/// Per-call confidence attached by the Response Parser.
pub fn provider_confidence(data: &Value) -> f64 {
    score_with(data, PROVIDER_WEIGHTS)
}

/// Result-level confidence used for metadata and the low-confidence check.
pub fn overall_confidence(data: &Value) -> f64 {
    score_with(data, OVERALL_WEIGHTS)
}
