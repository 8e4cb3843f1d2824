//! Forgiving field decoders for generated records.
//!
//! Generators write "8/10" where a number was asked for, "70" for a
//! probability, "yes" for a boolean. These helpers accept those forms and are
//! meant for `#[serde(deserialize_with = "...")]` on wire records.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::Severity;

/// A 0-10 score from a number, "8", "8.5", "8/10" or "8 out of 10".
/// Returns `None` when no number can be read.
pub fn read_score(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            let s = lower.as_str();
            let (num, den) = match s.split_once('/') {
                Some((n, d)) => (n, Some(d)),
                None => match s.find("out of") {
                    Some(idx) => (&s[..idx], Some(&s[idx + 6..])),
                    None => (s, None),
                },
            };
            let num: f64 = num.trim().parse().ok()?;
            match den.and_then(|d| d.trim().parse::<f64>().ok()) {
                Some(d) if d > 0.0 => num / d * 10.0,
                _ => num,
            }
        }
        _ => return None,
    };
    raw.is_finite().then_some(raw)
}

/// A 0-1 probability. Values above 1 and up to 100 are read as percentages.
pub fn read_probability(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    Some(scaled.clamp(0.0, 1.0))
}

pub fn read_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "found" | "vulnerable" => Some(true),
            "false" | "no" | "n" | "0" | "none" | "not found" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn read_severity(value: &Value) -> Option<Severity> {
    value.as_str()?.parse().ok()
}

/// Any scalar as text. `null` becomes empty.
pub fn read_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

pub fn score<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(read_score(&Value::deserialize(d)?))
}

pub fn probability<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(read_probability(&Value::deserialize(d)?))
}

pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(read_flag(&Value::deserialize(d)?))
}

pub fn severity<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Severity>, D::Error> {
    Ok(read_severity(&Value::deserialize(d)?))
}

pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(read_text(&Value::deserialize(d)?))
}

/// A list of strings, or a single string as a one-element list.
pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .iter()
            .map(read_text)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Null => Vec::new(),
        other => vec![read_text(&other)],
    })
}
