//! Record validation and JSON-to-store value coercion

use crate::entity::definition::{EntityMapping, FieldDef};
use crate::entity::Record;
use crate::error::FieldViolation;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value as Json;
use std::sync::OnceLock;
use wf_db::{DataType, Value};

/// Store-ready timestamp layout
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"))
}

/// Validate `record` against `mapping` and produce one bound value per
/// writable field, in field order. Generated keys are skipped, and so are
/// timestamp fields the caller fills in.
///
/// All violations are collected rather than stopping at the first.
pub(crate) fn prepare_insert<'m>(
    mapping: &'m EntityMapping,
    record: &Record,
    skip: &[&str],
) -> Result<Vec<(&'m FieldDef, Value)>, Vec<FieldViolation>> {
    let mut values = Vec::new();
    let mut violations = Vec::new();

    for field in &mapping.fields {
        if field.is_generated() && record.get(&field.name).map_or(true, Json::is_null) {
            continue;
        }
        if skip.contains(&field.name.as_str()) {
            continue;
        }
        let raw = record
            .get(&field.name)
            .or(field.default.as_ref())
            .unwrap_or(&Json::Null);
        match check_field(mapping, field, raw) {
            Ok(Some(value)) => values.push((field, value)),
            Ok(None) => {}
            Err(mut errs) => violations.append(&mut errs),
        }
    }

    for key in record.keys() {
        if mapping.field(key).is_none() {
            log::debug!("Ignoring unknown attribute '{}' on {}", key, mapping.name);
        }
    }

    if violations.is_empty() {
        Ok(values)
    } else {
        Err(violations)
    }
}

/// `Ok(None)` means the field is absent and nullable, so it is left to the
/// store default.
fn check_field(
    mapping: &EntityMapping,
    field: &FieldDef,
    raw: &Json,
) -> Result<Option<Value>, Vec<FieldViolation>> {
    if raw.is_null() {
        if field.allow_null {
            return Ok(None);
        }
        return Err(vec![FieldViolation::new(
            &field.name,
            format!("{}.{} cannot be null", mapping.name, field.name),
            "is_null",
        )]);
    }

    let value = coerce(field.data_type, raw).ok_or_else(|| {
        vec![FieldViolation::new(
            &field.name,
            format!("{} must be of type {}", field.name, field.data_type),
            "type",
        )]
    })?;

    let mut violations = Vec::new();
    if let Value::Text(text) = &value {
        let rules = &field.validate;
        if rules.not_empty && text.trim().is_empty() {
            violations.push(validator_failed(field, "notEmpty"));
        }
        if rules.is_email && !email_regex().is_match(text) {
            violations.push(validator_failed(field, "isEmail"));
        }
        if let Some((min, max)) = rules.len {
            let n = text.chars().count();
            if n < min || n > max {
                violations.push(validator_failed(field, "len"));
            }
        }
    }

    if violations.is_empty() {
        Ok(Some(value))
    } else {
        Err(violations)
    }
}

fn validator_failed(field: &FieldDef, key: &str) -> FieldViolation {
    FieldViolation::new(
        &field.name,
        format!("Validation {} on {} failed", key, field.name),
        key,
    )
}

/// Convert a JSON value to the store value for `data_type`.
pub(crate) fn coerce(data_type: DataType, raw: &Json) -> Option<Value> {
    match (data_type, raw) {
        (_, Json::Null) => Some(Value::Null),
        (DataType::String | DataType::Text, Json::String(s)) => Some(Value::Text(s.clone())),
        (DataType::String | DataType::Text, Json::Number(n)) => Some(Value::Text(n.to_string())),
        (DataType::String | DataType::Text, Json::Bool(b)) => Some(Value::Text(b.to_string())),
        (DataType::Integer | DataType::BigInt, Json::Number(n)) => n.as_i64().map(Value::Int),
        (DataType::Integer | DataType::BigInt, Json::String(s)) => {
            s.trim().parse().ok().map(Value::Int)
        }
        (DataType::Real, Json::Number(n)) => n.as_f64().map(Value::Float),
        (DataType::Real, Json::String(s)) => s.trim().parse().ok().map(Value::Float),
        (DataType::Boolean, Json::Bool(b)) => Some(Value::Bool(*b)),
        (DataType::Boolean, Json::Number(n)) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        (DataType::Boolean, Json::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (DataType::Date, Json::String(s)) => parse_timestamp(s).map(Value::Text),
        _ => None,
    }
}

/// Accept RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` or a bare date.
fn parse_timestamp(s: &str) -> Option<String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc().format(TIMESTAMP_FORMAT).to_string());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.format(TIMESTAMP_FORMAT).to_string());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string());
    }
    None
}

/// Convert a store value back to JSON
pub(crate) fn to_json(value: Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(b),
        Value::Int(n) => Json::from(n),
        Value::Float(x) => serde_json::Number::from_f64(x).map_or(Json::Null, Json::Number),
        Value::Text(s) => Json::String(s),
    }
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
