//! Schema evaluation.
//!
//! Every declared field is checked and all failures are collected. Within a
//! single field, checking stops at the first failed constraint, so each path
//! carries one message. Unknown keys are dropped from the normalized output.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use super::{FieldKind, FieldSpec, Format, Schema};
use crate::error::FieldErrors;

/// Path reported when the payload itself is not an object.
pub const ROOT_PATH: &str = "$";

/// Validate `payload` against `schema`.
///
/// Returns the normalized payload (defaults filled, coerced values, unknown
/// keys removed) or every field error found.
pub fn validate(schema: &Schema, payload: &Value) -> Result<Value, FieldErrors> {
    let mut errors = FieldErrors::new();

    let Some(object) = payload.as_object() else {
        errors.insert(
            ROOT_PATH.to_string(),
            format!("expected object, received {}", type_name(payload)),
        );
        return Err(errors);
    };

    let normalized = validate_fields(&schema.fields, object, "", &mut errors);

    if errors.is_empty() {
        Ok(Value::Object(normalized))
    } else {
        Err(errors)
    }
}

fn validate_fields(
    fields: &BTreeMap<String, FieldSpec>,
    object: &Map<String, Value>,
    prefix: &str,
    errors: &mut FieldErrors,
) -> Map<String, Value> {
    let mut out = Map::new();

    for (name, spec) in fields {
        let path = join_path(prefix, name);

        // null is treated the same as an absent key
        match object.get(name).filter(|v| !v.is_null()) {
            Some(value) => {
                if let Some(normalized) = check_field(spec, value, &path, errors) {
                    out.insert(name.clone(), normalized);
                }
            }
            None => {
                if let Some(default) = &spec.default {
                    out.insert(name.clone(), default.clone());
                } else if spec.required {
                    errors.insert(path, "is required".to_string());
                }
            }
        }
    }

    out
}

/// Check one present value. Returns the normalized value, or `None` after
/// recording an error for `path`.
fn check_field(spec: &FieldSpec, value: &Value, path: &str, errors: &mut FieldErrors) -> Option<Value> {
    if spec.allow_empty && spec.kind == FieldKind::String && value.as_str() == Some("") {
        return Some(value.clone());
    }

    let result = match spec.kind {
        FieldKind::String => check_string(spec, value),
        FieldKind::Number => check_number(spec, value, false),
        FieldKind::Integer => check_number(spec, value, true),
        FieldKind::Boolean => check_boolean(spec, value),
        FieldKind::Object => return check_object(spec, value, path, errors),
        FieldKind::Array => return check_array(spec, value, path, errors),
        FieldKind::Any => Ok(value.clone()),
    };

    let checked = result.and_then(|normalized| {
        check_membership(spec, &normalized)?;
        Ok(normalized)
    });

    match checked {
        Ok(normalized) => Some(normalized),
        Err(Failure::Type(message)) => {
            errors.insert(path.to_string(), message);
            None
        }
        Err(Failure::Constraint(message)) => {
            errors.insert(path.to_string(), spec.message.clone().unwrap_or(message));
            None
        }
    }
}

/// Type mismatches keep their generated message; constraint failures may be
/// replaced by the field's custom message.
enum Failure {
    Type(String),
    Constraint(String),
}

fn check_string(spec: &FieldSpec, value: &Value) -> Result<Value, Failure> {
    let Some(s) = value.as_str() else {
        return Err(mismatch("string", value));
    };

    let len = s.chars().count() as f64;
    if let Some(min) = spec.min
        && len < min
    {
        return Err(Failure::Constraint(format!(
            "must be at least {min} characters"
        )));
    }
    if let Some(max) = spec.max
        && len > max
    {
        return Err(Failure::Constraint(format!(
            "must be at most {max} characters"
        )));
    }

    if spec.pattern.is_some() {
        match spec.regex() {
            Some(re) if re.is_match(s) => {}
            Some(_) => return Err(Failure::Constraint("has an invalid format".to_string())),
            None => {
                tracing::error!(pattern = ?spec.pattern, "schema pattern does not compile");
                return Err(Failure::Constraint("cannot be validated".to_string()));
            }
        }
    }

    if let Some(format) = spec.format
        && !matches_format(format, s)
    {
        let label = match format {
            Format::Email => "email address",
            Format::Uuid => "UUID",
            Format::DateTime => "RFC 3339 timestamp",
        };
        return Err(Failure::Constraint(format!("must be a valid {label}")));
    }

    Ok(value.clone())
}

fn check_number(spec: &FieldSpec, value: &Value, integer: bool) -> Result<Value, Failure> {
    let expected = if integer { "integer" } else { "number" };

    let (n, normalized) = match value {
        Value::Number(num) if integer => integer_from_number(num, value)?,
        Value::Number(num) => match num.as_f64() {
            Some(n) => (n, value.clone()),
            None => return Err(mismatch(expected, value)),
        },
        Value::String(s) if spec.coerce && integer => integer_from_str(s.trim(), value)?,
        Value::String(s) if spec.coerce => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => (n, number_value(n)),
            _ => return Err(mismatch(expected, value)),
        },
        _ => return Err(mismatch(expected, value)),
    };

    if let Some(bound) = spec.exclusive_min
        && n <= bound
    {
        return Err(Failure::Constraint(format!("must be greater than {bound}")));
    }
    if let Some(min) = spec.min
        && n < min
    {
        return Err(Failure::Constraint(format!("must be at least {min}")));
    }
    if let Some(max) = spec.max
        && n > max
    {
        return Err(Failure::Constraint(format!("must be at most {max}")));
    }

    Ok(normalized)
}

/// Largest magnitude an `f64` holds as an exact integer.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Integers outside `i64` are rejected; whole floats such as `3.0` are
/// stored as integers when `f64` represents them exactly.
fn integer_from_number(num: &Number, value: &Value) -> Result<(f64, Value), Failure> {
    if let Some(i) = num.as_i64() {
        return Ok((i as f64, value.clone()));
    }
    if num.is_u64() {
        return Err(out_of_range());
    }
    match num.as_f64() {
        Some(n) => whole_float(n, value),
        None => Err(mismatch("integer", value)),
    }
}

fn integer_from_str(s: &str, value: &Value) -> Result<(f64, Value), Failure> {
    if let Ok(i) = s.parse::<i64>() {
        return Ok((i as f64, Value::from(i)));
    }
    match s.parse::<f64>() {
        Ok(n) if n.is_finite() => whole_float(n, value),
        _ => Err(mismatch("integer", value)),
    }
}

fn whole_float(n: f64, value: &Value) -> Result<(f64, Value), Failure> {
    if n.fract() != 0.0 {
        return Err(mismatch("integer", value));
    }
    if n.abs() > MAX_SAFE_INTEGER {
        return Err(out_of_range());
    }
    Ok((n, Value::from(n as i64)))
}

fn out_of_range() -> Failure {
    Failure::Type("integer is out of range".to_string())
}

fn check_boolean(spec: &FieldSpec, value: &Value) -> Result<Value, Failure> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::String(s) if spec.coerce => match s.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch("boolean", value)),
        },
        _ => Err(mismatch("boolean", value)),
    }
}

fn check_object(spec: &FieldSpec, value: &Value, path: &str, errors: &mut FieldErrors) -> Option<Value> {
    let Some(object) = value.as_object() else {
        errors.insert(path.to_string(), format!("expected object, received {}", type_name(value)));
        return None;
    };

    let Some(fields) = &spec.fields else {
        return Some(value.clone());
    };

    let before = errors.len();
    let normalized = validate_fields(fields, object, path, errors);
    (errors.len() == before).then_some(Value::Object(normalized))
}

fn check_array(spec: &FieldSpec, value: &Value, path: &str, errors: &mut FieldErrors) -> Option<Value> {
    let Some(items) = value.as_array() else {
        errors.insert(path.to_string(), format!("expected array, received {}", type_name(value)));
        return None;
    };

    let len = items.len() as f64;
    if let Some(min) = spec.min
        && len < min
    {
        let message = format!("must contain at least {min} items");
        errors.insert(path.to_string(), spec.message.clone().unwrap_or(message));
        return None;
    }
    if let Some(max) = spec.max
        && len > max
    {
        let message = format!("must contain at most {max} items");
        errors.insert(path.to_string(), spec.message.clone().unwrap_or(message));
        return None;
    }

    let Some(item_spec) = &spec.items else {
        return Some(value.clone());
    };

    let before = errors.len();
    let normalized: Vec<Value> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| check_field(item_spec, item, &join_path(path, &i.to_string()), errors))
        .collect();

    (errors.len() == before).then_some(Value::Array(normalized))
}

fn check_membership(spec: &FieldSpec, value: &Value) -> Result<(), Failure> {
    if let Some(literal) = &spec.literal
        && literal != value
    {
        return Err(Failure::Constraint(format!("must be {literal}")));
    }

    if let Some(options) = &spec.one_of
        && !options.contains(value)
    {
        let listed: Vec<String> = options
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        return Err(Failure::Constraint(format!(
            "must be one of: {}",
            listed.join(", ")
        )));
    }

    Ok(())
}

fn matches_format(format: Format, s: &str) -> bool {
    match format {
        Format::Email => is_email(s),
        Format::Uuid => uuid::Uuid::parse_str(s).is_ok(),
        Format::DateTime => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
    }
}

fn is_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn number_value(n: f64) -> Value {
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

fn mismatch(expected: &str, value: &Value) -> Failure {
    Failure::Type(format!("expected {expected}, received {}", type_name(value)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
