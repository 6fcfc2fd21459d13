//! Parameter pipeline: per-attribute coercion and type validation.
//!
//! A [`ParamsTree`] is compiled once from an [`EventSchema`] and then applied
//! to every caller payload. Only keys declared by the schema are forwarded.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use crate::error::ValidationError;
use crate::schema::{EventSchema, ParamType};

/// Coerces `value` towards `param_type`.
///
/// Coercion never fails: a value that cannot be converted is returned as-is
/// and left for [`validate`] to reject.
pub fn transform(param_type: ParamType, value: Value, big_int: bool) -> Value {
    match param_type {
        ParamType::String => to_string_value(value),
        ParamType::Int => to_int_value(value, big_int),
        ParamType::Double => to_double_value(value),
    }
}

/// Checks the runtime kind of `value` against `param_type`.
///
/// A null value passes unless `strict` is set. In strict mode an `Int`
/// parameter must also be integral.
pub fn validate(
    key: &str,
    param_type: ParamType,
    value: &Value,
    strict: bool,
) -> Result<(), ValidationError> {
    if value.is_null() {
        if strict {
            return Err(ValidationError::NullValue {
                key: key.to_owned(),
            });
        }
        return Ok(());
    }

    let kind = value_kind(value);
    if !param_type.allowed_kinds().contains(&kind) {
        return Err(ValidationError::TypeMismatch {
            key: key.to_owned(),
            expected: param_type,
            found: kind,
        });
    }

    if strict && param_type == ParamType::Int && !is_integral(value) {
        return Err(ValidationError::NotInteger {
            key: key.to_owned(),
        });
    }

    Ok(())
}

/// Compiled validator and transformer for one schema attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDefinition {
    pub param_type: ParamType,
    pub is_required: bool,
    strict: bool,
    big_int: bool,
}

impl ParamDefinition {
    pub const fn new(param_type: ParamType, is_required: bool, strict: bool, big_int: bool) -> Self {
        Self {
            param_type,
            is_required,
            strict,
            big_int,
        }
    }

    pub fn validate(&self, key: &str, value: &Value) -> Result<(), ValidationError> {
        validate(key, self.param_type, value, self.strict)
    }

    pub fn transform(&self, value: Value) -> Value {
        transform(self.param_type, value, self.big_int)
    }
}

/// Options that shape how a [`ParamsTree`] is compiled and applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelinePolicy {
    pub strict: bool,
    pub transform_before_validate: bool,
    pub big_int: bool,
}

/// Per-schema mapping of parameter key to its compiled definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamsTree {
    entries: BTreeMap<String, ParamDefinition>,
    policy: PipelinePolicy,
}

impl ParamsTree {
    pub fn build(schema: &EventSchema, required_keys: &[String], policy: PipelinePolicy) -> Self {
        let entries = schema
            .attrs
            .iter()
            .map(|attr| {
                let definition = ParamDefinition::new(
                    attr.param_type,
                    required_keys.contains(&attr.key),
                    policy.strict,
                    policy.big_int,
                );
                (attr.key.clone(), definition)
            })
            .collect();

        Self { entries, policy }
    }

    pub fn get(&self, key: &str) -> Option<&ParamDefinition> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the outgoing payload from `data`.
    ///
    /// Every declared key is resolved (absent keys read as null), optionally
    /// transformed, validated and written. Undeclared keys are dropped, or
    /// rejected in strict mode.
    pub fn apply(&self, data: &Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
        if self.policy.strict {
            if let Some(key) = data.keys().find(|key| !self.entries.contains_key(*key)) {
                return Err(ValidationError::UnexpectedParam { key: key.clone() });
            }
        }

        let mut payload = Map::with_capacity(self.entries.len());
        for (key, definition) in &self.entries {
            let mut value = data.get(key).cloned().unwrap_or(Value::Null);

            if definition.is_required && value.is_null() {
                return Err(ValidationError::MissingRequired {
                    keys: vec![key.clone()],
                });
            }
            if self.policy.transform_before_validate && !value.is_null() {
                value = definition.transform(value);
            }
            definition.validate(key, &value)?;
            payload.insert(key.clone(), value);
        }

        Ok(payload)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

fn is_integral(value: &Value) -> bool {
    match value {
        Value::Number(number) => {
            number.is_i64()
                || number.is_u64()
                || number.as_f64().is_some_and(|float| float.fract() == 0.0)
        }
        _ => false,
    }
}

fn to_string_value(value: Value) -> Value {
    match value {
        Value::String(_) | Value::Null => value,
        Value::Number(number) => Value::String(number.to_string()),
        Value::Bool(flag) => Value::String(flag.to_string()),
        other => Value::String(other.to_string()),
    }
}

fn to_int_value(value: Value, big_int: bool) -> Value {
    let text = match &value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => return value,
    };
    let Some(digits) = leading_integer(&text) else {
        return value;
    };

    if big_int {
        return serde_json::from_str::<Number>(&digits)
            .map(Value::Number)
            .unwrap_or(value);
    }

    if let Ok(parsed) = digits.parse::<i64>() {
        return Value::from(parsed);
    }
    digits
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(value)
}

fn to_double_value(value: Value) -> Value {
    match &value {
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(value),
        _ => value,
    }
}

/// Extracts the leading optionally-signed decimal integer of `text`.
fn leading_integer(text: &str) -> Option<String> {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digit_count = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digit_count == 0 {
        return None;
    }

    let digits = rest[..digit_count].trim_start_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    if negative && digits != "0" {
        Some(format!("-{digits}"))
    } else {
        Some(digits.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::EventAttr;

    fn login_schema() -> EventSchema {
        EventSchema::new(
            "1",
            "login",
            vec![
                EventAttr::new("uid", ParamType::String),
                EventAttr::new("retryCount", ParamType::Int),
            ],
        )
    }

    fn policy(strict: bool) -> PipelinePolicy {
        PipelinePolicy {
            strict,
            transform_before_validate: true,
            big_int: false,
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn transform_coerces_each_type() {
        assert_eq!(transform(ParamType::String, json!(42), false), json!("42"));
        assert_eq!(transform(ParamType::String, json!(true), false), json!("true"));
        assert_eq!(transform(ParamType::Int, json!("3"), false), json!(3));
        assert_eq!(transform(ParamType::Int, json!(" 42px"), false), json!(42));
        assert_eq!(transform(ParamType::Int, json!("-7.9"), false), json!(-7));
        assert_eq!(transform(ParamType::Double, json!("2.5"), false), json!(2.5));
    }

    #[test]
    fn transform_leaves_uncoercible_values_untouched() {
        assert_eq!(transform(ParamType::Int, json!("abc"), false), json!("abc"));
        assert_eq!(transform(ParamType::Double, json!("n/a"), false), json!("n/a"));
        assert_eq!(transform(ParamType::Int, json!(false), false), json!(false));
    }

    #[test]
    fn big_int_transform_keeps_every_digit() {
        let value = transform(ParamType::Int, json!("123456789012345678901234567890"), true);
        assert_eq!(value.to_string(), "123456789012345678901234567890");
    }

    #[test]
    fn validate_rejects_wrong_runtime_kind() {
        let error = validate("uid", ParamType::String, &json!(1), false).expect_err("number is not a string");
        assert_eq!(
            error,
            ValidationError::TypeMismatch {
                key: String::from("uid"),
                expected: ParamType::String,
                found: "number",
            }
        );
        assert!(validate("amount", ParamType::Double, &json!("1.0"), false).is_err());
        assert!(validate("count", ParamType::Int, &json!(true), false).is_err());
    }

    #[test]
    fn validate_null_depends_on_strict() {
        assert!(validate("uid", ParamType::String, &Value::Null, false).is_ok());
        assert_eq!(
            validate("uid", ParamType::String, &Value::Null, true),
            Err(ValidationError::NullValue {
                key: String::from("uid")
            })
        );
    }

    #[test]
    fn strict_int_rejects_decimals() {
        assert!(validate("count", ParamType::Int, &json!(1.5), false).is_ok());
        assert_eq!(
            validate("count", ParamType::Int, &json!(1.5), true),
            Err(ValidationError::NotInteger {
                key: String::from("count")
            })
        );
        assert!(validate("count", ParamType::Int, &json!(2), true).is_ok());
    }

    #[test]
    fn apply_forwards_only_declared_keys() {
        let tree = ParamsTree::build(&login_schema(), &[String::from("uid")], policy(false));
        let payload = tree
            .apply(&object(json!({"uid": "u1", "retryCount": "3", "extra": 1})))
            .expect("valid payload");

        assert_eq!(Value::Object(payload), json!({"uid": "u1", "retryCount": 3}));
    }

    #[test]
    fn apply_normalizes_absent_declared_keys_to_null() {
        let tree = ParamsTree::build(&login_schema(), &[], policy(false));
        let payload = tree.apply(&object(json!({"uid": "u1"}))).expect("valid payload");

        assert_eq!(Value::Object(payload), json!({"uid": "u1", "retryCount": null}));
    }

    #[test]
    fn strict_apply_rejects_absent_declared_key_as_null() {
        let tree = ParamsTree::build(&login_schema(), &[], policy(true));
        let error = tree
            .apply(&object(json!({"uid": "u1"})))
            .expect_err("absent key reads as null");

        assert_eq!(
            error,
            ValidationError::NullValue {
                key: String::from("retryCount")
            }
        );
    }

    #[test]
    fn strict_apply_rejects_unknown_keys() {
        let tree = ParamsTree::build(&login_schema(), &[], policy(true));
        let error = tree
            .apply(&object(json!({"uid": "u1", "retryCount": 1, "extra": 1})))
            .expect_err("unknown key");

        assert_eq!(
            error,
            ValidationError::UnexpectedParam {
                key: String::from("extra")
            }
        );
    }

    #[test]
    fn required_key_with_null_value_is_rejected() {
        let tree = ParamsTree::build(&login_schema(), &[String::from("uid")], policy(false));
        let error = tree
            .apply(&object(json!({"uid": null, "retryCount": 1})))
            .expect_err("null required key");

        assert_eq!(
            error,
            ValidationError::MissingRequired {
                keys: vec![String::from("uid")]
            }
        );
    }

    #[test]
    fn validation_without_transform_rejects_string_numbers() {
        let tree = ParamsTree::build(
            &login_schema(),
            &[],
            PipelinePolicy {
                strict: false,
                transform_before_validate: false,
                big_int: false,
            },
        );

        assert!(tree.apply(&object(json!({"uid": "u1", "retryCount": "3"}))).is_err());
    }
}
