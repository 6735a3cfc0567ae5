//! Validation helpers for runtime input values.
//!
//! These routines check values supplied on the command line or in input files against the declared
//! [`InputParameter`] type before a run starts, and coerce raw `key=value` text into typed JSON.

use serde_json::{Number, Value};

use super::InputParameter;

/// Validate a JSON candidate against an input parameter's declared type.
///
/// The checks mirror what the runner expects:
/// - `number` accepts JSON numbers and strings that parse as numbers (CSV cells arrive as text).
/// - `boolean` accepts JSON booleans and the strings `true`/`false`.
/// - `string`, `file` and `image` accept strings only.
/// - Undeclared or unknown types accept anything.
pub fn validate_input_value(parameter: &InputParameter, candidate: &Value) -> Result<(), String> {
    let Some(declared) = parameter.r#type.as_deref() else {
        return Ok(());
    };

    match declared.to_ascii_lowercase().as_str() {
        "number" | "integer" => match candidate {
            Value::Number(_) => Ok(()),
            Value::String(text) if text.trim().parse::<f64>().is_ok() => Ok(()),
            _ => Err("value must be a number".to_string()),
        },
        "boolean" => match candidate {
            Value::Bool(_) => Ok(()),
            Value::String(text) if matches!(text.trim(), "true" | "false") => Ok(()),
            _ => Err("value must be true or false".to_string()),
        },
        "string" | "file" | "image" => match candidate {
            Value::String(_) => Ok(()),
            _ => Err(format!("value must be text to satisfy type '{declared}'")),
        },
        _ => Ok(()),
    }
}

/// Coerce raw command-line text into a JSON value using the declared parameter type.
///
/// Parameters without a numeric or boolean type keep the raw text.
pub fn coerce_input_text(parameter: Option<&InputParameter>, raw: &str) -> Result<Value, String> {
    let declared = parameter
        .and_then(|parameter| parameter.r#type.as_deref())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match declared.as_str() {
        "number" | "integer" => {
            let trimmed = raw.trim();
            if let Ok(integer) = trimmed.parse::<i64>() {
                return Ok(Value::Number(integer.into()));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{raw}' is not a number"))
        }
        "boolean" => match raw.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(format!("'{raw}' is not true or false")),
        },
        _ => Ok(Value::String(raw.to_string())),
    }
}
