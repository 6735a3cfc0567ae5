//! Evaluation of compiled expressions against a runtime context.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::condition::{ComparisonOperator, Guard, MatchMode};
use crate::context::RuntimeContext;
use crate::error::StepError;
use crate::interpolation::{TemplateSegment, ValueExpr};

/// Produces the runtime value of an expression.
///
/// A direct lookup of an absent reference fails with [`StepError::UndefinedReference`]. Inside a template an absent
/// reference renders as `undefined`, strings render raw and other values as their JSON text.
pub fn evaluate_value(expression: &ValueExpr, context: &RuntimeContext) -> Result<Value, StepError> {
    match expression {
        ValueExpr::Literal(value) => Ok(value.clone()),
        ValueExpr::Lookup(reference) => context
            .lookup(reference)
            .cloned()
            .ok_or_else(|| StepError::UndefinedReference(reference.to_string())),
        ValueExpr::Template(segments) => {
            let mut rendered = String::new();
            for segment in segments {
                match segment {
                    TemplateSegment::Text(text) => rendered.push_str(text),
                    TemplateSegment::Reference(reference) => match context.lookup(reference) {
                        Some(Value::String(text)) => rendered.push_str(text),
                        Some(Value::Number(number)) => rendered.push_str(&number_text(number)),
                        Some(other) => rendered.push_str(&other.to_string()),
                        None => rendered.push_str("undefined"),
                    },
                }
            }
            Ok(Value::String(rendered))
        }
    }
}

/// Number text as a template prints it: integral floats lose their trailing `.0`.
fn number_text(number: &Number) -> String {
    match number.as_f64() {
        Some(float) if number.is_f64() => float.to_string(),
        _ => number.to_string(),
    }
}

/// Decides whether a guarded step runs.
pub fn evaluate_guard(guard: &Guard, context: &RuntimeContext) -> bool {
    match guard {
        Guard::Compare { field, operator, value } => compare(context.lookup(field), *operator, value),
        Guard::Group { mode, conditions } => match mode {
            MatchMode::All => conditions.iter().all(|condition| evaluate_guard(condition, context)),
            MatchMode::Any => conditions.iter().any(|condition| evaluate_guard(condition, context)),
        },
    }
}

fn compare(actual: Option<&Value>, operator: ComparisonOperator, expected: &Value) -> bool {
    match operator {
        ComparisonOperator::Equal => actual.is_some_and(|actual| strict_equal(actual, expected)),
        ComparisonOperator::NotEqual => !actual.is_some_and(|actual| strict_equal(actual, expected)),
        relational => {
            let Some(ordering) = actual.and_then(|actual| order(actual, expected)) else {
                return false;
            };
            match relational {
                ComparisonOperator::Greater => ordering == Ordering::Greater,
                ComparisonOperator::Less => ordering == Ordering::Less,
                ComparisonOperator::GreaterOrEqual => ordering != Ordering::Less,
                ComparisonOperator::LessOrEqual => ordering != Ordering::Greater,
                ComparisonOperator::Equal | ComparisonOperator::NotEqual => false,
            }
        }
    }
}

/// Same type and same value; numbers compare numerically so `1` equals `1.0`.
fn strict_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64() == right.as_f64(),
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Value::String(left), Value::String(right)) = (left, right) {
        return Some(left.cmp(right));
    }
    numeric(left)?.partial_cmp(&numeric(right)?)
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::Array(_) | Value::Object(_) => None,
    }
}
