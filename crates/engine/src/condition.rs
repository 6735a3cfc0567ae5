//! Compilation of step `when` clauses into guards.
//!
//! A clause is either a single comparison `{field, op, value}` or a combinator `{conditions, match}`. Both shapes are
//! checked here at compile time, so a malformed clause never reaches a run. Guards render with strict equality
//! (`===`, `!==`) and `&&`/`||` joins, which is the form program listings show.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::VariableRef;
use crate::error::CompileError;
use crate::interpolation::format_literal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl ComparisonOperator {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "==" => ComparisonOperator::Equal,
            "!=" => ComparisonOperator::NotEqual,
            ">" => ComparisonOperator::Greater,
            "<" => ComparisonOperator::Less,
            ">=" => ComparisonOperator::GreaterOrEqual,
            "<=" => ComparisonOperator::LessOrEqual,
            _ => return None,
        })
    }

    /// Rendered operator; equality becomes strict.
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "===",
            ComparisonOperator::NotEqual => "!==",
            ComparisonOperator::Greater => ">",
            ComparisonOperator::Less => "<",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::LessOrEqual => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    All,
    Any,
}

impl MatchMode {
    fn joiner(self) -> &'static str {
        match self {
            MatchMode::All => " && ",
            MatchMode::Any => " || ",
        }
    }
}

/// Compiled boolean expression gating a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Guard {
    Compare {
        field: VariableRef,
        operator: ComparisonOperator,
        value: Value,
    },
    Group {
        mode: MatchMode,
        conditions: Vec<Guard>,
    },
}

impl fmt::Display for Guard {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Compare { field, operator, value } => {
                write!(formatter, "{field} {} {}", operator.symbol(), format_literal(value))
            }
            Guard::Group { mode, conditions } => {
                for (position, condition) in conditions.iter().enumerate() {
                    if position > 0 {
                        formatter.write_str(mode.joiner())?;
                    }
                    match condition {
                        Guard::Group { .. } => write!(formatter, "({condition})")?,
                        Guard::Compare { .. } => write!(formatter, "{condition}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Compiles a raw `when` clause, naming `step` in any error.
pub fn compile_condition(condition: &Value, step: &str) -> Result<Guard, CompileError> {
    let invalid = |detail: String| CompileError::InvalidCondition {
        step: step.to_string(),
        detail,
    };
    let Some(fields) = condition.as_object() else {
        return Err(invalid(format!(
            "condition must be an object with either field/op/value or conditions/match, got {condition}"
        )));
    };

    let single = ["field", "op", "value"].iter().any(|key| fields.contains_key(*key));
    let grouped = ["conditions", "match"].iter().any(|key| fields.contains_key(*key));
    match (single, grouped) {
        (true, true) => Err(invalid(
            "condition mixes a single comparison (field/op/value) with a combinator (conditions/match)".to_string(),
        )),
        (false, false) => Err(invalid(
            "condition has neither a single comparison (field/op/value) nor a combinator (conditions/match)".to_string(),
        )),
        (true, false) => compile_comparison(fields, step),
        (false, true) => compile_group(fields, step),
    }
}

fn compile_comparison(fields: &Map<String, Value>, step: &str) -> Result<Guard, CompileError> {
    let invalid = |detail: String| CompileError::InvalidCondition {
        step: step.to_string(),
        detail,
    };

    let raw_field = fields
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("condition 'field' must be a string".to_string()))?;
    let field = VariableRef::parse_dotted(raw_field).ok_or_else(|| {
        invalid(format!(
            "condition field '{raw_field}' must reference extract.*, input.* or constants.*"
        ))
    })?;

    let raw_operator = fields
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("condition 'op' must be a string".to_string()))?;
    let operator = ComparisonOperator::parse(raw_operator).ok_or_else(|| {
        invalid(format!(
            "unsupported condition operator '{raw_operator}'; expected one of ==, !=, >, <, >=, <="
        ))
    })?;

    let value = fields
        .get("value")
        .cloned()
        .ok_or_else(|| invalid(format!("condition on '{raw_field}' is missing 'value'")))?;

    Ok(Guard::Compare { field, operator, value })
}

fn compile_group(fields: &Map<String, Value>, step: &str) -> Result<Guard, CompileError> {
    let invalid = |detail: &str| CompileError::InvalidCondition {
        step: step.to_string(),
        detail: detail.to_string(),
    };

    let conditions = match fields.get("conditions") {
        Some(Value::Array(conditions)) => conditions,
        Some(_) => return Err(invalid("combined condition 'conditions' must be an array")),
        None => return Err(invalid("combined condition is missing the 'conditions' array")),
    };
    if conditions.is_empty() {
        return Err(invalid("combined condition 'conditions' must not be empty"));
    }
    let mode = match fields.get("match").and_then(Value::as_str) {
        Some("all") => MatchMode::All,
        Some("any") => MatchMode::Any,
        _ => return Err(invalid("combined condition 'match' must be \"all\" or \"any\"")),
    };

    let conditions = conditions
        .iter()
        .map(|condition| compile_condition(condition, step))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Guard::Group { mode, conditions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail(result: Result<Guard, CompileError>) -> String {
        match result {
            Err(CompileError::InvalidCondition { step, detail }) => {
                assert_eq!(step, "Apply discount");
                detail
            }
            other => panic!("expected InvalidCondition, got {other:?}"),
        }
    }

    #[test]
    fn single_comparison_maps_equality_to_strict() {
        let guard = compile_condition(&json!({"field": "input.isPremium", "op": "==", "value": true}), "s").unwrap();
        assert_eq!(guard.to_string(), "input.isPremium === true");
        let guard = compile_condition(&json!({"field": "input.plan", "op": "!=", "value": "free"}), "s").unwrap();
        assert_eq!(guard.to_string(), "input.plan !== 'free'");
        let guard = compile_condition(&json!({"field": "extract.amount", "op": ">", "value": 10000}), "s").unwrap();
        assert_eq!(guard.to_string(), "extract.amount > 10000");
    }

    #[test]
    fn combinators_join_and_nest() {
        let condition = json!({
            "conditions": [
                {"field": "extract.amount", "op": ">=", "value": 5000},
                {"conditions": [
                    {"field": "input.isPremium", "op": "==", "value": true},
                    {"field": "constants.region", "op": "==", "value": "jp"}
                ], "match": "any"}
            ],
            "match": "all"
        });
        let guard = compile_condition(&condition, "s").unwrap();
        assert_eq!(
            guard.to_string(),
            "extract.amount >= 5000 && (input.isPremium === true || constants.region === 'jp')"
        );
    }

    #[test]
    fn malformed_shapes_fail_with_step_name() {
        let step = "Apply discount";
        assert!(detail(compile_condition(&json!("amount > 1"), step)).contains("must be an object"));
        assert!(detail(compile_condition(&json!({"when": 1}), step)).contains("neither"));
        assert!(detail(compile_condition(&json!({"field": "input.a", "op": "==", "value": 1, "match": "all"}), step))
            .contains("mixes"));
        assert!(detail(compile_condition(&json!({"conditions": {}, "match": "all"}), step)).contains("must be an array"));
        assert!(detail(compile_condition(&json!({"match": "all"}), step)).contains("missing the 'conditions'"));
        assert!(detail(compile_condition(&json!({"conditions": [], "match": "all"}), step)).contains("must not be empty"));
        assert!(
            detail(compile_condition(&json!({"conditions": [{"field": "input.a", "op": "==", "value": 1}], "match": "some"}), step))
                .contains("'match'")
        );
    }

    #[test]
    fn comparison_errors_describe_the_field() {
        let step = "Apply discount";
        assert!(detail(compile_condition(&json!({"field": "env.HOME", "op": "==", "value": 1}), step)).contains("env.HOME"));
        assert!(detail(compile_condition(&json!({"field": "input.a", "op": "=~", "value": 1}), step)).contains("=~"));
        assert!(detail(compile_condition(&json!({"field": "input.a", "op": "=="}), step)).contains("missing 'value'"));
    }

    #[test]
    fn nested_errors_surface() {
        let condition = json!({"conditions": [{"field": "input.a", "op": "==", "value": 1}, {"conditions": []}], "match": "any"});
        assert!(matches!(compile_condition(&condition, "s"), Err(CompileError::InvalidCondition { .. })));
    }
}
