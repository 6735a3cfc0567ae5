//! Interpolation of `${scope.name}` references in authored strings.
//!
//! [`resolve`] classifies a raw string into one of three expression shapes, checked in order:
//!
//! 1. no recognised reference: a [`ValueExpr::Literal`];
//! 2. the whole string is exactly one reference: a [`ValueExpr::Lookup`], so numbers, booleans and objects pass
//!    through the context untouched;
//! 3. anything else: a [`ValueExpr::Template`] of text and reference segments.
//!
//! Only a single key of the `extract`, `input` or `constants` scope is a reference. Any other `${x.y}` form stays literal text and
//! is escaped when rendered, so it can never be evaluated.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::VariableRef;

/// A reference names one top-level key of a scope. Dotted paths such as `${input.a.b}` are not references.
static REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{((?:extract|input|constants)\.[A-Za-z_][A-Za-z0-9_]*)\}").expect("reference pattern"));

/// Value-producing expression compiled from an authored field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueExpr {
    /// Authored value used as-is.
    Literal(Value),
    /// Direct context lookup; the runtime value is passed through without conversion.
    Lookup(VariableRef),
    /// Text assembled from literal and reference segments; always produces a string.
    Template(Vec<TemplateSegment>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSegment {
    Text(String),
    Reference(VariableRef),
}

/// Classifies an authored string. See the module documentation for the three cases.
pub fn resolve(raw: &str) -> ValueExpr {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for captures in REFERENCE.captures_iter(raw) {
        let (Some(whole), Some(dotted)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let Some(reference) = VariableRef::parse_dotted(dotted.as_str()) else {
            continue;
        };
        if whole.start() > cursor {
            segments.push(TemplateSegment::Text(raw[cursor..whole.start()].to_string()));
        }
        segments.push(TemplateSegment::Reference(reference));
        cursor = whole.end();
    }

    if !segments.iter().any(|segment| matches!(segment, TemplateSegment::Reference(_))) {
        return ValueExpr::Literal(Value::String(raw.to_string()));
    }
    if cursor < raw.len() {
        segments.push(TemplateSegment::Text(raw[cursor..].to_string()));
    }
    if let [TemplateSegment::Reference(reference)] = segments.as_slice() {
        return ValueExpr::Lookup(reference.clone());
    }
    ValueExpr::Template(segments)
}

/// Resolves an authored JSON value: strings go through [`resolve`], other scalars stay literal.
pub fn resolve_value(value: &Value) -> ValueExpr {
    match value {
        Value::String(raw) => resolve(raw),
        other => ValueExpr::Literal(other.clone()),
    }
}

impl ValueExpr {
    /// References this expression reads, in order of appearance.
    pub fn references(&self) -> Vec<&VariableRef> {
        match self {
            ValueExpr::Literal(_) => Vec::new(),
            ValueExpr::Lookup(reference) => vec![reference],
            ValueExpr::Template(segments) => segments
                .iter()
                .filter_map(|segment| match segment {
                    TemplateSegment::Reference(reference) => Some(reference),
                    TemplateSegment::Text(_) => None,
                })
                .collect(),
        }
    }
}

impl fmt::Display for ValueExpr {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpr::Literal(value) => formatter.write_str(&format_literal(value)),
            ValueExpr::Lookup(reference) => write!(formatter, "{reference}"),
            ValueExpr::Template(segments) => {
                formatter.write_str("`")?;
                for segment in segments {
                    match segment {
                        TemplateSegment::Text(text) => formatter.write_str(&escape_template(text))?,
                        TemplateSegment::Reference(reference) => write!(formatter, "${{{reference}}}")?,
                    }
                }
                formatter.write_str("`")
            }
        }
    }
}

/// Renders a scalar the way program listings embed it: strings single-quoted and escaped, numbers and booleans
/// bare, everything else as JSON.
pub fn format_literal(value: &Value) -> String {
    match value {
        Value::String(text) => format!("'{}'", escape_literal(text)),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

/// Escapes text for a single-quoted literal.
pub fn escape_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escapes a literal segment of a backtick template.
///
/// Every `${` left in a text segment is not a recognised reference (those were split out by [`resolve`]), so each one
/// is escaped along with backslashes and backticks.
pub fn escape_template(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut characters = text.chars().peekable();
    while let Some(character) = characters.next() {
        match character {
            '\\' => escaped.push_str("\\\\"),
            '`' => escaped.push_str("\\`"),
            '$' if characters.peek() == Some(&'{') => escaped.push_str("\\$"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Scope;
    use serde_json::json;

    #[test]
    fn plain_text_is_literal() {
        assert_eq!(resolve("https://www.amazon.com"), ValueExpr::Literal(json!("https://www.amazon.com")));
        assert_eq!(resolve("").to_string(), "''");
    }

    #[test]
    fn whole_reference_is_a_direct_lookup() {
        let expr = resolve("${input.keyword}");
        assert_eq!(expr, ValueExpr::Lookup(VariableRef::new(Scope::Input, "keyword")));
        assert_eq!(expr.to_string(), "input.keyword");
    }

    #[test]
    fn surrounding_text_makes_a_template() {
        let expr = resolve("Total: ${extract.amount} JPY");
        assert_eq!(
            expr,
            ValueExpr::Template(vec![
                TemplateSegment::Text("Total: ".into()),
                TemplateSegment::Reference(VariableRef::new(Scope::Extract, "amount")),
                TemplateSegment::Text(" JPY".into()),
            ])
        );
        assert_eq!(expr.to_string(), "`Total: ${extract.amount} JPY`");
    }

    #[test]
    fn two_adjacent_references_make_a_template() {
        let expr = resolve("${input.first}${input.last}");
        assert_eq!(expr.references().len(), 2);
        assert_eq!(expr.to_string(), "`${input.first}${input.last}`");
    }

    #[test]
    fn unknown_scopes_stay_literal_text() {
        assert_eq!(resolve("${env.HOME}"), ValueExpr::Literal(json!("${env.HOME}")));
        let expr = resolve("${env.HOME}/${input.folder}");
        assert_eq!(expr.to_string(), "`\\${env.HOME}/${input.folder}`");
    }

    #[test]
    fn dotted_paths_are_not_references() {
        assert_eq!(resolve("${input.a.b}"), ValueExpr::Literal(json!("${input.a.b}")));
        assert_eq!(resolve("${extract.items.0}"), ValueExpr::Literal(json!("${extract.items.0}")));
        let expr = resolve("${input.a.b} and ${input.a}");
        assert_eq!(expr.references(), vec![&VariableRef::new(Scope::Input, "a")]);
        assert_eq!(expr.to_string(), "`\\${input.a.b} and ${input.a}`");
    }

    #[test]
    fn literals_escape_quotes_and_control_characters() {
        let expr = resolve("it's a\\path\n\tend\r");
        assert_eq!(expr.to_string(), r"'it\'s a\\path\n\tend\r'");
    }

    #[test]
    fn templates_escape_backticks_and_backslashes() {
        assert_eq!(escape_template("a`b\\c${d"), "a\\`b\\\\c\\${d");
        assert_eq!(escape_template("cost $5 {x}"), "cost $5 {x}");
    }

    #[test]
    fn non_string_values_format_bare() {
        assert_eq!(resolve_value(&json!(3)).to_string(), "3");
        assert_eq!(resolve_value(&json!(true)).to_string(), "true");
        assert_eq!(format_literal(&json!(["a", 1])), "[\"a\",1]");
    }
}
