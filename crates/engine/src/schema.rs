//! Structural validation of raw workflow documents.
//!
//! The validator walks the document exactly as authored (a `serde_json::Value`) and accumulates one
//! [`SchemaViolation`] per problem instead of stopping at the first. Paths are JSON pointers such as
//! `/steps/1/when/op`, with `(root)` for the document itself; keywords and messages follow the wording
//! authors already know from JSON Schema tooling.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::action::{ActionKind, RAW_CODE_ALIAS};

static WORKFLOW_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("workflow name pattern"));
static CONDITION_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(extract|input|constants)\.[A-Za-z_][A-Za-z0-9_]*(\.([A-Za-z_][A-Za-z0-9_]*|[0-9]+))*$").expect("condition field pattern")
});
static OUTPUT_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("output key pattern"));

const TOP_LEVEL_KEYS: &[&str] = &["name", "description", "input", "constants", "extract", "output", "steps"];
const STEP_KEYS: &[&str] = &[
    "name",
    "action",
    "selector",
    "url",
    "value",
    "key",
    "file",
    "timeout",
    "code",
    "hint",
    "when",
    "output",
    "description",
];
const STEP_TEXT_KEYS: &[&str] = &["selector", "url", "key", "file", "code", "hint", "description"];
const INPUT_KEYS: &[&str] = &["type", "required", "default", "description", "example"];
const EXTRACT_KEYS: &[&str] = &["field", "prompt", "type"];
const OUTPUT_KEYS: &[&str] = &["description"];
const SINGLE_CONDITION_KEYS: &[&str] = &["field", "op", "value"];
const GROUP_CONDITION_KEYS: &[&str] = &["conditions", "match"];
const OPERATORS: &[&str] = &["==", "!=", ">", "<", ">=", "<="];
const MATCH_MODES: &[&str] = &["all", "any"];

/// One structural problem found in a workflow document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value, or `(root)`.
    pub path: String,
    /// Human-readable description.
    pub message: String,
    /// Schema keyword that failed (`required`, `type`, `enum`, ...).
    pub keyword: String,
    /// Keyword-specific details such as the missing property name.
    pub params: Value,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, keyword: impl Into<String>, message: impl Into<String>, params: Value) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            keyword: keyword.into(),
            params,
        }
    }
}

/// Outcome of [`validate`]. `valid` is true exactly when `errors` is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<SchemaViolation>,
}

/// Validates a raw workflow document against the authoring contract.
///
/// Never fails; every violation is reported in document order.
pub fn validate(document: &Value) -> ValidationReport {
    let mut validator = SchemaValidator::default();
    validator.check_document(document);
    let errors = validator.errors;
    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

#[derive(Default)]
struct SchemaValidator {
    errors: Vec<SchemaViolation>,
}

impl SchemaValidator {
    fn push(&mut self, path: &str, keyword: &str, message: impl Into<String>, params: Value) {
        let path = if path.is_empty() { "(root)" } else { path };
        self.errors.push(SchemaViolation::new(path, keyword, message, params));
    }

    fn check_document(&mut self, document: &Value) {
        let Some(root) = self.expect_object("", document) else {
            return;
        };
        self.check_required("", root, &["name", "steps"]);
        self.check_additional("", root, TOP_LEVEL_KEYS);

        if let Some(name) = root.get("name")
            && let Some(text) = self.expect_string("/name", name)
        {
            if text.is_empty() {
                self.push("/name", "minLength", "must NOT have fewer than 1 characters", json!({"limit": 1}));
            } else if !WORKFLOW_NAME.is_match(text) {
                self.pattern_violation("/name", WORKFLOW_NAME.as_str());
            }
        }
        if let Some(description) = root.get("description") {
            self.expect_string("/description", description);
        }
        if let Some(input) = root.get("input") {
            self.check_input("/input", input);
        }
        if let Some(constants) = root.get("constants") {
            self.expect_object("/constants", constants);
        }
        if let Some(extract) = root.get("extract") {
            self.check_extract("/extract", extract);
        }
        if let Some(output) = root.get("output") {
            self.check_output("/output", output);
        }
        if let Some(steps) = root.get("steps") {
            self.check_steps("/steps", steps);
        }
    }

    fn check_input(&mut self, path: &str, input: &Value) {
        let Some(parameters) = self.expect_object(path, input) else {
            return;
        };
        for (name, parameter) in parameters {
            let parameter_path = format!("{path}/{}", pointer_token(name));
            let Some(fields) = self.expect_object(&parameter_path, parameter) else {
                continue;
            };
            self.check_additional(&parameter_path, fields, INPUT_KEYS);
            for key in ["type", "description"] {
                if let Some(value) = fields.get(key) {
                    self.expect_string(&format!("{parameter_path}/{key}"), value);
                }
            }
            if let Some(required) = fields.get("required")
                && !required.is_boolean()
            {
                self.type_violation(&format!("{parameter_path}/required"), "boolean");
            }
        }
    }

    fn check_extract(&mut self, path: &str, extract: &Value) {
        let Some(fields) = self.expect_array(path, extract) else {
            return;
        };
        for (index, field) in fields.iter().enumerate() {
            let field_path = format!("{path}/{index}");
            let Some(entry) = self.expect_object(&field_path, field) else {
                continue;
            };
            self.check_required(&field_path, entry, &["field", "prompt"]);
            self.check_additional(&field_path, entry, EXTRACT_KEYS);
            for key in EXTRACT_KEYS {
                if let Some(value) = entry.get(*key) {
                    self.expect_string(&format!("{field_path}/{key}"), value);
                }
            }
        }
    }

    fn check_output(&mut self, path: &str, output: &Value) {
        let Some(declarations) = self.expect_object(path, output) else {
            return;
        };
        for (key, declaration) in declarations {
            let declaration_path = format!("{path}/{}", pointer_token(key));
            let Some(fields) = self.expect_object(&declaration_path, declaration) else {
                continue;
            };
            self.check_additional(&declaration_path, fields, OUTPUT_KEYS);
            if let Some(description) = fields.get("description") {
                self.expect_string(&format!("{declaration_path}/description"), description);
            }
        }
    }

    fn check_steps(&mut self, path: &str, steps: &Value) {
        let Some(steps) = self.expect_array(path, steps) else {
            return;
        };
        if steps.is_empty() {
            self.push(path, "minItems", "must NOT have fewer than 1 items", json!({"limit": 1}));
        }
        for (index, step) in steps.iter().enumerate() {
            self.check_step(&format!("{path}/{index}"), step);
        }
    }

    fn check_step(&mut self, path: &str, step: &Value) {
        let Some(fields) = self.expect_object(path, step) else {
            return;
        };
        self.check_required(path, fields, &["name", "action"]);
        self.check_additional(path, fields, STEP_KEYS);

        if let Some(name) = fields.get("name")
            && let Some(text) = self.expect_string(&format!("{path}/name"), name)
            && text.is_empty()
        {
            self.push(&format!("{path}/name"), "minLength", "must NOT have fewer than 1 characters", json!({"limit": 1}));
        }

        let kind = fields.get("action").and_then(|action| self.check_action(&format!("{path}/action"), action));
        if let Some(kind) = kind {
            self.check_required(path, fields, kind.required_fields());
        }

        for key in STEP_TEXT_KEYS {
            if let Some(value) = fields.get(*key) {
                self.expect_string(&format!("{path}/{key}"), value);
            }
        }
        if let Some(value) = fields.get("value")
            && !(value.is_string() || value.is_number() || value.is_boolean())
        {
            self.type_violation(&format!("{path}/value"), "string,number,boolean");
        }
        if let Some(timeout) = fields.get("timeout") {
            let timeout_path = format!("{path}/timeout");
            match timeout {
                Value::Number(number) if number.is_u64() || number.is_i64() => {
                    if number.as_i64().is_some_and(|millis| millis < 1) {
                        self.push(&timeout_path, "minimum", "must be >= 1", json!({"comparison": ">=", "limit": 1}));
                    }
                }
                _ => self.type_violation(&timeout_path, "integer"),
            }
        }
        if let Some(output) = fields.get("output") {
            let output_path = format!("{path}/output");
            if let Some(text) = self.expect_string(&output_path, output)
                && !OUTPUT_KEY.is_match(text)
            {
                self.pattern_violation(&output_path, OUTPUT_KEY.as_str());
            }
        }
        if let Some(when) = fields.get("when") {
            self.check_condition(&format!("{path}/when"), when);
        }
    }

    fn check_action(&mut self, path: &str, action: &Value) -> Option<ActionKind> {
        let text = self.expect_string(path, action)?;
        let kind = ActionKind::parse(text);
        if kind.is_none() {
            let mut allowed = ActionKind::valid_names();
            allowed.push(RAW_CODE_ALIAS);
            self.push(path, "enum", "must be equal to one of the allowed values", json!({"allowedValues": allowed}));
        }
        kind
    }

    /// Applies the `oneOf` between the single comparison shape and the combinator shape.
    fn check_condition(&mut self, path: &str, condition: &Value) {
        let single = condition_errors(path, condition, SchemaValidator::check_single_condition);
        let group = condition_errors(path, condition, SchemaValidator::check_group_condition);
        match (single.is_empty(), group.is_empty()) {
            (true, false) | (false, true) => {}
            (true, true) => self.push(
                path,
                "oneOf",
                "must match exactly one schema in oneOf",
                json!({"passingSchemas": [0, 1]}),
            ),
            (false, false) => {
                let fields = condition.as_object();
                let looks_grouped = fields.is_some_and(|fields| fields.contains_key("conditions") || fields.contains_key("match"));
                let looks_single = fields.is_some_and(|fields| SINGLE_CONDITION_KEYS.iter().any(|key| fields.contains_key(*key)));
                match (looks_single, looks_grouped) {
                    (true, false) => self.errors.extend(single),
                    (false, true) => self.errors.extend(group),
                    _ => {}
                }
                self.push(path, "oneOf", "must match exactly one schema in oneOf", json!({"passingSchemas": Value::Null}));
            }
        }
    }

    fn check_single_condition(&mut self, path: &str, condition: &Value) {
        let Some(fields) = self.expect_object(path, condition) else {
            return;
        };
        self.check_required(path, fields, SINGLE_CONDITION_KEYS);
        self.check_additional(path, fields, SINGLE_CONDITION_KEYS);
        if let Some(field) = fields.get("field") {
            let field_path = format!("{path}/field");
            if let Some(text) = self.expect_string(&field_path, field)
                && !CONDITION_FIELD.is_match(text)
            {
                self.pattern_violation(&field_path, CONDITION_FIELD.as_str());
            }
        }
        if let Some(op) = fields.get("op") {
            let op_path = format!("{path}/op");
            if let Some(text) = self.expect_string(&op_path, op)
                && !OPERATORS.contains(&text)
            {
                self.push(&op_path, "enum", "must be equal to one of the allowed values", json!({"allowedValues": OPERATORS}));
            }
        }
        if let Some(value) = fields.get("value")
            && !(value.is_string() || value.is_number() || value.is_boolean())
        {
            self.type_violation(&format!("{path}/value"), "string,number,boolean");
        }
    }

    fn check_group_condition(&mut self, path: &str, condition: &Value) {
        let Some(fields) = self.expect_object(path, condition) else {
            return;
        };
        self.check_required(path, fields, GROUP_CONDITION_KEYS);
        self.check_additional(path, fields, GROUP_CONDITION_KEYS);
        if let Some(conditions) = fields.get("conditions") {
            let conditions_path = format!("{path}/conditions");
            if let Some(items) = self.expect_array(&conditions_path, conditions) {
                if items.is_empty() {
                    self.push(&conditions_path, "minItems", "must NOT have fewer than 1 items", json!({"limit": 1}));
                }
                for (index, item) in items.iter().enumerate() {
                    self.check_condition(&format!("{conditions_path}/{index}"), item);
                }
            }
        }
        if let Some(mode) = fields.get("match") {
            let match_path = format!("{path}/match");
            if let Some(text) = self.expect_string(&match_path, mode)
                && !MATCH_MODES.contains(&text)
            {
                self.push(&match_path, "enum", "must be equal to one of the allowed values", json!({"allowedValues": MATCH_MODES}));
            }
        }
    }

    fn check_required(&mut self, path: &str, fields: &Map<String, Value>, required: &[&str]) {
        for property in required {
            if !fields.contains_key(*property) {
                self.push(
                    path,
                    "required",
                    format!("must have required property '{property}'"),
                    json!({"missingProperty": property}),
                );
            }
        }
    }

    fn check_additional(&mut self, path: &str, fields: &Map<String, Value>, allowed: &[&str]) {
        for key in fields.keys().filter(|key| !allowed.contains(&key.as_str())) {
            self.push(path, "additionalProperties", "must NOT have additional properties", json!({"additionalProperty": key}));
        }
    }

    fn expect_object<'a>(&mut self, path: &str, value: &'a Value) -> Option<&'a Map<String, Value>> {
        let object = value.as_object();
        if object.is_none() {
            self.type_violation(path, "object");
        }
        object
    }

    fn expect_array<'a>(&mut self, path: &str, value: &'a Value) -> Option<&'a Vec<Value>> {
        let array = value.as_array();
        if array.is_none() {
            self.type_violation(path, "array");
        }
        array
    }

    fn expect_string<'a>(&mut self, path: &str, value: &'a Value) -> Option<&'a str> {
        let text = value.as_str();
        if text.is_none() {
            self.type_violation(path, "string");
        }
        text
    }

    fn type_violation(&mut self, path: &str, expected: &str) {
        self.push(path, "type", format!("must be {expected}"), json!({"type": expected}));
    }

    fn pattern_violation(&mut self, path: &str, pattern: &str) {
        self.push(path, "pattern", format!("must match pattern \"{pattern}\""), json!({"pattern": pattern}));
    }
}

fn condition_errors(path: &str, condition: &Value, check: fn(&mut SchemaValidator, &str, &Value)) -> Vec<SchemaViolation> {
    let mut branch = SchemaValidator::default();
    check(&mut branch, path, condition);
    branch.errors
}

/// Escapes a mapping key for use as a JSON pointer token.
fn pointer_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Value {
        json!({
            "name": "amazon-product-search",
            "steps": [
                {"name": "Open", "action": "navigate", "url": "https://www.amazon.com"},
                {"name": "Search", "action": "fill", "selector": "#twotabsearchtextbox", "value": "${input.keyword}"}
            ]
        })
    }

    fn keywords(report: &ValidationReport) -> Vec<(&str, &str)> {
        report.errors.iter().map(|error| (error.path.as_str(), error.keyword.as_str())).collect()
    }

    #[test]
    fn accepts_minimal_document() {
        let report = validate(&minimal());
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn missing_name_is_reported_at_root() {
        let mut document = minimal();
        document.as_object_mut().unwrap().remove("name");
        let report = validate(&document);
        assert!(!report.valid);
        assert_eq!(report.errors[0].path, "(root)");
        assert_eq!(report.errors[0].keyword, "required");
        assert_eq!(report.errors[0].message, "must have required property 'name'");
        assert_eq!(report.errors[0].params, json!({"missingProperty": "name"}));
    }

    #[test]
    fn accumulates_every_violation() {
        let document = json!({
            "name": "Bad Name",
            "steps": [
                {"name": "Hover", "action": "hover", "selector": "#menu"},
                {"name": "Open", "action": "navigate"},
                {"action": "click", "selector": "#go", "timeout": 0}
            ]
        });
        let report = validate(&document);
        assert_eq!(
            keywords(&report),
            vec![
                ("/name", "pattern"),
                ("/steps/0/action", "enum"),
                ("/steps/1", "required"),
                ("/steps/2", "required"),
                ("/steps/2/timeout", "minimum"),
            ]
        );
        assert_eq!(report.errors[2].params, json!({"missingProperty": "url"}));
    }

    #[test]
    fn rejects_fallback_container_on_steps() {
        let mut document = minimal();
        document["steps"][1]["fallback"] = json!({"mode": "ai", "hint": "Search box"});
        let report = validate(&document);
        assert_eq!(keywords(&report), vec![("/steps/1", "additionalProperties")]);
        assert_eq!(report.errors[0].params, json!({"additionalProperty": "fallback"}));
    }

    #[test]
    fn rejects_empty_step_list_and_unknown_top_level_keys() {
        let document = json!({"name": "empty", "steps": [], "version": 2});
        let report = validate(&document);
        assert_eq!(keywords(&report), vec![("(root)", "additionalProperties"), ("/steps", "minItems")]);
    }

    #[test]
    fn accepts_legacy_script_alias() {
        let document = json!({
            "name": "legacy",
            "steps": [{"name": "Script", "action": "playwright_code", "code": "await page.reload();"}]
        });
        assert!(validate(&document).valid);
    }

    #[test]
    fn accepts_both_condition_shapes_including_nesting() {
        let mut document = minimal();
        document["steps"][0]["when"] = json!({"field": "extract.amount", "op": ">", "value": 10000});
        document["steps"][1]["when"] = json!({
            "conditions": [
                {"field": "extract.amount", "op": ">=", "value": 5000},
                {"conditions": [{"field": "input.isPremium", "op": "==", "value": true}], "match": "any"}
            ],
            "match": "all"
        });
        let report = validate(&document);
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn reports_malformed_conditions() {
        let mut document = minimal();
        document["steps"][0]["when"] = json!({"field": "env.HOME", "op": "~=", "value": 1});
        document["steps"][1]["when"] = json!({"conditions": [], "match": "all"});
        let report = validate(&document);
        assert_eq!(
            keywords(&report),
            vec![
                ("/steps/0/when/field", "pattern"),
                ("/steps/0/when/op", "enum"),
                ("/steps/0/when", "oneOf"),
                ("/steps/1/when/conditions", "minItems"),
                ("/steps/1/when", "oneOf"),
            ]
        );
    }

    #[test]
    fn mixed_condition_shape_fails_one_of() {
        let mut document = minimal();
        document["steps"][0]["when"] = json!({"field": "input.a", "op": "==", "value": 1, "conditions": [], "match": "all"});
        let report = validate(&document);
        assert!(!report.valid);
        assert_eq!(report.errors.last().unwrap().keyword, "oneOf");
    }

    #[test]
    fn non_object_document_is_a_type_error() {
        let report = validate(&json!(["not", "a", "workflow"]));
        assert_eq!(keywords(&report), vec![("(root)", "type")]);
        assert_eq!(report.errors[0].message, "must be object");
    }

    #[test]
    fn pointer_tokens_escape_slashes() {
        let mut document = minimal();
        document["input"] = json!({"a/b": {"required": "yes"}});
        let report = validate(&document);
        assert_eq!(keywords(&report), vec![("/input/a~1b/required", "type")]);
    }
}
