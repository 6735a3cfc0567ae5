//! Strongly typed workflow definitions as authored in YAML or JSON.
//!
//! The models defined here mirror the authoring surface of a workflow document. Mappings use `IndexMap` so input,
//! constant and output declarations keep their authoring order from the document through to the compiled program,
//! which lets help output and CSV templates list fields in a predictable sequence.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod validation;

/// Describes a fully authored workflow, including metadata, parameters, and sequential steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    /// Canonical, filesystem-safe workflow identifier (for example, `amazon-product-search`).
    pub name: String,
    /// Optional descriptive copy surfaced by `describe`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared runtime inputs keyed by parameter name, preserving author order.
    #[serde(default)]
    pub input: IndexMap<String, InputParameter>,
    /// Literal values available to steps as `constants.*`.
    #[serde(default)]
    pub constants: IndexMap<String, JsonValue>,
    /// Fields an operator (or an upstream extraction tool) supplies as `extract.*`.
    #[serde(default)]
    pub extract: Vec<ExtractField>,
    /// Declared result keys and their descriptions.
    #[serde(default)]
    pub output: IndexMap<String, OutputField>,
    /// Ordered list of steps executed sequentially.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// Metadata for a single workflow input parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InputParameter {
    /// Declared primitive type (`string`, `number`, `boolean`, `file`, `image`, ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    /// When true the runner refuses to start without a value.
    #[serde(default)]
    pub required: bool,
    /// Value used when the caller does not provide one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Descriptive text explaining the purpose of the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Example value shown in help output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<JsonValue>,
}

impl InputParameter {
    /// Returns true when the declared type names a file-like value (a path the runner receives positionally).
    pub fn accepts_file(&self) -> bool {
        self.r#type
            .as_deref()
            .map(|declared| {
                let lowered = declared.to_ascii_lowercase();
                lowered.contains("file") || lowered.contains("image")
            })
            .unwrap_or(false)
    }
}

/// Describes one value extracted ahead of a run (for example from a receipt) and provided as `extract.<field>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractField {
    /// Field name referenced as `extract.<field>`.
    pub field: String,
    /// Extraction instructions; the first line doubles as a short description.
    pub prompt: String,
    /// Optional declared type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

impl ExtractField {
    /// First line of the prompt, used as a one-line description.
    pub fn summary(&self) -> &str {
        self.prompt.lines().next().unwrap_or_default().trim()
    }
}

/// Declared output key metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OutputField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One authored step.
///
/// `action` is kept as the raw authored string; the engine's action compiler turns it into a closed set of action
/// kinds and reports unknown values with the step name attached. `when` is likewise kept as the raw clause so the
/// condition compiler can describe malformed shapes precisely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StepDefinition {
    /// Human-readable step name reported in results.
    pub name: String,
    /// Action identifier (`navigate`, `fill`, `click`, ...).
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Value for `fill`, `type` and `select`; strings may contain `${scope.name}` references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Wait timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Script block for `raw_code`, passed to the driver verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Operator guidance surfaced when the step fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Optional guard clause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<JsonValue>,
    /// Key under which the step's return value is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_document_preserving_input_order() {
        let document = r#"
name: form-input-sample
description: Fill the student registration form
input:
  last_name:
    type: string
    required: true
  first_name:
    type: string
    default: Taro
  photo:
    type: image
constants:
  gender: Male
extract:
  - field: amount
    prompt: |
      Total amount on the receipt
      Digits only
steps:
  - name: Open form
    action: navigate
    url: https://demoqa.com/automation-practice-form
  - name: First name
    action: fill
    selector: '#firstName'
    value: ${input.first_name}
    hint: First Name field
"#;
        let definition: WorkflowDefinition = serde_yaml::from_str(document).expect("parse workflow");
        let input_names: Vec<&str> = definition.input.keys().map(String::as_str).collect();
        assert_eq!(input_names, vec!["last_name", "first_name", "photo"]);
        assert!(definition.input["last_name"].required);
        assert!(definition.input["photo"].accepts_file());
        assert!(!definition.input["first_name"].accepts_file());
        assert_eq!(definition.extract[0].summary(), "Total amount on the receipt");
        assert_eq!(definition.steps.len(), 2);
        assert_eq!(definition.steps[1].value, Some(JsonValue::String("${input.first_name}".into())));
        assert_eq!(definition.steps[1].hint.as_deref(), Some("First Name field"));
    }

    #[test]
    fn step_round_trips_without_empty_fields() {
        let step = StepDefinition {
            name: "Click submit".into(),
            action: "click".into(),
            selector: Some("#submit".into()),
            ..Default::default()
        };
        let encoded = serde_json::to_value(&step).expect("encode");
        assert_eq!(encoded, serde_json::json!({"name": "Click submit", "action": "click", "selector": "#submit"}));
    }
}
