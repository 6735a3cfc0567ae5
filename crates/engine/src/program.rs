//! Compiled programs and their persisted artifact form.
//!
//! A [`CompiledProgram`] is plain data: an ordered list of [`CompiledStep`]s plus the workflow metadata a run needs.
//! The executor interprets it directly against a driver. Programs are immutable once produced and serialize
//! deterministically, so the same document always yields the same artifact bytes.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use pagewright_types::{ExtractField, InputParameter, OutputField};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::ActionKind;
use crate::condition::Guard;
use crate::interpolation::{ValueExpr, format_literal};

/// Timeout applied to `wait` steps that do not declare one.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Version of the artifact layout written by [`save_program`].
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Version of the compiler that produced an artifact.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File suffix of persisted programs.
pub const ARTIFACT_SUFFIX: &str = ".program.json";

/// Executable description of one step body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepBody {
    Navigate { url: String },
    Fill { selector: String, value: ValueExpr },
    Click { selector: String },
    Press { selector: String, key: String },
    Type { value: ValueExpr },
    Select { selector: String, value: ValueExpr },
    FileUpload { selector: String, files: ValueExpr },
    Wait { selector: String, timeout_ms: u64 },
    RawCode { code: String },
}

impl StepBody {
    /// Driver calls this body issues, rendered one per line.
    pub fn render_calls(&self) -> Vec<String> {
        let text = |value: &str| format_literal(&Value::String(value.to_string()));
        match self {
            StepBody::Navigate { url } => vec![format!("navigate({})", text(url)), "wait_for_load()".to_string()],
            StepBody::Fill { selector, value } => vec![format!("fill({}, {value})", text(selector))],
            StepBody::Click { selector } => vec![format!("click({})", text(selector))],
            StepBody::Press { selector, key } => vec![format!("press({}, {})", text(selector), text(key))],
            StepBody::Type { value } => vec![format!("type_text({value})")],
            StepBody::Select { selector, value } => vec![format!("select_option({}, {value})", text(selector))],
            StepBody::FileUpload { selector, files } => vec![format!("set_files({}, {files})", text(selector))],
            StepBody::Wait { selector, timeout_ms } => {
                vec![format!("wait_for_selector({}, {timeout_ms})", text(selector))]
            }
            StepBody::RawCode { code } => code.lines().map(str::to_string).collect(),
        }
    }
}

/// One step ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledStep {
    pub index: usize,
    pub name: String,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
    pub body: StepBody,
}

/// Validated, guard-resolved, interpolation-resolved form of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledProgram {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: IndexMap<String, InputParameter>,
    #[serde(default)]
    pub constants: IndexMap<String, Value>,
    #[serde(default)]
    pub extract: Vec<ExtractField>,
    #[serde(default)]
    pub outputs: IndexMap<String, OutputField>,
    pub steps: Vec<CompiledStep>,
}

impl CompiledProgram {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Human-readable program text: one block per step with its guard and driver calls.
    pub fn listing(&self) -> String {
        let mut listing = String::new();
        let _ = writeln!(listing, "// program: {} ({} step(s))", self.name, self.steps.len());
        if let Some(description) = &self.description {
            for line in description.lines() {
                let _ = writeln!(listing, "// {line}");
            }
        }
        for step in &self.steps {
            listing.push('\n');
            let _ = writeln!(listing, "// [{}] {} ({})", step.index, step.name, step.action);
            if let Some(selector) = &step.selector {
                let _ = writeln!(listing, "//     selector: {selector}");
            }
            if let Some(hint) = &step.hint {
                let _ = writeln!(listing, "//     hint: {hint}");
            }
            let calls = step.body.render_calls();
            let indent = match &step.guard {
                Some(guard) => {
                    let _ = writeln!(listing, "if ({guard}) {{");
                    "    "
                }
                None => "",
            };
            for call in &calls {
                if step.action == ActionKind::RawCode {
                    let _ = writeln!(listing, "{indent}{call}");
                } else {
                    let _ = writeln!(listing, "{indent}{call};");
                }
            }
            if let Some(output_key) = &step.output_key {
                let _ = writeln!(listing, "{indent}// result stored as output.{output_key}");
            }
            if step.guard.is_some() {
                listing.push_str("}\n");
            }
        }
        listing
    }
}

/// Persisted program with version stamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramArtifact {
    pub format_version: u32,
    pub compiler_version: String,
    pub program: CompiledProgram,
}

impl ProgramArtifact {
    pub fn new(program: CompiledProgram) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            compiler_version: COMPILER_VERSION.to_string(),
            program,
        }
    }
}

/// Serializes a program to its artifact text. Identical programs produce identical bytes.
pub fn artifact_json(program: &CompiledProgram) -> Result<String> {
    let artifact = ProgramArtifact::new(program.clone());
    let mut text = serde_json::to_string_pretty(&artifact).context("Failed to serialize compiled program")?;
    text.push('\n');
    Ok(text)
}

/// Path of the artifact for `name` inside `programs_dir`.
pub fn program_path(programs_dir: &Path, name: &str) -> PathBuf {
    programs_dir.join(format!("{name}{ARTIFACT_SUFFIX}"))
}

/// Writes `program` to `<programs_dir>/<name>.program.json`, creating the directory when needed.
pub fn save_program(programs_dir: &Path, program: &CompiledProgram) -> Result<PathBuf> {
    let path = program_path(programs_dir, &program.name);
    write_program(&path, program)?;
    Ok(path)
}

/// Writes `program` to an explicit path.
pub fn write_program(path: &Path, program: &CompiledProgram) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create program directory: {}", parent.display()))?;
    }
    let text = artifact_json(program)?;
    fs::write(path, text).with_context(|| format!("Failed to write compiled program: {}", path.display()))
}

/// Reads a program artifact from disk.
pub fn load_program(path: impl AsRef<Path>) -> Result<CompiledProgram> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read compiled program: {}", path.display()))?;
    parse_program_artifact(&text).with_context(|| format!("Invalid compiled program: {}", path.display()))
}

/// Decodes artifact text, rejecting unknown format versions.
pub fn parse_program_artifact(text: &str) -> Result<CompiledProgram> {
    let artifact: ProgramArtifact = serde_json::from_str(text).context("Failed to decode program artifact")?;
    if artifact.format_version != ARTIFACT_FORMAT_VERSION {
        bail!(
            "unsupported program format version {} (expected {}); recompile the workflow",
            artifact.format_version,
            ARTIFACT_FORMAT_VERSION
        );
    }
    Ok(artifact.program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ComparisonOperator, MatchMode};
    use crate::context::{Scope, VariableRef};
    use crate::interpolation::resolve;
    use serde_json::json;

    fn program() -> CompiledProgram {
        CompiledProgram {
            name: "receipt-entry".into(),
            description: Some("Enter a receipt".into()),
            inputs: IndexMap::new(),
            constants: IndexMap::new(),
            extract: Vec::new(),
            outputs: IndexMap::new(),
            steps: vec![
                CompiledStep {
                    index: 0,
                    name: "Open".into(),
                    action: ActionKind::Navigate,
                    selector: None,
                    hint: None,
                    output_key: None,
                    guard: None,
                    body: StepBody::Navigate {
                        url: "https://example.com/expenses".into(),
                    },
                },
                CompiledStep {
                    index: 1,
                    name: "Amount".into(),
                    action: ActionKind::Fill,
                    selector: Some("#amount".into()),
                    hint: Some("Amount field".into()),
                    output_key: None,
                    guard: Some(Guard::Group {
                        mode: MatchMode::All,
                        conditions: vec![Guard::Compare {
                            field: VariableRef::new(Scope::Extract, "amount"),
                            operator: ComparisonOperator::Greater,
                            value: json!(0),
                        }],
                    }),
                    body: StepBody::Fill {
                        selector: "#amount".into(),
                        value: resolve("${extract.amount}"),
                    },
                },
            ],
        }
    }

    #[test]
    fn listing_renders_guards_and_calls() {
        let listing = program().listing();
        assert!(listing.contains("navigate('https://example.com/expenses');\nwait_for_load();"));
        assert!(listing.contains("if (extract.amount > 0) {\n    fill('#amount', extract.amount);\n}"));
        assert!(listing.contains("//     hint: Amount field"));
    }

    #[test]
    fn artifact_round_trips_through_disk() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = save_program(directory.path(), &program()).expect("save");
        assert!(path.ends_with("receipt-entry.program.json"));
        let loaded = load_program(&path).expect("load");
        assert_eq!(loaded, program());
    }

    #[test]
    fn artifact_bytes_are_stable() {
        assert_eq!(artifact_json(&program()).unwrap(), artifact_json(&program()).unwrap());
    }

    #[test]
    fn rejects_unknown_format_version() {
        let mut artifact = serde_json::to_value(ProgramArtifact::new(program())).unwrap();
        artifact["format_version"] = json!(99);
        let error = parse_program_artifact(&artifact.to_string()).unwrap_err();
        assert!(error.to_string().contains("unsupported program format version 99"));
    }
}
