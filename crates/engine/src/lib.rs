//! # Pagewright Engine
//!
//! The Pagewright engine turns declarative browser workflows into compiled programs and runs them, one step at a
//! time, against an abstract browser driver. A failed run reports exactly which step failed so a later run can
//! resume from it.
//!
//! ## Key Features
//!
//! - **Schema validation**: every structural problem in a document is reported with a JSON-pointer path
//! - **Interpolation**: `${input.keyword}` style references into the `extract`, `input` and `constants` scopes
//! - **Guards**: `when` clauses with comparisons and `all`/`any` combinators
//! - **Deterministic artifacts**: compiling the same document always yields the same program bytes
//! - **Resumable execution**: runs start at any step index and capture the failing step as data
//!
//! ## Usage
//!
//! ```rust
//! use pagewright_engine::{RecordingDriver, RuntimeContext, compile, run};
//! use serde_json::json;
//!
//! let program = compile(&json!({
//!     "name": "product-search",
//!     "steps": [
//!         {"name": "Open", "action": "navigate", "url": "https://www.example.com"},
//!         {"name": "Search", "action": "fill", "selector": "#q", "value": "${input.keyword}"}
//!     ]
//! }))
//! .expect("valid workflow");
//!
//! let mut context = RuntimeContext::for_program(&program);
//! context.input.insert("keyword".into(), json!("lamp"));
//!
//! let driver = RecordingDriver::new();
//! let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! let result = runtime.block_on(run(&program, &context, &driver)).unwrap();
//! assert!(result.success);
//! ```
//!
//! ## Architecture
//!
//! - **`schema`**: structural validation of raw documents
//! - **`interpolation`**: reference resolution into value expressions
//! - **`condition`**: `when` clauses compiled into guards
//! - **`compiler`**: per-step and whole-document compilation
//! - **`program`**: compiled program model and artifact persistence
//! - **`context`**: runtime values supplied to a run
//! - **`driver`**: the browser driver capability and a recording implementation
//! - **`executor`**: the sequential interpreter

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde_json::Value;

pub mod action;
pub mod compiler;
pub mod condition;
pub mod context;
pub mod driver;
pub mod error;
pub mod executor;
pub mod interpolation;
pub mod program;
pub mod schema;

pub use action::ActionKind;
pub use compiler::{compile, compile_definition, compile_step};
pub use condition::{ComparisonOperator, Guard, MatchMode, compile_condition};
pub use context::{RuntimeContext, Scope, VariableRef};
pub use driver::{BlockingLane, BrowserDriver, DriverCall, DriverError, RecordingDriver};
pub use error::{CompileError, ExecutionError, StepError};
pub use executor::{CompletedStep, ExecutionOptions, ExecutionResult, FailedStep, run, run_with_options};
pub use interpolation::{TemplateSegment, ValueExpr, resolve};
pub use program::{CompiledProgram, CompiledStep, ProgramArtifact, StepBody, load_program, save_program};
pub use schema::{SchemaViolation, ValidationReport, validate};

/// Loads a workflow document from YAML or JSON as an untyped value.
///
/// The document is returned exactly as authored so [`validate`] can report on its raw structure. JSON is parsed
/// with the YAML parser, which accepts it as a subset.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid YAML/JSON.
pub fn load_workflow_document(file_path: impl AsRef<Path>) -> Result<Value> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read workflow file: {}", file_path.display()))?;
    let document: Value =
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse workflow file: {}", file_path.display()))?;
    Ok(document)
}
