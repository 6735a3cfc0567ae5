//! Execution result data types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record of a step that ran and succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    /// Zero-based position in the program.
    pub index: usize,
    pub name: String,
    /// Always true; kept so serialized results read the same as failure records.
    pub success: bool,
}

/// Context captured for the step that ended a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub index: usize,
    pub name: String,
    pub selector: Option<String>,
    /// Operator guidance authored on the step.
    pub hint: Option<String>,
    /// Rendered error message.
    pub error: String,
}

/// Outcome of one run. Created fresh per call and never touched again by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    /// Steps that ran and succeeded, in execution order. Guard-skipped steps are absent.
    pub completed_steps: Vec<CompletedStep>,
    pub failed_step: Option<FailedStep>,
    /// Values produced by steps that declare an output key.
    pub output: IndexMap<String, Value>,
}

impl ExecutionResult {
    /// Index a resumed run should start from: the failing step, or `None` after a successful run.
    pub fn resume_index(&self) -> Option<usize> {
        self.failed_step.as_ref().map(|failed| failed.index)
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self {
            success: true,
            completed_steps: Vec::new(),
            failed_step: None,
            output: IndexMap::new(),
        }
    }
}
