//! Error taxonomy for compilation and execution.
//!
//! Compile-time errors fail a whole document and are always returned to the caller. Step failures during a run
//! are captured into [`crate::executor::FailedStep`] instead of being raised; only an out-of-range start index
//! escapes [`crate::executor::run`] as an error.

use thiserror::Error;

use crate::driver::DriverError;
use crate::schema::SchemaViolation;

/// Errors that can occur while turning a workflow document into a compiled program.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("workflow failed schema validation with {} error(s)", .errors.len())]
    SchemaValidation { errors: Vec<SchemaViolation> },

    #[error("Step \"{step}\": unknown action type \"{action}\". Valid actions are: {}", .valid.join(", "))]
    UnknownAction {
        step: String,
        action: String,
        valid: Vec<&'static str>,
    },

    #[error("Step \"{step}\": {detail}")]
    InvalidCondition { step: String, detail: String },

    #[error("Step \"{step}\": action '{action}' requires a text '{field}' field")]
    MissingField {
        step: String,
        action: &'static str,
        field: &'static str,
    },

    #[error("workflow document could not be decoded: {0}")]
    Document(String),
}

/// Errors raised by [`crate::executor::run`] before any step is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("startFromStep {start} is out of range for a program with {len} step(s)")]
    StartOutOfRange { start: usize, len: usize },
}

/// Failure of a single step body. Rendered into `failedStep.error`, never propagated out of a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("{0} is not defined")]
    UndefinedReference(String),

    #[error("step did not finish within {deadline_ms} ms")]
    DeadlineExceeded { deadline_ms: u64 },

    #[error("{0}")]
    InvalidValue(String),
}
