//! Execution engine: interprets a compiled program against a browser driver.
//!
//! - A single cursor starts at `context.start_from_step` and advances one step at a time
//! - A step whose guard evaluates false is skipped and left out of the result entirely
//! - The first failing step is captured as [`FailedStep`] and ends the run; later steps are never attempted
//! - Nothing is retried here; resuming is the caller re-running with a new start index

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::RuntimeContext;
use crate::driver::{BrowserDriver, file_list};
use crate::error::{ExecutionError, StepError};
use crate::program::{CompiledProgram, CompiledStep, StepBody};

pub mod evaluate;
pub mod types;

pub use evaluate::{evaluate_guard, evaluate_value};
pub use types::{CompletedStep, ExecutionResult, FailedStep};

/// Knobs for a run that are not part of the program or context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Upper bound on a single step body. `None` leaves steps unbounded apart from a `wait` step's own timeout.
    pub step_deadline: Option<Duration>,
}

impl ExecutionOptions {
    pub fn with_step_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.step_deadline = deadline;
        self
    }
}

/// Runs `program` from `context.start_from_step` with default options.
pub async fn run(
    program: &CompiledProgram,
    context: &RuntimeContext,
    driver: &dyn BrowserDriver,
) -> Result<ExecutionResult, ExecutionError> {
    run_with_options(program, context, driver, ExecutionOptions::default()).await
}

/// Runs `program` from `context.start_from_step`.
///
/// # Errors
///
/// Returns [`ExecutionError::StartOutOfRange`] when the start index exceeds the step count. Step failures are not
/// errors; they are reported through [`ExecutionResult::failed_step`].
pub async fn run_with_options(
    program: &CompiledProgram,
    context: &RuntimeContext,
    driver: &dyn BrowserDriver,
    options: ExecutionOptions,
) -> Result<ExecutionResult, ExecutionError> {
    let start = context.start_from_step;
    if start > program.steps.len() {
        return Err(ExecutionError::StartOutOfRange {
            start,
            len: program.steps.len(),
        });
    }

    info!(program = %program.name, start_from_step = start, step_count = program.steps.len(), "starting run");
    let mut result = ExecutionResult::default();

    for step in &program.steps[start..] {
        if let Some(guard) = &step.guard
            && !evaluate_guard(guard, context)
        {
            debug!(step_index = step.index, step = %step.name, guard = %guard, "guard is false; skipping step");
            continue;
        }

        debug!(step_index = step.index, step = %step.name, action = %step.action, "running step");
        let outcome = match options.step_deadline {
            Some(deadline) => tokio::time::timeout(deadline, execute_step(step, context, driver))
                .await
                .unwrap_or_else(|_| {
                    Err(StepError::DeadlineExceeded {
                        deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    })
                }),
            None => execute_step(step, context, driver).await,
        };

        match outcome {
            Ok(produced) => {
                info!(step_index = step.index, step = %step.name, "step completed");
                result.completed_steps.push(CompletedStep {
                    index: step.index,
                    name: step.name.clone(),
                    success: true,
                });
                if let (Some(key), Some(value)) = (&step.output_key, produced) {
                    result.output.insert(key.clone(), value);
                }
            }
            Err(error) => {
                warn!(step_index = step.index, step = %step.name, error = %error, "step failed");
                result.success = false;
                result.failed_step = Some(FailedStep {
                    index: step.index,
                    name: step.name.clone(),
                    selector: step.selector.clone(),
                    hint: step.hint.clone(),
                    error: error.to_string(),
                });
                break;
            }
        }
    }

    info!(
        program = %program.name,
        success = result.success,
        completed = result.completed_steps.len(),
        "run finished"
    );
    Ok(result)
}

/// Issues the driver calls of one step body. Only script bodies produce a value.
async fn execute_step(step: &CompiledStep, context: &RuntimeContext, driver: &dyn BrowserDriver) -> Result<Option<Value>, StepError> {
    match &step.body {
        StepBody::Navigate { url } => {
            driver.navigate(url).await?;
            driver.wait_for_load().await?;
        }
        StepBody::Fill { selector, value } => {
            let value = evaluate_value(value, context)?;
            driver.fill(selector, &value).await?;
        }
        StepBody::Click { selector } => driver.click(selector).await?,
        StepBody::Press { selector, key } => driver.press(selector, key).await?,
        StepBody::Type { value } => {
            let value = evaluate_value(value, context)?;
            driver.type_text(&value).await?;
        }
        StepBody::Select { selector, value } => {
            let value = evaluate_value(value, context)?;
            driver.select_option(selector, &value).await?;
        }
        StepBody::FileUpload { selector, files } => {
            let files = evaluate_value(files, context)?;
            file_list(&files).map_err(|_| StepError::InvalidValue(format!("file_upload needs a path or a list of paths, got {files}")))?;
            driver.set_files(selector, &files).await?;
        }
        StepBody::Wait { selector, timeout_ms } => driver.wait_for_selector(selector, *timeout_ms).await?,
        StepBody::RawCode { code } => return Ok(driver.run_script(code, context).await?),
    }
    Ok(None)
}
