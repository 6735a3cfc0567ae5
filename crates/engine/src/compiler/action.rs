//! Per-step compilation.
//!
//! Static fields (`url`, `selector`, `key`, `code`) are carried as literals; dynamic fields (`value`, `file`) go
//! through the interpolation resolver. A `when` clause becomes the step's guard.

use pagewright_types::StepDefinition;

use crate::action::ActionKind;
use crate::condition::compile_condition;
use crate::error::CompileError;
use crate::interpolation::{resolve, resolve_value};
use crate::program::{CompiledStep, DEFAULT_WAIT_TIMEOUT_MS, StepBody};

/// Compiles one authored step at position `index`.
pub fn compile_step(index: usize, step: &StepDefinition) -> Result<CompiledStep, CompileError> {
    let action = ActionKind::parse(&step.action).ok_or_else(|| CompileError::UnknownAction {
        step: step.name.clone(),
        action: step.action.clone(),
        valid: ActionKind::valid_names(),
    })?;

    let guard = step
        .when
        .as_ref()
        .map(|condition| compile_condition(condition, &step.name))
        .transpose()?;

    let body = compile_body(action, step)?;

    Ok(CompiledStep {
        index,
        name: step.name.clone(),
        action,
        selector: step.selector.clone(),
        hint: step.hint.clone(),
        output_key: step.output.clone(),
        guard,
        body,
    })
}

fn compile_body(action: ActionKind, step: &StepDefinition) -> Result<StepBody, CompileError> {
    let text = |field: &'static str, value: Option<&String>| {
        value.cloned().ok_or_else(|| CompileError::MissingField {
            step: step.name.clone(),
            action: action.as_str(),
            field,
        })
    };
    let dynamic_value = || {
        step.value.as_ref().map(resolve_value).ok_or_else(|| CompileError::MissingField {
            step: step.name.clone(),
            action: action.as_str(),
            field: "value",
        })
    };

    let body = match action {
        ActionKind::Navigate => StepBody::Navigate {
            url: text("url", step.url.as_ref())?,
        },
        ActionKind::Fill => StepBody::Fill {
            selector: text("selector", step.selector.as_ref())?,
            value: dynamic_value()?,
        },
        ActionKind::Click => StepBody::Click {
            selector: text("selector", step.selector.as_ref())?,
        },
        ActionKind::Press => StepBody::Press {
            selector: text("selector", step.selector.as_ref())?,
            key: text("key", step.key.as_ref())?,
        },
        ActionKind::Type => StepBody::Type { value: dynamic_value()? },
        ActionKind::Select => StepBody::Select {
            selector: text("selector", step.selector.as_ref())?,
            value: dynamic_value()?,
        },
        ActionKind::FileUpload => StepBody::FileUpload {
            selector: text("selector", step.selector.as_ref())?,
            files: resolve(&text("file", step.file.as_ref())?),
        },
        ActionKind::Wait => StepBody::Wait {
            selector: text("selector", step.selector.as_ref())?,
            timeout_ms: step.timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS),
        },
        ActionKind::RawCode => StepBody::RawCode {
            code: text("code", step.code.as_ref())?,
        },
    };
    Ok(body)
}
