//! Whole-document compilation.
//!
//! [`compile`] gates on the schema validator, decodes the document into a [`WorkflowDefinition`] and compiles every
//! step in order. Compilation is all or nothing: the first failing step fails the document. The compiler keeps no
//! state between calls, so compiling the same document twice yields identical programs.

use pagewright_types::WorkflowDefinition;
use serde_json::Value;
use tracing::debug;

use crate::error::CompileError;
use crate::program::CompiledProgram;
use crate::schema;

pub mod action;

pub use action::compile_step;

/// Validates and compiles a raw workflow document.
pub fn compile(document: &Value) -> Result<CompiledProgram, CompileError> {
    let report = schema::validate(document);
    if !report.valid {
        debug!(error_count = report.errors.len(), "workflow rejected by schema validation");
        return Err(CompileError::SchemaValidation { errors: report.errors });
    }

    let definition: WorkflowDefinition =
        serde_json::from_value(document.clone()).map_err(|error| CompileError::Document(error.to_string()))?;
    compile_validated(&definition)
}

/// Compiles an already-decoded definition. The definition is validated in its serialized form first.
pub fn compile_definition(definition: &WorkflowDefinition) -> Result<CompiledProgram, CompileError> {
    let document = serde_json::to_value(definition).map_err(|error| CompileError::Document(error.to_string()))?;
    compile(&document)
}

fn compile_validated(definition: &WorkflowDefinition) -> Result<CompiledProgram, CompileError> {
    let steps = definition
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| compile_step(index, step))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(workflow = %definition.name, step_count = steps.len(), "compiled workflow");

    Ok(CompiledProgram {
        name: definition.name.clone(),
        description: definition.description.clone(),
        inputs: definition.input.clone(),
        constants: definition.constants.clone(),
        extract: definition.extract.clone(),
        outputs: definition.output.clone(),
        steps,
    })
}
