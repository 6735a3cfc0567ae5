//! The `run` subcommand: context assembly, retries and batch execution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use pagewright_engine::program::{ARTIFACT_SUFFIX, program_path};
use pagewright_engine::{
    BrowserDriver, CompiledProgram, ExecutionOptions, ExecutionResult, RuntimeContext, load_program, load_workflow_document,
    run_with_options,
};
use pagewright_types::workflow::validation::{coerce_input_text, validate_input_value};
use pagewright_util::{BatchRecord, is_document_path};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Everything the command line contributes to a run's context.
#[derive(Debug, Clone, Default)]
pub struct ContextSources {
    pub input_path: Option<PathBuf>,
    /// Raw `key=value` pairs from `--input`.
    pub inputs: Vec<String>,
    pub charge_code: Option<String>,
    /// JSON object text from `--extract`.
    pub extract: Option<String>,
    pub start_from: usize,
    /// Constants from the settings file, layered under the program's own.
    pub constants: Map<String, Value>,
}

/// How failed runs are re-attempted.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub options: ExecutionOptions,
}

/// Finds the compiled artifact for a workflow identifier.
pub fn locate_program(programs_dir: &Path, identifier: &str) -> Result<PathBuf> {
    let direct = PathBuf::from(identifier);
    if identifier.ends_with(ARTIFACT_SUFFIX) && direct.is_file() {
        return Ok(direct);
    }
    let name = crate::workflows::workflow_name(identifier);
    let path = program_path(programs_dir, &name);
    if !path.is_file() {
        bail!(
            "no compiled program for '{name}' at {}; run `pagewright compile {identifier}` first",
            path.display()
        );
    }
    Ok(path)
}

pub fn load_compiled(programs_dir: &Path, identifier: &str) -> Result<CompiledProgram> {
    let path = locate_program(programs_dir, identifier)?;
    info!(path = %path.display(), "loading compiled program");
    load_program(&path)
}

/// Builds the runtime context for one run. `record` is a batch row when running from `--extract-csv`.
pub fn build_context(program: &CompiledProgram, sources: &ContextSources, record: Option<&BatchRecord>) -> Result<RuntimeContext> {
    let mut context = RuntimeContext::for_program(program).with_start_from_step(sources.start_from);
    for (key, value) in &sources.constants {
        context.constants.entry(key.clone()).or_insert_with(|| value.clone());
    }

    if let Some(path) = &sources.input_path {
        bind_input_path(program, &mut context, path)?;
    }

    if let Some(record) = record {
        for (key, raw) in record {
            match program.inputs.get(key) {
                // Empty input cells fall back to defaults.
                Some(_) if raw.is_empty() => {}
                Some(parameter) => {
                    let value = coerce_input_text(Some(parameter), raw).map_err(|message| anyhow!("batch field '{key}': {message}"))?;
                    context.input.insert(key.clone(), value);
                }
                None => {
                    context.extract.insert(key.clone(), Value::String(raw.clone()));
                }
            }
        }
    }

    for pair in &sources.inputs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--input expects key=value, got '{pair}'"))?;
        let key = key.trim();
        let value = coerce_input_text(program.inputs.get(key), raw).map_err(|message| anyhow!("input '{key}': {message}"))?;
        context.input.insert(key.to_string(), value);
    }

    if let Some(code) = &sources.charge_code {
        context.input.insert("charge_code".into(), Value::String(code.clone()));
    }

    if let Some(text) = &sources.extract {
        let parsed: Value = serde_json::from_str(text).context("--extract must be a JSON object")?;
        let Value::Object(fields) = parsed else {
            bail!("--extract must be a JSON object");
        };
        context.extract.extend(fields);
    }

    context.apply_input_defaults(&program.inputs);
    let missing = context.missing_required_inputs(&program.inputs);
    if !missing.is_empty() {
        bail!("missing required input(s): {}", missing.join(", "));
    }
    for (name, parameter) in &program.inputs {
        if let Some(value) = context.input.get(name) {
            validate_input_value(parameter, value).map_err(|message| anyhow!("input '{name}': {message}"))?;
        }
    }
    Ok(context)
}

fn bind_input_path(program: &CompiledProgram, context: &mut RuntimeContext, path: &Path) -> Result<()> {
    if is_document_path(path) {
        let document = load_workflow_document(path)?;
        let Value::Object(fields) = document else {
            bail!("input file {} must contain a mapping of input values", path.display());
        };
        context.input.extend(fields);
        return Ok(());
    }
    let (name, _) = program
        .inputs
        .iter()
        .find(|(_, parameter)| parameter.accepts_file())
        .ok_or_else(|| anyhow!("workflow '{}' declares no file or image input for {}", program.name, path.display()))?;
    context.input.insert(name.clone(), Value::String(path.display().to_string()));
    Ok(())
}

/// Runs the program, re-running from the same start index while it keeps failing.
pub async fn run_with_retries(
    program: &CompiledProgram,
    context: &RuntimeContext,
    driver: &dyn BrowserDriver,
    policy: RetryPolicy,
) -> Result<ExecutionResult> {
    let mut retries = 0;
    loop {
        let result = run_with_options(program, context, driver, policy.options).await?;
        let Some(failed) = &result.failed_step else {
            return Ok(result);
        };
        if retries >= policy.max_retries {
            warn!(
                step = failed.index,
                name = %failed.name,
                error = %failed.error,
                "retries exhausted; fix the page and resume with --start-from {}",
                failed.index
            );
            return Ok(result);
        }
        retries += 1;
        warn!(
            step = failed.index,
            name = %failed.name,
            error = %failed.error,
            attempt = retries,
            max_retries = policy.max_retries,
            "step failed; retrying"
        );
        if !policy.delay.is_zero() {
            tokio::time::sleep(policy.delay).await;
        }
    }
}

/// Runs once per batch record, continuing past failures. Returns one result per record.
pub async fn run_batch(
    program: &CompiledProgram,
    sources: &ContextSources,
    records: &[BatchRecord],
    driver: &dyn BrowserDriver,
    policy: RetryPolicy,
) -> Vec<Result<ExecutionResult>> {
    let mut outcomes = Vec::with_capacity(records.len());
    for (position, record) in records.iter().enumerate() {
        info!(record = position + 1, total = records.len(), "running batch record");
        let outcome = match build_context(program, sources, Some(record)) {
            Ok(context) => run_with_retries(program, &context, driver, policy).await,
            Err(error) => Err(error),
        };
        match &outcome {
            Ok(result) if result.success => {}
            Ok(_) => warn!(record = position + 1, "batch record failed"),
            Err(error) => warn!(record = position + 1, error = %error, "batch record could not run"),
        }
        outcomes.push(outcome);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewright_engine::{RecordingDriver, compile};
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn receipt_program() -> CompiledProgram {
        compile(&json!({
            "name": "receipt-entry",
            "constants": {"reason": "Entertainment"},
            "input": {
                "receipt": {"type": "image", "required": true},
                "attendees": {"type": "number", "default": 1},
                "charge_code": {"type": "string"}
            },
            "extract": [{"field": "amount", "prompt": "Total amount"}],
            "steps": [
                {"name": "Open", "action": "navigate", "url": "https://expenses.example.com"},
                {"name": "Upload", "action": "file_upload", "selector": "#receipt", "file": "${input.receipt}"},
                {"name": "Amount", "action": "fill", "selector": "#amount", "value": "${extract.amount}"},
                {"name": "Save", "action": "click", "selector": "#save"}
            ]
        }))
        .expect("compile")
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay: Duration::ZERO,
            options: ExecutionOptions::default(),
        }
    }

    #[test]
    fn positional_path_binds_the_file_input() {
        let program = receipt_program();
        let sources = ContextSources {
            input_path: Some(PathBuf::from("/receipts/lunch.jpg")),
            charge_code: Some("CK001".into()),
            ..Default::default()
        };
        let context = build_context(&program, &sources, None).unwrap();
        assert_eq!(context.input["receipt"], json!("/receipts/lunch.jpg"));
        assert_eq!(context.input["charge_code"], json!("CK001"));
        assert_eq!(context.input["attendees"], json!(1));
        assert_eq!(context.constants["reason"], json!("Entertainment"));
    }

    #[test]
    fn document_input_path_merges_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inputs.yaml");
        fs::write(&path, "receipt: /receipts/a.jpg\nattendees: 4\n").unwrap();
        let sources = ContextSources {
            input_path: Some(path),
            ..Default::default()
        };
        let context = build_context(&receipt_program(), &sources, None).unwrap();
        assert_eq!(context.input["receipt"], json!("/receipts/a.jpg"));
        assert_eq!(context.input["attendees"], json!(4));
    }

    #[test]
    fn program_constants_win_over_settings_constants() {
        let mut constants = Map::new();
        constants.insert("reason".into(), json!("Travel"));
        constants.insert("region".into(), json!("EU"));
        let sources = ContextSources {
            inputs: vec!["receipt=/r.jpg".into()],
            constants,
            ..Default::default()
        };
        let context = build_context(&receipt_program(), &sources, None).unwrap();
        assert_eq!(context.constants["reason"], json!("Entertainment"));
        assert_eq!(context.constants["region"], json!("EU"));
    }

    #[test]
    fn missing_required_inputs_refuse_to_run() {
        let error = build_context(&receipt_program(), &ContextSources::default(), None).unwrap_err();
        assert_eq!(error.to_string(), "missing required input(s): receipt");
    }

    #[test]
    fn typed_inputs_are_coerced_and_checked() {
        let sources = ContextSources {
            inputs: vec!["receipt=/r.jpg".into(), "attendees=3".into()],
            extract: Some(r#"{"amount": 15000}"#.into()),
            start_from: 2,
            ..Default::default()
        };
        let context = build_context(&receipt_program(), &sources, None).unwrap();
        assert_eq!(context.input["attendees"], json!(3));
        assert_eq!(context.extract["amount"], json!(15000));
        assert_eq!(context.start_from_step, 2);

        let bad = ContextSources {
            inputs: vec!["receipt=/r.jpg".into(), "attendees=many".into()],
            ..Default::default()
        };
        assert!(build_context(&receipt_program(), &bad, None).is_err());
        let malformed = ContextSources {
            inputs: vec!["receipt".into()],
            ..Default::default()
        };
        assert!(build_context(&receipt_program(), &malformed, None).is_err());
    }

    #[test]
    fn batch_records_split_between_input_and_extract() {
        let mut record = BatchRecord::new();
        record.insert("receipt".into(), "C:\\r\\1.jpg".into());
        record.insert("amount".into(), "5000".into());
        let context = build_context(&receipt_program(), &ContextSources::default(), Some(&record)).unwrap();
        assert_eq!(context.input["receipt"], json!("C:\\r\\1.jpg"));
        assert_eq!(context.extract["amount"], json!("5000"));
    }

    #[test]
    fn locating_programs_requires_an_artifact() {
        let dir = tempdir().unwrap();
        let error = locate_program(dir.path(), "receipt-entry").unwrap_err();
        assert!(error.to_string().contains("run `pagewright compile receipt-entry` first"));

        let path = pagewright_engine::save_program(dir.path(), &receipt_program()).unwrap();
        assert_eq!(locate_program(dir.path(), "receipt-entry").unwrap(), path);
        assert_eq!(locate_program(Path::new("elsewhere"), path.to_str().unwrap()).unwrap(), path);
    }

    #[tokio::test]
    async fn retries_recover_from_transient_failures() {
        let program = receipt_program();
        let sources = ContextSources {
            inputs: vec!["receipt=/r.jpg".into()],
            extract: Some(r#"{"amount": 100}"#.into()),
            ..Default::default()
        };
        let context = build_context(&program, &sources, None).unwrap();
        let driver = RecordingDriver::new().fail_times("click", Some("#save"), 2);

        let result = run_with_retries(&program, &context, &driver, policy(3)).await.unwrap();

        assert!(result.success);
        let navigations = driver
            .calls()
            .iter()
            .filter(|call| call.method() == "navigate")
            .count();
        assert_eq!(navigations, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_the_failing_step() {
        let program = receipt_program();
        let context = RuntimeContext::for_program(&program).with_start_from_step(3);
        let driver = RecordingDriver::new().fail_on("click", Some("#save"));

        let result = run_with_retries(&program, &context, &driver, policy(2)).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.resume_index(), Some(3));
        assert_eq!(driver.calls().len(), 3);
    }

    #[tokio::test]
    async fn batches_continue_after_a_failed_record() {
        let program = receipt_program();
        let records = pagewright_util::parse_batch("receipt,amount\n/r/1.jpg,5000\n,8000\n/r/3.jpg,9000\n").unwrap();
        let driver = RecordingDriver::new();

        let outcomes = run_batch(&program, &ContextSources::default(), &records, &driver, policy(0)).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].as_ref().is_ok_and(|result| result.success));
        assert!(outcomes[1].is_err());
        assert!(outcomes[2].as_ref().is_ok_and(|result| result.success));
    }
}
