use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pagewright_engine::program::{program_path, write_program};
use pagewright_engine::{
    BrowserDriver, CompileError, CompiledProgram, ExecutionOptions, ExecutionResult, RecordingDriver, SchemaViolation, compile,
    load_workflow_document, save_program, validate,
};
use pagewright_types::WorkflowDefinition;
use pagewright_util::{BatchRecord, RunnerSettings, load_batch};
use tracing::{Level, info};

#[cfg(feature = "chrome")]
mod chrome;
mod runner;
mod workflows;

use runner::{ContextSources, RetryPolicy};

/// Compile and run declarative browser workflows.
#[derive(Parser, Debug)]
#[command(name = "pagewright", version, about)]
struct Cli {
    /// Directory holding workflow documents (overrides settings)
    #[arg(long, global = true)]
    workflows_dir: Option<PathBuf>,

    /// Directory holding compiled programs (overrides settings)
    #[arg(long, global = true)]
    programs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List workflows and whether they have been compiled
    List,
    /// Show a workflow's description, constants and batch fields
    Describe { workflow: String },
    /// Check a workflow document and print every violation
    Validate { workflow: String },
    /// Validate and compile a workflow into a program artifact
    Compile(CompileArgs),
    /// Run a compiled workflow
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct CompileArgs {
    workflow: String,

    /// Write the artifact here instead of the programs directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the program listing instead of writing an artifact
    #[arg(long)]
    listing: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    workflow: String,

    /// File bound to the workflow's file input, or a JSON/YAML file of input values
    input_path: Option<PathBuf>,

    /// Run once per record of this batch file
    #[arg(long)]
    extract_csv: Option<PathBuf>,

    /// JSON object merged into the extract scope
    #[arg(long)]
    extract: Option<String>,

    /// Input value as key=value (repeatable)
    #[arg(long = "input", value_name = "KEY=VALUE")]
    inputs: Vec<String>,

    #[arg(long)]
    max_retries: Option<u32>,

    /// Zero-based index of the first step to run
    #[arg(long, default_value_t = 0)]
    start_from: usize,

    /// Bound to input.charge_code
    #[arg(long)]
    charge_code: Option<String>,

    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Fail any step that takes longer than this
    #[arg(long)]
    step_deadline_ms: Option<u64>,

    #[arg(long)]
    headless: bool,

    /// Record driver calls instead of opening a browser
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run_cli().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_cli() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut settings = RunnerSettings::load()?;
    if let Some(directory) = cli.workflows_dir {
        settings.workflows_dir = directory;
    }
    if let Some(directory) = cli.programs_dir {
        settings.programs_dir = directory;
    }

    match cli.command {
        Command::List => {
            let entries = workflows::discover_workflows(&settings.workflows_dir)?;
            print!("{}", workflows::render_list(&entries, &settings.programs_dir));
            Ok(ExitCode::SUCCESS)
        }
        Command::Describe { workflow } => describe(&settings, &workflow),
        Command::Validate { workflow } => validate_command(&settings, &workflow),
        Command::Compile(args) => compile_command(&settings, args),
        Command::Run(args) => run_command(&settings, args).await,
    }
}

fn describe(settings: &RunnerSettings, workflow: &str) -> Result<ExitCode> {
    let path = workflows::resolve_workflow_path(&settings.workflows_dir, workflow)?;
    let document = load_workflow_document(&path)?;
    let definition: WorkflowDefinition =
        serde_json::from_value(document).with_context(|| format!("Failed to decode workflow: {}", path.display()))?;
    let artifact = program_path(&settings.programs_dir, &definition.name);
    let compiled = artifact.is_file().then_some(artifact.as_path());
    print!("{}", workflows::render_description(&definition, compiled));
    Ok(ExitCode::SUCCESS)
}

fn print_violations(violations: &[SchemaViolation]) {
    println!("Validation failed with {} error(s):", violations.len());
    for violation in violations {
        println!("\n  Path: {}", violation.path);
        println!("  Error: {}", violation.message);
        println!("  Details: {}", violation.params);
    }
}

fn validate_command(settings: &RunnerSettings, workflow: &str) -> Result<ExitCode> {
    let path = workflows::resolve_workflow_path(&settings.workflows_dir, workflow)?;
    let report = validate(&load_workflow_document(&path)?);
    if report.valid {
        println!("{} is valid", path.display());
        return Ok(ExitCode::SUCCESS);
    }
    print_violations(&report.errors);
    Ok(ExitCode::FAILURE)
}

fn compile_command(settings: &RunnerSettings, args: CompileArgs) -> Result<ExitCode> {
    let path = workflows::resolve_workflow_path(&settings.workflows_dir, &args.workflow)?;
    let document = load_workflow_document(&path)?;
    let program = match compile(&document) {
        Ok(program) => program,
        Err(CompileError::SchemaValidation { errors }) => {
            print_violations(&errors);
            return Ok(ExitCode::FAILURE);
        }
        Err(error) => return Err(error).with_context(|| format!("Failed to compile {}", path.display())),
    };

    if args.listing {
        print!("{}", program.listing());
        return Ok(ExitCode::SUCCESS);
    }
    let written = match args.output {
        Some(output) => {
            write_program(&output, &program)?;
            output
        }
        None => save_program(&settings.programs_dir, &program)?,
    };
    info!(steps = program.len(), path = %written.display(), "compiled workflow");
    println!("Compiled {} ({} steps) -> {}", program.name, program.len(), written.display());
    Ok(ExitCode::SUCCESS)
}

async fn run_command(settings: &RunnerSettings, args: RunArgs) -> Result<ExitCode> {
    let program = runner::load_compiled(&settings.programs_dir, &args.workflow)?;
    let records = args.extract_csv.as_deref().map(load_batch).transpose()?;
    let sources = ContextSources {
        input_path: args.input_path,
        inputs: args.inputs,
        charge_code: args.charge_code,
        extract: args.extract,
        start_from: args.start_from,
        constants: settings.constants.clone(),
    };
    let step_deadline = args.step_deadline_ms.map(Duration::from_millis).or(settings.step_deadline());
    let policy = RetryPolicy {
        max_retries: args.max_retries.unwrap_or(settings.max_retries),
        delay: args.retry_delay_ms.map(Duration::from_millis).unwrap_or(settings.retry_delay()),
        options: ExecutionOptions::default().with_step_deadline(step_deadline),
    };

    if args.dry_run {
        let driver = RecordingDriver::new();
        let success = execute(&program, &sources, records.as_deref(), &driver, policy).await?;
        for call in driver.calls() {
            println!("{}", serde_json::to_string(&call)?);
        }
        return Ok(exit_code(success));
    }

    let driver = launch_browser(args.headless || settings.headless)?;
    let success = execute(&program, &sources, records.as_deref(), driver.as_ref(), policy).await?;
    Ok(exit_code(success))
}

/// Runs a single context or a whole batch and prints each result. Returns true when every run succeeded.
async fn execute(
    program: &CompiledProgram,
    sources: &ContextSources,
    records: Option<&[BatchRecord]>,
    driver: &dyn BrowserDriver,
    policy: RetryPolicy,
) -> Result<bool> {
    let Some(records) = records else {
        let context = runner::build_context(program, sources, None)?;
        let result = runner::run_with_retries(program, &context, driver, policy).await?;
        print_result(&result)?;
        return Ok(result.success);
    };

    let outcomes = runner::run_batch(program, sources, records, driver, policy).await;
    let mut failed = 0;
    for (position, outcome) in outcomes.iter().enumerate() {
        match outcome {
            Ok(result) => {
                print_result(result)?;
                if !result.success {
                    failed += 1;
                }
            }
            Err(error) => {
                eprintln!("Record {}: {error:#}", position + 1);
                failed += 1;
            }
        }
    }
    println!("{} of {} record(s) succeeded", outcomes.len() - failed, outcomes.len());
    Ok(failed == 0)
}

fn print_result(result: &ExecutionResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    if let Some(failed) = &result.failed_step {
        eprintln!(
            "Step {} ({}) failed: {}. Resume with --start-from {}",
            failed.index, failed.name, failed.error, failed.index
        );
        if let Some(hint) = &failed.hint {
            eprintln!("Hint: {hint}");
        }
    }
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

#[cfg(feature = "chrome")]
fn launch_browser(headless: bool) -> Result<Box<dyn BrowserDriver>> {
    Ok(Box::new(chrome::ChromeDriver::launch(headless)?))
}

#[cfg(not(feature = "chrome"))]
fn launch_browser(_headless: bool) -> Result<Box<dyn BrowserDriver>> {
    anyhow::bail!("this build has no browser support; rebuild with the `chrome` feature or pass --dry-run")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::parse_from([
            "pagewright",
            "run",
            "receipt-entry",
            "receipts/lunch.jpg",
            "--input",
            "attendees=3",
            "--input",
            "note=team lunch",
            "--start-from",
            "4",
            "--charge-code",
            "CK001",
            "--dry-run",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.workflow, "receipt-entry");
        assert_eq!(args.input_path, Some(PathBuf::from("receipts/lunch.jpg")));
        assert_eq!(args.inputs, vec!["attendees=3", "note=team lunch"]);
        assert_eq!(args.start_from, 4);
        assert_eq!(args.charge_code.as_deref(), Some("CK001"));
        assert!(args.dry_run);
        assert_eq!(args.max_retries, None);
    }

    #[test]
    fn compile_flags_parse() {
        let cli = Cli::parse_from(["pagewright", "--programs-dir", "out", "compile", "lamp-search", "--listing"]);
        assert_eq!(cli.programs_dir, Some(PathBuf::from("out")));
        let Command::Compile(args) = cli.command else {
            panic!("expected compile");
        };
        assert!(args.listing);
        assert!(args.output.is_none());
    }
}
