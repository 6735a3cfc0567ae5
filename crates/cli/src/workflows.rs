//! Workflow discovery and the `list`/`describe` views.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use pagewright_engine::program::program_path;
use pagewright_types::WorkflowDefinition;
use pagewright_util::is_document_path;

const DOCUMENT_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// A workflow document found in the workflows directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Lists workflow documents in `directory`, sorted by name.
pub fn discover_workflows(directory: &Path) -> Result<Vec<WorkflowEntry>> {
    if !directory.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if !path.is_file() || !is_document_path(&path) {
            continue;
        }
        if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
            entries.push(WorkflowEntry {
                name: name.to_string(),
                path,
            });
        }
    }
    entries.sort_by(|left, right| left.name.cmp(&right.name).then_with(|| left.path.cmp(&right.path)));
    Ok(entries)
}

/// Resolves a workflow identifier: an existing file path, or `<directory>/<id>.{yaml,yml,json}`.
pub fn resolve_workflow_path(directory: &Path, identifier: &str) -> Result<PathBuf> {
    let direct = PathBuf::from(identifier);
    if direct.is_file() {
        return Ok(direct);
    }
    let candidates: Vec<PathBuf> = DOCUMENT_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{identifier}.{extension}")))
        .collect();
    if let Some(found) = candidates.iter().find(|candidate| candidate.is_file()) {
        return Ok(found.clone());
    }
    let tried: Vec<String> = candidates.iter().map(|candidate| candidate.display().to_string()).collect();
    bail!("workflow '{identifier}' not found (looked for {})", tried.join(", "))
}

/// Name a workflow identifier refers to: the file stem for paths, the identifier otherwise.
pub fn workflow_name(identifier: &str) -> String {
    let path = Path::new(identifier);
    let stem = path.file_name().and_then(|name| name.to_str()).unwrap_or(identifier);
    stem.strip_suffix(pagewright_engine::program::ARTIFACT_SUFFIX)
        .or_else(|| path.file_stem().and_then(|stem| stem.to_str()).filter(|_| is_document_path(path)))
        .unwrap_or(stem)
        .to_string()
}

/// Renders the `list` view.
pub fn render_list(entries: &[WorkflowEntry], programs_dir: &Path) -> String {
    if entries.is_empty() {
        return "No workflows found\n".to_string();
    }
    let mut output = String::new();
    let width = entries.iter().map(|entry| entry.name.len()).max().unwrap_or(0);
    for entry in entries {
        let status = if program_path(programs_dir, &entry.name).is_file() {
            "compiled"
        } else {
            "not compiled"
        };
        let _ = writeln!(output, "{:width$}  {status}", entry.name);
    }
    output
}

/// One batch column with two sample values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchColumn {
    pub name: String,
    pub description: String,
    pub samples: [String; 2],
}

/// Columns a batch file for this workflow should carry: declared inputs first, then extract fields.
pub fn batch_columns(definition: &WorkflowDefinition) -> Vec<BatchColumn> {
    let inputs = definition.input.iter().map(|(name, parameter)| {
        let samples = if parameter.accepts_file() {
            ["C:\\path\\file1.jpg".to_string(), "C:\\path\\file2.jpg".to_string()]
        } else if let Some(default) = &parameter.default {
            let text = pagewright_engine::driver::value_text(default);
            [text.clone(), text]
        } else {
            ["value1".to_string(), "value2".to_string()]
        };
        BatchColumn {
            name: name.clone(),
            description: parameter.description.clone().unwrap_or_default(),
            samples,
        }
    });
    let extracts = definition.extract.iter().map(|field| {
        let samples = if field.field.contains("amount") {
            ["5000", "8000"]
        } else if field.field.contains("date") {
            ["2025/01/04", "2025/01/05"]
        } else {
            ["Sample1", "Sample2"]
        };
        BatchColumn {
            name: field.field.clone(),
            description: field.summary().to_string(),
            samples: samples.map(str::to_string),
        }
    });
    inputs.chain(extracts).collect()
}

/// Renders the `describe` view for one workflow.
pub fn render_description(definition: &WorkflowDefinition, compiled_at: Option<&Path>) -> String {
    let mut output = String::new();
    let rule = "=".repeat(60);
    let _ = writeln!(output, "{rule}\n{}\n{rule}", definition.name);
    if let Some(description) = &definition.description {
        let _ = writeln!(output, "\n{}", description.trim_end());
    }

    if !definition.constants.is_empty() {
        let _ = writeln!(output, "\nConstants:");
        for (key, value) in &definition.constants {
            let _ = writeln!(output, "  {key}: {value}");
        }
    }

    let columns = batch_columns(definition);
    if !columns.is_empty() {
        let _ = writeln!(output, "\nBatch fields:");
        for column in &columns {
            let _ = writeln!(output, "  {}: {}", column.name, column.description);
        }
    }

    let _ = writeln!(output, "\nUsage:");
    let _ = writeln!(output, "  pagewright run {} <input-path>", definition.name);
    let _ = writeln!(output, "  pagewright run {} --extract-csv data.csv", definition.name);
    if !columns.is_empty() {
        let names: Vec<&str> = columns.iter().map(|column| column.name.as_str()).collect();
        let first: Vec<&str> = columns.iter().map(|column| column.samples[0].as_str()).collect();
        let second: Vec<&str> = columns.iter().map(|column| column.samples[1].as_str()).collect();
        let _ = writeln!(output, "\n  data.csv:");
        let _ = writeln!(output, "    {}", names.join(","));
        let _ = writeln!(output, "    {}", first.join(","));
        let _ = writeln!(output, "    {}", second.join(","));
    }

    match compiled_at {
        Some(path) => {
            let _ = writeln!(output, "\nCompiled program: {}", path.display());
        }
        None => {
            let _ = writeln!(
                output,
                "\nNot compiled yet: run `pagewright compile {}` before running it",
                definition.name
            );
        }
    }
    output
}
