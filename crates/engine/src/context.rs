//! Runtime context supplied to a run.
//!
//! A [`RuntimeContext`] carries the three independent value scopes steps can reference (`extract`, `input`,
//! `constants`) plus the index the run should start from. References into it are written `scope.name` and may
//! continue with further dotted segments to reach into objects and arrays.

use std::fmt;

use indexmap::IndexMap;
use pagewright_types::InputParameter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::program::CompiledProgram;

/// Value scope a reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Extract,
    Input,
    Constants,
}

impl Scope {
    /// Every scope, in the order they are documented.
    pub const ALL: [Scope; 3] = [Scope::Extract, Scope::Input, Scope::Constants];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Extract => "extract",
            Scope::Input => "input",
            Scope::Constants => "constants",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Scope::ALL.into_iter().find(|scope| scope.as_str() == raw)
    }
}

/// A reference such as `input.keyword` or `extract.receipt.total`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableRef {
    pub scope: Scope,
    /// Non-empty list of identifier segments after the scope.
    pub path: Vec<String>,
}

impl VariableRef {
    pub fn new(scope: Scope, name: impl Into<String>) -> Self {
        Self {
            scope,
            path: vec![name.into()],
        }
    }

    /// Parses a dotted reference. Every segment after the scope must be an identifier
    /// (`[A-Za-z_][A-Za-z0-9_]*`) or an array index.
    pub fn parse_dotted(raw: &str) -> Option<Self> {
        let mut segments = raw.trim().split('.');
        let scope = Scope::parse(segments.next()?)?;
        let path: Vec<String> = segments.map(str::to_string).collect();
        if path.is_empty() || !path.iter().all(|segment| is_path_segment(segment)) {
            return None;
        }
        Some(Self { scope, path })
    }
}

impl fmt::Display for VariableRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}", self.scope.as_str(), self.path.join("."))
    }
}

fn is_path_segment(segment: &str) -> bool {
    if !segment.is_empty() && segment.chars().all(|character| character.is_ascii_digit()) {
        return true;
    }
    let mut characters = segment.chars();
    match characters.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    characters.all(|character| character.is_ascii_alphanumeric() || character == '_')
}

/// Values available to a run plus the resume cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeContext {
    pub extract: Map<String, Value>,
    pub constants: Map<String, Value>,
    pub input: Map<String, Value>,
    /// Zero-based index of the first step to attempt.
    pub start_from_step: usize,
}

impl RuntimeContext {
    /// Builds a context whose `constants` scope is seeded from the program's declared constants.
    pub fn for_program(program: &CompiledProgram) -> Self {
        let constants = program.constants.iter().map(|(key, value)| (key.clone(), value.clone())).collect();
        Self {
            constants,
            ..Default::default()
        }
    }

    pub fn with_start_from_step(mut self, start_from_step: usize) -> Self {
        self.start_from_step = start_from_step;
        self
    }

    pub fn scope(&self, scope: Scope) -> &Map<String, Value> {
        match scope {
            Scope::Extract => &self.extract,
            Scope::Input => &self.input,
            Scope::Constants => &self.constants,
        }
    }

    pub fn scope_mut(&mut self, scope: Scope) -> &mut Map<String, Value> {
        match scope {
            Scope::Extract => &mut self.extract,
            Scope::Input => &mut self.input,
            Scope::Constants => &mut self.constants,
        }
    }

    /// Resolves a reference, navigating nested objects by key and arrays by numeric index.
    ///
    /// Returns `None` when any segment is absent.
    pub fn lookup(&self, reference: &VariableRef) -> Option<&Value> {
        let (first, rest) = reference.path.split_first()?;
        let mut current = self.scope(reference.scope).get(first)?;
        for segment in rest {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Fills declared input defaults for keys the caller did not provide.
    pub fn apply_input_defaults(&mut self, parameters: &IndexMap<String, InputParameter>) {
        for (name, parameter) in parameters {
            if let Some(default) = &parameter.default
                && !self.input.contains_key(name)
            {
                self.input.insert(name.clone(), default.clone());
            }
        }
    }

    /// Lists declared `required` inputs that are still absent (or null), in declaration order.
    pub fn missing_required_inputs(&self, parameters: &IndexMap<String, InputParameter>) -> Vec<String> {
        parameters
            .iter()
            .filter(|(name, parameter)| parameter.required && self.input.get(name.as_str()).is_none_or(Value::is_null))
            .map(|(name, _)| name.clone())
            .collect()
    }
}
