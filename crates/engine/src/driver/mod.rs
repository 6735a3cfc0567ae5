//! Browser automation capability the execution engine drives.
//!
//! The engine never assumes more than [`BrowserDriver`]. Implementations live outside the engine (a Chrome-backed
//! driver in the binary) apart from [`RecordingDriver`], which records calls for tests and dry runs.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::context::RuntimeContext;

pub mod blocking;
pub mod recording;

pub use blocking::BlockingLane;
pub use recording::{DriverCall, RecordingDriver};

/// Errors reported by a driver call. The message becomes `failedStep.error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("no element matches selector '{selector}'")]
    ElementNotFound { selector: String },

    #[error("timed out after {timeout_ms} ms waiting for '{selector}'")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("navigation to '{url}' failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("script failed: {0}")]
    Script(String),

    #[error("driver does not support {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

/// Operations a browser automation backend exposes to compiled steps.
///
/// Calls for a single run are issued strictly one at a time; a driver instance is never shared between runs that are
/// in flight. A step deadline may stop waiting on a call before the driver has finished it, so implementations that
/// hand work to other threads run it through a [`BlockingLane`].
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Loads a page.
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Waits for the initial content-load signal of the current page.
    async fn wait_for_load(&self) -> Result<(), DriverError>;

    /// Sets the value of the field at `selector`.
    async fn fill(&self, selector: &str, value: &Value) -> Result<(), DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// Dispatches a key press to the element at `selector`.
    async fn press(&self, selector: &str, key: &str) -> Result<(), DriverError>;

    /// Emits keystrokes for `text` into the focused element.
    async fn type_text(&self, text: &Value) -> Result<(), DriverError>;

    /// Chooses the option with `value` in the select element at `selector`.
    async fn select_option(&self, selector: &str, value: &Value) -> Result<(), DriverError>;

    /// Attaches one path (string) or several (array of strings) to the file input at `selector`.
    async fn set_files(&self, selector: &str, files: &Value) -> Result<(), DriverError>;

    /// Blocks until `selector` is present or `timeout_ms` elapses.
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), DriverError>;

    /// Escape hatch for arbitrary driver calls. `code` is passed through untouched; the context is made available to
    /// it as `extract`, `input` and `constants`. Returns the script's result, if it produced one.
    async fn run_script(&self, code: &str, context: &RuntimeContext) -> Result<Option<Value>, DriverError>;
}

/// Text form of a value sent to a field: strings as-is, other scalars as their JSON text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Paths named by a `set_files` argument.
pub fn file_list(files: &Value) -> Result<Vec<String>, DriverError> {
    match files {
        Value::String(path) => Ok(vec![path.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| DriverError::Other(format!("file list entries must be paths, got {item}")))
            })
            .collect(),
        other => Err(DriverError::Other(format!("file argument must be a path or a list of paths, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_text_keeps_strings_raw() {
        assert_eq!(value_text(&json!("lamp")), "lamp");
        assert_eq!(value_text(&json!(42)), "42");
        assert_eq!(value_text(&json!(false)), "false");
        assert_eq!(value_text(&Value::Null), "");
    }

    #[test]
    fn file_list_accepts_single_and_many() {
        assert_eq!(file_list(&json!("/tmp/a.png")).unwrap(), vec!["/tmp/a.png"]);
        assert_eq!(file_list(&json!(["/tmp/a.png", "/tmp/b.png"])).unwrap().len(), 2);
        assert!(file_list(&json!(7)).is_err());
        assert!(file_list(&json!(["/tmp/a.png", 7])).is_err());
    }
}
