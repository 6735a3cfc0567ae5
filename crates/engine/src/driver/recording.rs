//! Driver that records calls instead of automating a browser.
//!
//! Used by tests and by dry runs. Failures and script results can be programmed ahead of a run.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{BrowserDriver, DriverError};
use crate::context::RuntimeContext;

/// One call received by a [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DriverCall {
    Navigate { url: String },
    WaitForLoad,
    Fill { selector: String, value: Value },
    Click { selector: String },
    Press { selector: String, key: String },
    TypeText { text: Value },
    SelectOption { selector: String, value: Value },
    SetFiles { selector: String, files: Value },
    WaitForSelector { selector: String, timeout_ms: u64 },
    RunScript { code: String },
}

impl DriverCall {
    /// Method name as used by [`RecordingDriver::fail_on`].
    pub fn method(&self) -> &'static str {
        match self {
            DriverCall::Navigate { .. } => "navigate",
            DriverCall::WaitForLoad => "wait_for_load",
            DriverCall::Fill { .. } => "fill",
            DriverCall::Click { .. } => "click",
            DriverCall::Press { .. } => "press",
            DriverCall::TypeText { .. } => "type_text",
            DriverCall::SelectOption { .. } => "select_option",
            DriverCall::SetFiles { .. } => "set_files",
            DriverCall::WaitForSelector { .. } => "wait_for_selector",
            DriverCall::RunScript { .. } => "run_script",
        }
    }

    pub fn selector(&self) -> Option<&str> {
        match self {
            DriverCall::Fill { selector, .. }
            | DriverCall::Click { selector }
            | DriverCall::Press { selector, .. }
            | DriverCall::SelectOption { selector, .. }
            | DriverCall::SetFiles { selector, .. }
            | DriverCall::WaitForSelector { selector, .. } => Some(selector),
            DriverCall::Navigate { .. } | DriverCall::WaitForLoad | DriverCall::TypeText { .. } | DriverCall::RunScript { .. } => None,
        }
    }
}

#[derive(Debug)]
struct PlannedFailure {
    method: String,
    selector: Option<String>,
    /// `None` fails every matching call.
    remaining: Option<usize>,
}

impl PlannedFailure {
    fn matches(&self, call: &DriverCall) -> bool {
        self.method == call.method()
            && self.remaining != Some(0)
            && match &self.selector {
                Some(selector) => call.selector() == Some(selector.as_str()),
                None => true,
            }
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<DriverCall>,
    failures: Vec<PlannedFailure>,
}

/// In-memory [`BrowserDriver`] that appends every call to a log.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    state: Mutex<RecordingState>,
    script_result: Option<Value>,
    delay: Option<Duration>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to `method` fail (optionally only for `selector`).
    pub fn fail_on(self, method: &str, selector: Option<&str>) -> Self {
        self.plan_failure(method, selector, None)
    }

    /// Makes the first `times` matching calls fail, after which they succeed.
    pub fn fail_times(self, method: &str, selector: Option<&str>, times: usize) -> Self {
        self.plan_failure(method, selector, Some(times))
    }

    /// Value returned by every `run_script` call.
    pub fn with_script_result(mut self, result: Value) -> Self {
        self.script_result = Some(result);
        self
    }

    /// Sleeps before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Snapshot of the calls received so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.lock().calls.clone()
    }

    /// Forgets recorded calls; planned failures keep their remaining counts.
    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    fn plan_failure(self, method: &str, selector: Option<&str>, remaining: Option<usize>) -> Self {
        self.lock().failures.push(PlannedFailure {
            method: method.to_string(),
            selector: selector.map(str::to_string),
            remaining,
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn record(&self, call: DriverCall) -> Result<(), DriverError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        let failure = state.failures.iter_mut().find(|failure| failure.matches(&call)).map(|failure| {
            if let Some(remaining) = failure.remaining.as_mut() {
                *remaining -= 1;
            }
        });
        let error = failure.map(|_| match call.selector() {
            Some(selector) => DriverError::ElementNotFound {
                selector: selector.to_string(),
            },
            None => DriverError::Other(format!("{} failed", call.method())),
        });
        state.calls.push(call);
        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BrowserDriver for RecordingDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.record(DriverCall::Navigate { url: url.to_string() }).await
    }

    async fn wait_for_load(&self) -> Result<(), DriverError> {
        self.record(DriverCall::WaitForLoad).await
    }

    async fn fill(&self, selector: &str, value: &Value) -> Result<(), DriverError> {
        self.record(DriverCall::Fill {
            selector: selector.to_string(),
            value: value.clone(),
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        self.record(DriverCall::Click {
            selector: selector.to_string(),
        })
        .await
    }

    async fn press(&self, selector: &str, key: &str) -> Result<(), DriverError> {
        self.record(DriverCall::Press {
            selector: selector.to_string(),
            key: key.to_string(),
        })
        .await
    }

    async fn type_text(&self, text: &Value) -> Result<(), DriverError> {
        self.record(DriverCall::TypeText { text: text.clone() }).await
    }

    async fn select_option(&self, selector: &str, value: &Value) -> Result<(), DriverError> {
        self.record(DriverCall::SelectOption {
            selector: selector.to_string(),
            value: value.clone(),
        })
        .await
    }

    async fn set_files(&self, selector: &str, files: &Value) -> Result<(), DriverError> {
        self.record(DriverCall::SetFiles {
            selector: selector.to_string(),
            files: files.clone(),
        })
        .await
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), DriverError> {
        self.record(DriverCall::WaitForSelector {
            selector: selector.to_string(),
            timeout_ms,
        })
        .await
    }

    async fn run_script(&self, code: &str, _context: &RuntimeContext) -> Result<Option<Value>, DriverError> {
        self.record(DriverCall::RunScript { code: code.to_string() }).await?;
        Ok(self.script_result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_calls_in_order() {
        let driver = RecordingDriver::new();
        driver.navigate("https://example.com").await.unwrap();
        driver.fill("#q", &json!("lamp")).await.unwrap();
        driver.click("#go").await.unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::Navigate {
                    url: "https://example.com".into()
                },
                DriverCall::Fill {
                    selector: "#q".into(),
                    value: json!("lamp")
                },
                DriverCall::Click { selector: "#go".into() },
            ]
        );
    }

    #[tokio::test]
    async fn planned_failures_match_method_and_selector() {
        let driver = RecordingDriver::new().fail_on("click", Some("#missing"));
        assert!(driver.click("#present").await.is_ok());
        let error = driver.click("#missing").await.unwrap_err();
        assert_eq!(
            error,
            DriverError::ElementNotFound {
                selector: "#missing".into()
            }
        );
        assert_eq!(driver.calls().len(), 2);
    }

    #[tokio::test]
    async fn limited_failures_recover() {
        let driver = RecordingDriver::new().fail_times("navigate", None, 1);
        assert!(driver.navigate("https://example.com").await.is_err());
        assert!(driver.navigate("https://example.com").await.is_ok());
    }

    #[tokio::test]
    async fn script_result_is_returned() {
        let driver = RecordingDriver::new().with_script_result(json!({"total": 3}));
        let result = driver.run_script("return 3;", &RuntimeContext::default()).await.unwrap();
        assert_eq!(result, Some(json!({"total": 3})));
    }
}
