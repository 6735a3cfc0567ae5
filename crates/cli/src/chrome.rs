//! Chrome-backed [`BrowserDriver`].
//!
//! `headless_chrome` calls block, so each driver call runs on the blocking pool with a shared handle to the tab. Calls
//! go through a [`BlockingLane`], so one abandoned by a step deadline finishes before the next one touches the tab.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use pagewright_engine::driver::{file_list, value_text};
use pagewright_engine::{BlockingLane, BrowserDriver, DriverError, RuntimeContext};
use serde_json::Value;
use tracing::debug;

/// Chrome closes itself after this long without protocol traffic; retry pauses must stay well below it.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

pub struct ChromeDriver {
    // Dropping the browser closes the window.
    _browser: Browser,
    tab: Arc<Tab>,
    lane: BlockingLane,
}

impl ChromeDriver {
    pub fn launch(headless: bool) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(headless)
            .args(vec![OsStr::new("--start-maximized"), OsStr::new("--disable-dev-shm-usage")])
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .build()
            .map_err(|error| anyhow::anyhow!("invalid browser launch options: {error}"))?;
        let browser = Browser::new(launch_options).context("Failed to launch Chrome")?;
        let tab = browser.new_tab().context("Failed to open a browser tab")?;
        debug!(headless, "launched chrome");
        Ok(Self {
            _browser: browser,
            tab,
            lane: BlockingLane::new(),
        })
    }

    async fn with_tab<T, F>(&self, job: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, DriverError> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        self.lane.run(move || job(&tab)).await
    }
}

/// Evaluates `script` and requires it to return `true`; anything else means the selector matched nothing.
fn evaluate_on_element(tab: &Tab, script: &str, selector: &str) -> Result<(), DriverError> {
    let result = tab
        .evaluate(script, false)
        .map_err(|error| DriverError::Script(error.to_string()))?;
    match result.value {
        Some(Value::Bool(true)) => Ok(()),
        _ => Err(DriverError::ElementNotFound {
            selector: selector.to_string(),
        }),
    }
}

fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// Script that sets a field's value through the element prototype's `value` setter, which updates the value tracker
/// React-style frameworks compare against when the `input` event arrives, then dispatches `input` and `change`.
fn fill_script(selector: &str, value: &Value) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); if (!el) return false; el.focus(); \
         const proto = [HTMLInputElement, HTMLTextAreaElement, HTMLSelectElement] \
           .map(kind => kind.prototype).find(candidate => candidate.isPrototypeOf(el)); \
         const setter = proto && Object.getOwnPropertyDescriptor(proto, 'value').set; \
         if (setter) {{ setter.call(el, {value}); }} else {{ el.value = {value}; }} \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
        js_string(selector),
        value = js_string(&value_text(value))
    )
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&url).map_err(|error| DriverError::Navigation {
                url: url.clone(),
                reason: error.to_string(),
            })?;
            Ok(())
        })
        .await
    }

    async fn wait_for_load(&self) -> Result<(), DriverError> {
        self.with_tab(|tab| {
            tab.wait_until_navigated().map_err(|error| DriverError::Navigation {
                url: tab.get_url(),
                reason: error.to_string(),
            })?;
            Ok(())
        })
        .await
    }

    async fn fill(&self, selector: &str, value: &Value) -> Result<(), DriverError> {
        let selector = selector.to_string();
        let script = fill_script(&selector, value);
        self.with_tab(move |tab| evaluate_on_element(tab, &script, &selector)).await
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            let element = tab.find_element(&selector).map_err(|_| DriverError::ElementNotFound {
                selector: selector.clone(),
            })?;
            element.click().map_err(|error| DriverError::Other(error.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn press(&self, selector: &str, key: &str) -> Result<(), DriverError> {
        let selector = selector.to_string();
        let key = key.to_string();
        self.with_tab(move |tab| {
            let element = tab.find_element(&selector).map_err(|_| DriverError::ElementNotFound {
                selector: selector.clone(),
            })?;
            element.focus().map_err(|error| DriverError::Other(error.to_string()))?;
            tab.press_key(&key).map_err(|error| DriverError::Other(error.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn type_text(&self, text: &Value) -> Result<(), DriverError> {
        let text = value_text(text);
        self.with_tab(move |tab| {
            tab.type_str(&text).map_err(|error| DriverError::Other(error.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn select_option(&self, selector: &str, value: &Value) -> Result<(), DriverError> {
        let selector = selector.to_string();
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; \
             const option = Array.from(el.options || []).find(o => o.value === {value} || o.label === {value}); \
             if (!option) return false; el.value = option.value; \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            js_string(&selector),
            value = js_string(&value_text(value))
        );
        self.with_tab(move |tab| evaluate_on_element(tab, &script, &selector)).await
    }

    async fn set_files(&self, selector: &str, files: &Value) -> Result<(), DriverError> {
        let selector = selector.to_string();
        let paths = file_list(files)?;
        self.with_tab(move |tab| {
            let element = tab.find_element(&selector).map_err(|_| DriverError::ElementNotFound {
                selector: selector.clone(),
            })?;
            let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
            element.set_input_files(&paths).map_err(|error| DriverError::Other(error.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), DriverError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, Duration::from_millis(timeout_ms))
                .map_err(|_| DriverError::Timeout {
                    selector: selector.clone(),
                    timeout_ms,
                })?;
            Ok(())
        })
        .await
    }

    async fn run_script(&self, code: &str, context: &RuntimeContext) -> Result<Option<Value>, DriverError> {
        let scope = |map: &serde_json::Map<String, Value>| Value::Object(map.clone()).to_string();
        let script = format!(
            "(async () => {{ const extract = {}; const input = {}; const constants = {};\n{code}\n}})()",
            scope(&context.extract),
            scope(&context.input),
            scope(&context.constants),
        );
        self.with_tab(move |tab| {
            let result = tab
                .evaluate(&script, true)
                .map_err(|error| DriverError::Script(error.to_string()))?;
            Ok(result.value)
        })
        .await
    }
}
