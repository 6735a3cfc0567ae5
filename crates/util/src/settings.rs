//! Runner settings persisted as JSON.
//!
//! Settings live in the standard configuration directory (`~/.config/pagewright/settings.json` on most platforms)
//! unless `PAGEWRIGHT_SETTINGS_PATH` points elsewhere. A missing file yields defaults; an unreadable JSON payload is
//! logged and also yields defaults so a broken file never blocks a run. Command-line flags override these values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::expand_tilde;
use crate::path_processing::expand_tilde_path;

/// Environment variable allowing callers to override the settings file path.
pub const SETTINGS_PATH_ENV: &str = "PAGEWRIGHT_SETTINGS_PATH";

/// Default filename for the JSON payload.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Retries per failing step when nothing else is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Pause between retries when nothing else is configured.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Error surfaced when reading settings fails.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// I/O failure other than a missing file (for example, permissions).
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persisted runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Directory searched for `<name>.yaml|yml|json` workflow documents.
    pub workflows_dir: PathBuf,
    /// Directory holding compiled `<name>.program.json` artifacts.
    pub programs_dir: PathBuf,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Launch the browser without a window.
    pub headless: bool,
    /// Optional upper bound for a single step, in milliseconds.
    pub step_deadline_ms: Option<u64>,
    /// Extra constants layered under each workflow's own constants.
    pub constants: Map<String, Value>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            workflows_dir: PathBuf::from("workflows"),
            programs_dir: PathBuf::from("generated"),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            headless: false,
            step_deadline_ms: None,
            constants: Map::new(),
        }
    }
}

impl RunnerSettings {
    /// Loads settings from the default location.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&default_settings_path())
    }

    /// Loads settings from `path`, falling back to defaults when the file is absent or unparsable.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let settings = match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<RunnerSettings>(&data) {
                Ok(settings) => settings,
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        error = %error,
                        "Failed to parse settings file; using defaults"
                    );
                    RunnerSettings::default()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => RunnerSettings::default(),
            Err(error) => return Err(SettingsError::Io(error)),
        };
        Ok(settings.with_expanded_paths())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn step_deadline(&self) -> Option<Duration> {
        self.step_deadline_ms.map(Duration::from_millis)
    }

    fn with_expanded_paths(mut self) -> Self {
        self.workflows_dir = expand_tilde_path(&self.workflows_dir);
        self.programs_dir = expand_tilde_path(&self.programs_dir);
        self
    }
}

/// Resolves the settings file location, honouring [`SETTINGS_PATH_ENV`].
pub fn default_settings_path() -> PathBuf {
    if let Ok(path) = env::var(SETTINGS_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pagewright")
        .join(SETTINGS_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = RunnerSettings::load_from(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, RunnerSettings::default());
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_delay(), Duration::from_millis(2000));
        assert_eq!(settings.step_deadline(), None);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"max_retries": 5, "headless": true, "constants": {"charge_code": "CK001"}}"#).unwrap();

        let settings = RunnerSettings::load_from(&path).unwrap();
        assert_eq!(settings.max_retries, 5);
        assert!(settings.headless);
        assert_eq!(settings.constants.get("charge_code"), Some(&json!("CK001")));
        assert_eq!(settings.programs_dir, PathBuf::from("generated"));
    }

    #[test]
    fn invalid_json_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(RunnerSettings::load_from(&path).unwrap(), RunnerSettings::default());
    }

    #[test]
    fn written_settings_load_back_with_tilde_expansion() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = RunnerSettings {
            programs_dir: PathBuf::from("~/pagewright/generated"),
            step_deadline_ms: Some(45_000),
            retry_delay_ms: 10,
            ..Default::default()
        };
        fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();

        let loaded = RunnerSettings::load_from(&path).unwrap();
        assert_eq!(loaded.programs_dir, expand_tilde("~/pagewright/generated"));
        assert_eq!(loaded.step_deadline(), Some(Duration::from_millis(45_000)));
        assert_eq!(loaded.retry_delay_ms, 10);
    }

    #[test]
    fn default_path_honors_env_override() {
        let override_path = "~/custom/pagewright.json";
        temp_env::with_var(SETTINGS_PATH_ENV, Some(override_path), || {
            assert_eq!(default_settings_path(), expand_tilde(override_path));
        });
    }
}
