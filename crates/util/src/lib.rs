//! Helpers shared by the Pagewright runner: settings, path handling and batch input files.

pub mod batch;
pub mod path_processing;
pub mod settings;

pub use batch::{BatchError, BatchRecord, load_batch, parse_batch};
pub use path_processing::{expand_tilde, expand_tilde_path, is_document_path};
pub use settings::{RunnerSettings, SettingsError, default_settings_path};
