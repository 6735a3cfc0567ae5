//! Closed set of step action kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Legacy spelling of [`ActionKind::RawCode`] still accepted in authored documents.
pub const RAW_CODE_ALIAS: &str = "playwright_code";

/// One variant per supported step action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Fill,
    Click,
    Press,
    Type,
    Select,
    FileUpload,
    Wait,
    RawCode,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::Navigate,
        ActionKind::Fill,
        ActionKind::Click,
        ActionKind::Press,
        ActionKind::Type,
        ActionKind::Select,
        ActionKind::FileUpload,
        ActionKind::Wait,
        ActionKind::RawCode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Fill => "fill",
            ActionKind::Click => "click",
            ActionKind::Press => "press",
            ActionKind::Type => "type",
            ActionKind::Select => "select",
            ActionKind::FileUpload => "file_upload",
            ActionKind::Wait => "wait",
            ActionKind::RawCode => "raw_code",
        }
    }

    /// Parses an authored action identifier, accepting the legacy `playwright_code` alias.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == RAW_CODE_ALIAS {
            return Some(ActionKind::RawCode);
        }
        ActionKind::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }

    /// Canonical identifiers in declaration order, as listed in unknown-action diagnostics.
    pub fn valid_names() -> Vec<&'static str> {
        ActionKind::ALL.iter().map(|kind| kind.as_str()).collect()
    }

    /// Step fields that must be present for this action.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            ActionKind::Navigate => &["url"],
            ActionKind::Fill | ActionKind::Select => &["selector", "value"],
            ActionKind::Click | ActionKind::Wait => &["selector"],
            ActionKind::Press => &["selector", "key"],
            ActionKind::Type => &["value"],
            ActionKind::FileUpload => &["selector", "file"],
            ActionKind::RawCode => &["code"],
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
