use std::path::{Path, PathBuf};

use dirs_next::home_dir;

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        // Windows-style
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Expands `~` in an already-built path; non-UTF-8 paths are returned unchanged.
pub fn expand_tilde_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(text) => expand_tilde(text),
        None => path.to_path_buf(),
    }
}

/// True when the path names a structured document (`.json`, `.yaml`, `.yml`) rather than an arbitrary file.
pub fn is_document_path(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| matches!(extension.to_ascii_lowercase().as_str(), "json" | "yaml" | "yml"))
        .unwrap_or(false)
}
