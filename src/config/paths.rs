//! Configuration paths
//!
//! Utilities for resolving configuration file paths.

use std::path::PathBuf;

/// Get the configuration directory
pub fn config_dir() -> PathBuf {
    config_dir_with(|key| std::env::var(key).ok())
}

/// Get the main configuration file path
pub fn config_path() -> PathBuf {
    config_path_with(|key| std::env::var(key).ok())
}

pub(crate) fn config_dir_with(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    // Check for explicit override
    if let Some(dir) = var("SOINTU_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    // Use XDG config directory or fallback
    dirs::config_dir()
        .map(|d| d.join("sointu"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join("sointu"))
                .unwrap_or_else(|| PathBuf::from(".sointu"))
        })
}

pub(crate) fn config_path_with(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    // Check for explicit override
    if let Some(path) = var("SOINTU_CONFIG") {
        return PathBuf::from(path);
    }

    config_dir_with(var).join("config.toml")
}
