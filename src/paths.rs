//! XDG directory helpers for config/log locations.

use std::path::PathBuf;

/// Base directory for configuration files.
///
/// Uses `ASTERSTUDY_CONFIG_DIR` if set, otherwise
/// `$XDG_CONFIG_HOME/asterstudy` or `~/.config/asterstudy`.
pub(crate) fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ASTERSTUDY_CONFIG_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join("asterstudy")
}

/// Base directory for persistent data.
///
/// Uses `ASTERSTUDY_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/asterstudy`
/// or `~/.local/share/asterstudy`.
pub(crate) fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ASTERSTUDY_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("asterstudy")
}

/// Default directory for rolling log files.
pub(crate) fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Default directory for exported run cases.
pub(crate) fn runs_dir() -> PathBuf {
    data_dir().join("runs")
}
