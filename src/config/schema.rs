use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub study: StudyConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Daily,
    Hourly,
    Minutely,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            filter: None,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: LogRotation,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            format: LogFormat::Json,
            rotation: LogRotation::Daily,
        }
    }
}

/// Defaults for new and exported studies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Solver version recorded in new studies.
    pub aster_version: String,
    /// Study file used when none is given on the command line.
    pub file_name: String,
    /// Sort commands topologically when exporting stage text.
    pub sort_on_export: bool,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            aster_version: "stable".to_string(),
            file_name: "study.ajs".to_string(),
            sort_on_export: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub undo_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { undo_limit: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stdout: Option<bool>,
    pub stdout_format: Option<LogFormat>,
    pub filter: Option<String>,
    pub file: Option<FileLoggingConfigOverride>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stdout) = self.stdout {
            target.stdout = stdout;
        }
        if let Some(format) = self.stdout_format {
            target.stdout_format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
        if let Some(file) = self.file.as_ref() {
            file.apply_to(&mut target.file);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoggingConfigOverride {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub format: Option<LogFormat>,
    pub rotation: Option<LogRotation>,
}

impl FileLoggingConfigOverride {
    pub fn apply_to(&self, target: &mut FileLoggingConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
        if let Some(format) = self.format {
            target.format = format;
        }
        if let Some(rotation) = self.rotation {
            target.rotation = rotation;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StudyConfigOverride {
    pub aster_version: Option<String>,
    pub file_name: Option<String>,
    pub sort_on_export: Option<bool>,
}

impl StudyConfigOverride {
    pub fn apply_to(&self, target: &mut StudyConfig) {
        if let Some(version) = self.aster_version.as_ref() {
            target.aster_version = version.clone();
        }
        if let Some(name) = self.file_name.as_ref() {
            target.file_name = name.clone();
        }
        if let Some(sort) = self.sort_on_export {
            target.sort_on_export = sort;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HistoryConfigOverride {
    pub undo_limit: Option<usize>,
}

impl HistoryConfigOverride {
    pub fn apply_to(&self, target: &mut HistoryConfig) {
        if let Some(limit) = self.undo_limit {
            target.undo_limit = limit;
        }
    }
}

/// One configuration file; absent keys leave the lower layer untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub logging: LoggingConfigOverride,
    pub study: StudyConfigOverride,
    pub history: HistoryConfigOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        self.logging.apply_to(&mut base.logging);
        self.study.apply_to(&mut base.study);
        self.history.apply_to(&mut base.history);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_layer_parses() {
        let layer: ConfigLayer = toml::from_str(
            r#"
            [study]
            aster_version = "16.4"

            [logging.file]
            enabled = true
            rotation = "hourly"
            "#,
        )
        .unwrap();
        let mut config = Config::default();
        layer.apply_to(&mut config);
        assert_eq!(config.study.aster_version, "16.4");
        assert_eq!(config.study.file_name, "study.ajs");
        assert!(config.logging.file.enabled);
        assert_eq!(config.logging.file.rotation, LogRotation::Hourly);
        assert_eq!(config.logging.file.format, LogFormat::Json);
        assert_eq!(config.history.undo_limit, 50);
    }
}
