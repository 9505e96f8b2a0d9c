use std::fs;
use std::path::{Path, PathBuf};

use super::ConfigError;
use super::merge::{apply_env_overrides, merge_layers};
use super::{Config, ConfigLayer};

pub fn config_path() -> PathBuf {
    crate::paths::config_dir().join("config.toml")
}

pub fn project_config_path(study_dir: &Path) -> PathBuf {
    study_dir.join("asterstudy.toml")
}

pub fn load_user_config() -> Result<Option<ConfigLayer>, ConfigError> {
    read_layer(&config_path())
}

pub fn load_project_config(study_dir: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    read_layer(&project_config_path(study_dir))
}

fn read_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Defaults < user file < project file < environment.
pub fn load_for_study(study_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let user = load_user_config()?;
    let project = match study_dir {
        Some(dir) => load_project_config(dir)?,
        None => None,
    };
    let mut config = merge_layers(user, project);
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Like `load_for_study`, falling back to defaults when a file is broken.
pub fn load_or_default(study_dir: Option<&Path>) -> Config {
    match load_for_study(study_dir) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("config load failed, using defaults: {err}");
            let mut config = Config::default();
            apply_env_overrides(&mut config);
            config
        }
    }
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let contents = toml::to_string_pretty(cfg).map_err(ConfigError::Render)?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    fs::write(temp.path(), data).map_err(write_err)?;
    temp.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{LogFormat, LogRotation};

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.logging.stdout = false;
        cfg.logging.stdout_format = LogFormat::Json;
        cfg.logging.file.enabled = true;
        cfg.logging.file.dir = Some(PathBuf::from("/tmp/asterstudy-logs"));
        cfg.logging.file.rotation = LogRotation::Never;
        cfg.study.aster_version = "16.4".to_string();
        cfg.study.sort_on_export = true;
        cfg.history.undo_limit = 7;
        write_config(&path, &cfg).unwrap();

        let loaded: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(!loaded.logging.stdout);
        assert_eq!(loaded.logging.stdout_format, LogFormat::Json);
        assert!(loaded.logging.file.enabled);
        assert_eq!(
            loaded.logging.file.dir.as_deref(),
            Some(Path::new("/tmp/asterstudy-logs"))
        );
        assert_eq!(loaded.logging.file.rotation, LogRotation::Never);
        assert_eq!(loaded.study.aster_version, "16.4");
        assert!(loaded.study.sort_on_export);
        assert_eq!(loaded.history.undo_limit, 7);
    }

    #[test]
    fn broken_project_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(project_config_path(dir.path()), "[study\n").unwrap();
        let err = load_project_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_project_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_project_config(dir.path()).unwrap().is_none());
    }
}
