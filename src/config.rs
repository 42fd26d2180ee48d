//! Configuration management for cosmos-exec
//!
//! Stores settings in ~/.config/cosmos/executor.toml

use crate::session::DEFAULT_SESSION_ID;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment override for `output_root`.
pub const OUTPUT_ROOT_ENV: &str = "COSMOS_OUTPUT_ROOT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Parent of every session directory
    pub output_root: PathBuf,
    /// Session used when the task output names none
    pub default_session_id: String,
    /// Mirror variant `print` output into the log
    pub echo_prints: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("media/generated"),
            default_session_id: DEFAULT_SESSION_ID.to_string(),
            echo_prints: true,
        }
    }
}

impl ExecutorConfig {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cosmos"))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("executor.toml"))
    }

    /// Load config from disk (or defaults), then apply the environment override.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        config.apply_env(std::env::var(OUTPUT_ROOT_ENV).ok());
        config
    }

    /// Load from `path`. Missing file means defaults; a corrupt one is backed up.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    "Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                    err
                );
                Self::default()
            }
        }
    }

    fn apply_env(&mut self, output_root: Option<String>) {
        if let Some(root) = output_root.filter(|r| !r.trim().is_empty()) {
            self.output_root = PathBuf::from(root);
        }
    }

    /// Save config to `path`, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("toml.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = ExecutorConfig::default();
        assert_eq!(config.output_root, PathBuf::from("media/generated"));
        assert_eq!(config.default_session_id, "default_session");
        assert!(config.echo_prints);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("executor.toml");
        fs::write(&path, "echo_prints = false\n").unwrap();

        let config = ExecutorConfig::load_from(&path);
        assert!(!config.echo_prints);
        assert_eq!(config.default_session_id, "default_session");
    }

    #[test]
    fn test_corrupt_file_is_backed_up() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("executor.toml");
        fs::write(&path, "output_root = [").unwrap();

        assert_eq!(ExecutorConfig::load_from(&path), ExecutorConfig::default());
        assert!(dir.path().join("executor.toml.corrupt").exists());
    }

    #[test]
    fn test_save_round_trips_and_env_overrides_root() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("executor.toml");
        let mut config = ExecutorConfig {
            echo_prints: false,
            ..ExecutorConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(ExecutorConfig::load_from(&path), config);

        config.apply_env(Some("/srv/out".to_string()));
        assert_eq!(config.output_root, PathBuf::from("/srv/out"));
        config.apply_env(Some("  ".to_string()));
        assert_eq!(config.output_root, PathBuf::from("/srv/out"));
    }
}
