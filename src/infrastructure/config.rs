//! Configuration file management.
//!
//! Handles loading and saving the TOML configuration file. The orchestrator
//! reads it again on every run, so edits take effect without a restart.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::domain::{AppConfig, AppError, Result};

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# Env Injector Configuration
# Auto-generated - edit as needed

# Directory holding installed extensions (optional, auto-detected when unset)
# extension_parent_dir = "/home/me/.vscode/extensions"

# One [[targets]] block per extension to inject into
# [[targets]]
# extension_name = "google.geminicodeassist"
# env_vars = { HTTPS_PROXY = "http://127.0.0.1:3128" }

[lock]
# Give up waiting for another run after this many milliseconds
timeout_ms = 30000

# Treat a lock older than this as abandoned
stale_after_ms = 30000

# Wait between attempts while another run holds the lock
retry_interval_ms = 100

[modifier]
# "process" runs a subprocess, "in-process" patches files directly
mode = "process"

# Kill the modify subprocess after this many seconds
timeout_secs = 60

# Custom modifier; receives <extension_parent_dir> <extension_name> <env_vars_json>
# program = "python3"
# args = ["/path/to/modifyExtension.py"]

[watch]
# How often `watch` checks the config file for changes
poll_interval_ms = 2000

[paths]
# Custom data directory (optional, defaults to ~/.env-injector)
# data_dir = "/custom/path"
"#;

/// A config file on disk, read fresh on every call.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `--config` override, or the default location.
    #[must_use]
    pub fn resolve(path: Option<PathBuf>) -> Self {
        Self::new(path.unwrap_or_else(config_file_path))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file, or the default configuration when it does not exist.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<AppConfig> {
        if self.path.exists() {
            load_config_from_file(&self.path)
        } else {
            tracing::debug!(path = %self.path.display(), "No config file, using defaults");
            Ok(AppConfig::default())
        }
    }

    /// Last modification time, if the file exists.
    #[must_use]
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Save configuration to file.
///
/// # Errors
/// Returns error if file cannot be written.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io("Failed to create config directory", e))?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| AppError::Config {
        message: format!("Failed to serialize config: {e}"),
    })?;

    fs::write(path, content)
        .map_err(|e| AppError::io(format!("Failed to write config file: {}", path.display()), e))?;

    tracing::info!(path = %path.display(), "Configuration saved");

    Ok(())
}

/// Create default configuration file if it doesn't exist.
///
/// Returns `true` when a file was written.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io("Failed to create config directory", e))?;
    }

    fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| AppError::io("Failed to create default config", e))?;

    tracing::info!(path = %path.display(), "Created default configuration");

    Ok(true)
}

/// Get the path to the default configuration file.
#[must_use]
pub fn config_file_path() -> PathBuf {
    AppConfig::default_data_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModifierMode, TargetConfig};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_parses() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.lock.timeout_ms, 30_000);
        assert_eq!(config.lock.retry_interval_ms, 100);
        assert_eq!(config.modifier.mode, ModifierMode::Process);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        let config = AppConfig {
            extension_parent_dir: Some(PathBuf::from("/ext")),
            targets: vec![TargetConfig {
                extension_name: "pub.ext".into(),
                env_vars: BTreeMap::from([("X".to_string(), "1".to_string())]),
            }],
            ..Default::default()
        };

        save_config(&config, &config_path).unwrap();
        let loaded = ConfigFile::new(config_path).load().unwrap();

        let settings = loaded.target_settings().unwrap();
        assert_eq!(settings.extension_parent_dir, Some(PathBuf::from("/ext")));
        assert_eq!(settings.targets[0].id, "pub.ext");
        assert_eq!(settings.targets[0].variables["X"], "1");
    }

    #[test]
    fn test_accepts_editor_setting_names() {
        let config: AppConfig = toml::from_str(
            r#"
            extensionParentDir = "/ext"

            [[targets]]
            extensionName = "pub.ext"
            envVars = { X = "1" }
            "#,
        )
        .unwrap();

        assert_eq!(config.targets[0].extension_name, "pub.ext");
        assert_eq!(config.targets[0].env_vars["X"], "1");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("absent.toml"));
        assert!(file.load().unwrap().targets.is_empty());
        assert!(file.modified().is_none());
    }

    #[test]
    fn test_ensure_config_exists_only_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub/config.toml");
        assert!(ensure_config_exists(&path).unwrap());
        assert!(!ensure_config_exists(&path).unwrap());
        assert!(load_config_from_file(&path).is_ok());
    }
}
