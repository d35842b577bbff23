//! Configuration models.
//!
//! Contains the injection targets and the tuning knobs for the lock,
//! the modify operation and the watch loop.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{AppError, Result};
use super::models::Target;

/// One configured target as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Extension identifier, e.g. `google.geminicodeassist`.
    #[serde(alias = "extensionName")]
    pub extension_name: String,

    /// Variables to inject.
    #[serde(default, alias = "envVars")]
    pub env_vars: BTreeMap<String, String>,
}

/// Lock timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long to wait for the lock before skipping a run.
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,

    /// Age after which a held lock is presumed abandoned.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,

    /// Sleep between attempts while the lock is held by someone else.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
            stale_after_ms: default_stale_after_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl LockConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

const fn default_lock_timeout_ms() -> u64 {
    30_000
}

const fn default_stale_after_ms() -> u64 {
    30_000
}

const fn default_retry_interval_ms() -> u64 {
    100
}

/// How the modify operation is carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModifierMode {
    /// Spawn a subprocess and read its output markers.
    #[default]
    Process,
    /// Patch the extension files in this process.
    InProcess,
}

/// Modify operation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierConfig {
    #[serde(default)]
    pub mode: ModifierMode,

    /// Program to run; defaults to this executable's `modify` subcommand.
    #[serde(default)]
    pub program: Option<PathBuf>,

    /// Arguments placed before `<parent_dir> <name> <json>`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Kill the subprocess after this many seconds.
    #[serde(default = "default_modifier_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModifierConfig {
    fn default() -> Self {
        Self {
            mode: ModifierMode::default(),
            program: None,
            args: Vec::new(),
            timeout_secs: default_modifier_timeout_secs(),
        }
    }
}

const fn default_modifier_timeout_secs() -> u64 {
    60
}

/// Watch loop settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

const fn default_poll_interval_ms() -> u64 {
    2_000
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// State database location, defaults to `<data_dir>/state.vscdb`.
    #[serde(default)]
    pub state_db: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Override for the directory holding installed extensions.
    #[serde(default, alias = "extensionParentDir")]
    pub extension_parent_dir: Option<PathBuf>,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub modifier: ModifierConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

/// Validated view of what an orchestrator run needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSettings {
    pub targets: Vec<Target>,
    pub extension_parent_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Validate targets and produce the settings for one run.
    ///
    /// # Errors
    /// Returns error if a target has an empty name or a name appears twice.
    pub fn target_settings(&self) -> Result<TargetSettings> {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());

        for entry in &self.targets {
            let id = entry.extension_name.trim();
            if id.is_empty() {
                return Err(AppError::Config {
                    message: "Target with empty extension_name".into(),
                });
            }
            if !seen.insert(id.to_string()) {
                return Err(AppError::Config {
                    message: format!("Duplicate target: {id}"),
                });
            }
            targets.push(Target::new(id, entry.env_vars.clone()));
        }

        Ok(TargetSettings {
            targets,
            extension_parent_dir: self
                .extension_parent_dir
                .clone()
                .filter(|p| !p.as_os_str().is_empty()),
        })
    }

    /// Merge `vars` into the target named `name`, adding the target if absent.
    pub fn upsert_target<I>(&mut self, name: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        if let Some(existing) = self
            .targets
            .iter_mut()
            .find(|t| t.extension_name.trim() == name)
        {
            existing.env_vars.extend(vars);
            return;
        }

        self.targets.push(TargetConfig {
            extension_name: name.to_string(),
            env_vars: vars.into_iter().collect(),
        });
    }

    /// Drop every target named `name`. Returns `true` if one was removed.
    pub fn remove_target(&mut self, name: &str) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t.extension_name.trim() != name);
        self.targets.len() != before
    }

    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".env-injector")
    }

    /// Get the state database path.
    #[must_use]
    pub fn state_db_path(&self) -> PathBuf {
        self.paths
            .state_db
            .clone()
            .unwrap_or_else(|| self.data_dir().join("state.vscdb"))
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch.poll_interval_ms)
    }
}
