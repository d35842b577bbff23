//! Adapters for the modify operation.
//!
//! The orchestrator only sees a typed `ModifyOutcome`. The process adapter
//! keeps marker matching on stdout so any modifier that prints the same
//! markers can be plugged in unchanged.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::domain::{AppError, ModifierConfig, ModifierMode, ModifyOutcome, Result, Target};

use super::extension_patcher::inject_all;

/// Subcommand of this binary that performs the modification.
const MODIFY_SUBCOMMAND: &str = "modify";

/// Applies a target's variables to its installed extension.
#[allow(async_fn_in_trait)]
pub trait Modifier {
    /// Run the modification for one target.
    ///
    /// # Errors
    /// Returns error if the operation could not be run to completion.
    async fn modify(&self, parent_dir: &Path, target: &Target) -> Result<ModifyOutcome>;
}

impl<T: Modifier> Modifier for &T {
    async fn modify(&self, parent_dir: &Path, target: &Target) -> Result<ModifyOutcome> {
        (**self).modify(parent_dir, target).await
    }
}

/// Runs the modify operation as a subprocess and reads its output markers.
#[derive(Debug, Clone)]
pub struct ProcessModifier {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessModifier {
    #[must_use]
    pub const fn new(program: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    /// The configured program, or this executable's `modify` subcommand.
    ///
    /// # Errors
    /// Returns error if the current executable path cannot be determined.
    pub fn from_config(config: &ModifierConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        if let Some(program) = &config.program {
            return Ok(Self::new(program.clone(), config.args.clone(), timeout));
        }

        let exe = std::env::current_exe()
            .map_err(|e| AppError::io("Failed to get executable path", e))?;
        Ok(Self::new(exe, vec![MODIFY_SUBCOMMAND.to_string()], timeout))
    }
}

impl Modifier for ProcessModifier {
    async fn modify(&self, parent_dir: &Path, target: &Target) -> Result<ModifyOutcome> {
        let vars = target.variables_json()?;

        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(parent_dir)
            .arg(&target.id)
            .arg(&vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::modify(
                    &target.id,
                    format!("failed to start {}: {e}", self.program.display()),
                )
            })?;

        // Dropping the child on timeout kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::modify(
                    &target.id,
                    format!("no result after {}s", self.timeout.as_secs_f32()),
                )
            })?
            .map_err(|e| AppError::modify(&target.id, e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        tracing::debug!(extension = %target.id, "Modify output: {}", stdout.trim_end());
        if !stderr.trim().is_empty() {
            tracing::error!(extension = %target.id, "Modify error output: {}", stderr.trim_end());
        }
        if output.status.success() {
            tracing::debug!(extension = %target.id, "Modify exited cleanly");
        } else {
            tracing::warn!(
                extension = %target.id,
                code = ?output.status.code(),
                "Modify exited with failure"
            );
        }

        Ok(ModifyOutcome::from_output(&stdout))
    }
}

/// Patches extension files directly in this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessModifier;

impl Modifier for InProcessModifier {
    async fn modify(&self, parent_dir: &Path, target: &Target) -> Result<ModifyOutcome> {
        let report = inject_all(parent_dir, &target.id, &target.variables)?;
        tracing::debug!(extension = %target.id, "Modify output: {}", report.render().trim_end());
        Ok(report.outcome())
    }
}

/// Modifier selected by `[modifier] mode`.
#[derive(Debug, Clone)]
pub enum ConfiguredModifier {
    Process(ProcessModifier),
    InProcess(InProcessModifier),
}

impl ConfiguredModifier {
    /// Build the modifier described by the configuration.
    ///
    /// # Errors
    /// Returns error if the subprocess program cannot be resolved.
    pub fn from_config(config: &ModifierConfig) -> Result<Self> {
        Ok(match config.mode {
            ModifierMode::Process => Self::Process(ProcessModifier::from_config(config)?),
            ModifierMode::InProcess => Self::InProcess(InProcessModifier),
        })
    }
}

impl Modifier for ConfiguredModifier {
    async fn modify(&self, parent_dir: &Path, target: &Target) -> Result<ModifyOutcome> {
        match self {
            Self::Process(m) => m.modify(parent_dir, target).await,
            Self::InProcess(m) => m.modify(parent_dir, target).await,
        }
    }
}

/// Test double answering with canned stdout per target id.
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedModifier {
    responses: std::sync::Mutex<
        std::collections::HashMap<String, std::result::Result<String, String>>,
    >,
    calls: std::sync::Mutex<Vec<(PathBuf, String, String)>>,
}

#[cfg(test)]
impl ScriptedModifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `id` with the given stdout text.
    pub fn respond(&self, id: &str, stdout: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .insert(id.to_string(), Ok(stdout.to_string()));
        self
    }

    /// Fail `id` with the given message.
    pub fn fail(&self, id: &str, message: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .insert(id.to_string(), Err(message.to_string()));
        self
    }

    /// `(parent_dir, id, json vars)` of every call, in order.
    pub fn calls(&self) -> Vec<(PathBuf, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Modifier for ScriptedModifier {
    async fn modify(&self, parent_dir: &Path, target: &Target) -> Result<ModifyOutcome> {
        self.calls.lock().unwrap().push((
            parent_dir.to_path_buf(),
            target.id.clone(),
            target.variables_json()?,
        ));

        match self.responses.lock().unwrap().get(&target.id) {
            Some(Ok(stdout)) => Ok(ModifyOutcome::from_output(stdout)),
            Some(Err(message)) => Err(AppError::modify(&target.id, message.clone())),
            None => Ok(ModifyOutcome::Unrecognized),
        }
    }
}
