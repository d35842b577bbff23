//! Rewrites an installed extension's entry script to set environment variables.
//!
//! This is the modify operation behind the `modify` subcommand. Every
//! installed version of the extension is patched, and the textual report it
//! prints carries the markers the orchestrator looks for.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppError, ModifyOutcome, Result, INJECTED_MARKER, NOT_FOUND_MARKER};

use super::extension_paths::find_extension_dirs;

/// Delimiters around the injected block, used to replace it on re-runs.
const BLOCK_START: &str = "// --- My Env Injector Start ---";
const BLOCK_END: &str = "// --- My Env Injector End ---";

const ENTRY_DIR: &str = "dist";
const ENTRY_FILE: &str = "extension.js";
const BACKUP_FILE: &str = "extension.js.bak";

/// Result of patching one install directory.
#[derive(Debug)]
pub enum PatchResult {
    Injected { file: PathBuf, backup_created: Option<PathBuf> },
    /// No `dist/extension.js` in the directory.
    EntryMissing,
    Failed { error: AppError, restored_from: Option<PathBuf> },
}

/// Patch result for one install directory.
#[derive(Debug)]
pub struct DirectoryReport {
    pub dir: PathBuf,
    pub result: PatchResult,
}

/// Everything one modify invocation did.
#[derive(Debug)]
pub enum InjectionReport {
    NoExtension { base_name: String, parent_dir: PathBuf },
    Patched(Vec<DirectoryReport>),
}

impl InjectionReport {
    /// Typed outcome; injected as soon as one version was patched.
    #[must_use]
    pub fn outcome(&self) -> ModifyOutcome {
        match self {
            Self::NoExtension { .. } => ModifyOutcome::NotFound,
            Self::Patched(reports) => {
                if reports
                    .iter()
                    .any(|r| matches!(r.result, PatchResult::Injected { .. }))
                {
                    ModifyOutcome::Injected
                } else {
                    ModifyOutcome::Unrecognized
                }
            }
        }
    }

    /// Line-oriented report carrying the injected / not-found markers.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();

        match self {
            Self::NoExtension {
                base_name,
                parent_dir,
            } => {
                let _ = writeln!(
                    out,
                    "{NOT_FOUND_MARKER}, with base name: {base_name} in: {}",
                    parent_dir.display()
                );
            }
            Self::Patched(reports) => {
                for report in reports {
                    let _ = writeln!(out, "Found extension directory: {}", report.dir.display());
                    match &report.result {
                        PatchResult::Injected {
                            file,
                            backup_created,
                        } => {
                            if let Some(backup) = backup_created {
                                let _ = writeln!(out, "Backup created: {}", backup.display());
                            }
                            let _ = writeln!(out, "{INJECTED_MARKER} into {}", file.display());
                        }
                        PatchResult::EntryMissing => {
                            let _ = writeln!(
                                out,
                                "Error: {ENTRY_FILE} not found in {ENTRY_DIR} directory: {}",
                                report.dir.display()
                            );
                        }
                        PatchResult::Failed {
                            error,
                            restored_from,
                        } => {
                            let _ = writeln!(out, "Error modifying {ENTRY_FILE}: {error}");
                            match restored_from {
                                Some(backup) => {
                                    let _ =
                                        writeln!(out, "Restored from backup: {}", backup.display());
                                }
                                None => out.push_str("Backup file not found.\n"),
                            }
                        }
                    }
                }
            }
        }

        out
    }
}

/// Parse the JSON object of variables passed on the command line.
///
/// # Errors
/// Returns error if the input is not a JSON object of strings.
pub fn parse_env_vars(json: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(json).map_err(AppError::json_parse)
}

/// The whole `modify` subcommand: decode the variables, patch, render.
///
/// Variables that are not a JSON object of strings produce an
/// `Error decoding JSON: ...` line and leave every file untouched.
///
/// # Errors
/// Returns error if `parent_dir` exists but cannot be listed.
pub fn modify_report(parent_dir: &Path, base_name: &str, env_vars_json: &str) -> Result<String> {
    let vars = match parse_env_vars(env_vars_json) {
        Ok(vars) => vars,
        Err(AppError::JsonParse { message, .. }) => {
            return Ok(format!("Error decoding JSON: {message}\n"));
        }
        Err(e) => return Err(e),
    };

    Ok(inject_all(parent_dir, base_name, &vars)?.render())
}

/// Patch every installed version of `base_name` under `parent_dir`.
///
/// A missing `parent_dir` counts as "no extension found".
///
/// # Errors
/// Returns error if `parent_dir` exists but cannot be listed.
pub fn inject_all(
    parent_dir: &Path,
    base_name: &str,
    vars: &BTreeMap<String, String>,
) -> Result<InjectionReport> {
    let dirs = if parent_dir.exists() {
        find_extension_dirs(parent_dir, base_name)?
    } else {
        Vec::new()
    };

    if dirs.is_empty() {
        tracing::info!(base_name, "No matching extension directory");
        return Ok(InjectionReport::NoExtension {
            base_name: base_name.to_string(),
            parent_dir: parent_dir.to_path_buf(),
        });
    }

    let reports = dirs
        .into_iter()
        .map(|dir| {
            let result = patch_extension(&dir, vars);
            DirectoryReport { dir, result }
        })
        .collect();

    Ok(InjectionReport::Patched(reports))
}

/// Patch a single install directory, restoring from backup on failure.
pub fn patch_extension(extension_dir: &Path, vars: &BTreeMap<String, String>) -> PatchResult {
    let entry = extension_dir.join(ENTRY_DIR).join(ENTRY_FILE);
    if !entry.is_file() {
        return PatchResult::EntryMissing;
    }

    let backup = extension_dir.join(ENTRY_DIR).join(BACKUP_FILE);

    match write_block(&entry, &backup, vars) {
        Ok(backup_created) => {
            tracing::info!(file = %entry.display(), vars = vars.len(), "Injected env vars");
            PatchResult::Injected {
                file: entry,
                backup_created,
            }
        }
        Err(error) => {
            tracing::warn!(file = %entry.display(), "Patch failed: {}", error);
            let restored_from = backup
                .is_file()
                .then(|| fs::copy(&backup, &entry))
                .and_then(std::result::Result::ok)
                .map(|_| backup);
            PatchResult::Failed {
                error,
                restored_from,
            }
        }
    }
}

/// Back up once, drop any previous block and append a fresh one.
fn write_block(
    entry: &Path,
    backup: &Path,
    vars: &BTreeMap<String, String>,
) -> Result<Option<PathBuf>> {
    let backup_created = if backup.exists() {
        None
    } else {
        fs::copy(entry, backup).map_err(|e| AppError::io("Failed to create backup", e))?;
        Some(backup.to_path_buf())
    };

    let content = fs::read_to_string(entry)
        .map_err(|e| AppError::io(format!("Failed to read {}", entry.display()), e))?;

    let mut patched = strip_injected_block(&content);
    let kept = patched.trim_end_matches('\n').len();
    patched.truncate(kept);
    patched.push('\n');
    patched.push_str(&render_block(vars));
    patched.push('\n');

    fs::write(entry, patched)
        .map_err(|e| AppError::io(format!("Failed to write {}", entry.display()), e))?;

    Ok(backup_created)
}

/// Remove every previously injected block.
fn strip_injected_block(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find(BLOCK_START) {
        let Some(end) = rest[start..].find(BLOCK_END) else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + end + BLOCK_END.len()..];
    }
    out.push_str(rest);

    out
}

/// Build the block assigning each variable to `process.env`.
fn render_block(vars: &BTreeMap<String, String>) -> String {
    let mut block = String::from(BLOCK_START);
    block.push('\n');
    for (key, value) in vars {
        // JSON string literals are valid JavaScript string literals
        let _ = writeln!(
            block,
            "process.env[{}] = {};",
            serde_json::Value::from(key.as_str()),
            serde_json::Value::from(value.as_str())
        );
    }
    block.push_str(BLOCK_END);
    block
}
