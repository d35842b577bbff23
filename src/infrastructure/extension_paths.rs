//! Editor extension directory discovery.
//!
//! Handles locating the directory that holds installed extensions and the
//! per-version install directories of a given extension.

use std::path::{Path, PathBuf};

use crate::domain::{AppError, Result};

/// Known extension directory locations relative to the home directory.
const EXTENSION_DIRS: &[&str] = &[
    ".vscode/extensions",
    ".vscode-server/extensions",
    ".vscode-insiders/extensions",
    ".vscode-oss/extensions",
    ".cursor/extensions",
];

/// First existing extensions directory under the home directory.
#[must_use]
pub fn find_default_extensions_dir() -> Option<PathBuf> {
    let home = dirs::home_dir()?;

    EXTENSION_DIRS
        .iter()
        .map(|path| home.join(path))
        .find(|path| path.is_dir())
        .inspect(|path| tracing::debug!("Found extensions directory at: {}", path.display()))
}

/// Every install directory in `parent_dir` whose name starts with `base_name`.
///
/// Editors install one directory per version (`publisher.name-1.2.3`), so
/// this can return several entries. Results are sorted by path.
///
/// # Errors
/// Returns error if `parent_dir` cannot be read.
pub fn find_extension_dirs(parent_dir: &Path, base_name: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(parent_dir).map_err(|e| {
        AppError::io(
            format!("Failed to read extensions directory: {}", parent_dir.display()),
            e,
        )
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(base_name))
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();

    dirs.sort();

    tracing::debug!(
        base_name,
        matches = dirs.len(),
        "Scanned {}",
        parent_dir.display()
    );

    Ok(dirs)
}
