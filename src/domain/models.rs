//! Domain models for injection targets, their status and the durable lock.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::AppError;

/// Marker printed by the modify operation after a successful injection.
pub const INJECTED_MARKER: &str = "Successfully injected env vars";

/// Marker printed by the modify operation when no install directory matched.
pub const NOT_FOUND_MARKER: &str = "No extension found";

/// An extension to inject into, plus the variables it should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Extension identifier, matched as a directory name prefix.
    pub id: String,
    /// Environment variables to inject.
    pub variables: BTreeMap<String, String>,
}

impl Target {
    /// Create a target from an id and variable pairs.
    #[must_use]
    pub fn new<I, K, V>(id: impl Into<String>, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            variables: variables
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Variables encoded as the JSON object passed to the modify operation.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn variables_json(&self) -> Result<String, AppError> {
        serde_json::to_string(&self.variables).map_err(AppError::json_parse)
    }
}

/// Last known injection status of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionStatus {
    #[serde(rename = "injected")]
    Injected,
    #[serde(rename = "not found")]
    NotFound,
    /// Reset value after a configuration change.
    #[serde(rename = "not modified")]
    NotModified,
}

impl fmt::Display for ExtensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Injected => write!(f, "injected"),
            Self::NotFound => write!(f, "not found"),
            Self::NotModified => write!(f, "not modified"),
        }
    }
}

/// Persisted mapping from target id to its last known status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusMap(BTreeMap<String, ExtensionStatus>);

impl StatusMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<ExtensionStatus> {
        self.0.get(id).copied()
    }

    /// Record `status` for `id`. Returns `true` only when the stored value changed.
    pub fn transition(&mut self, id: &str, status: ExtensionStatus) -> bool {
        if self.get(id) == Some(status) {
            return false;
        }
        self.0.insert(id.to_string(), status);
        true
    }

    /// Set every known entry back to `NotModified`.
    pub fn reset_all(&mut self) {
        for status in self.0.values_mut() {
            *status = ExtensionStatus::NotModified;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ExtensionStatus)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Durable lock ownership record, stored as `"<token>-<epoch millis>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub token: String,
    pub acquired_at_ms: i64,
}

impl LockRecord {
    /// Fresh record with a random v4 token.
    #[must_use]
    pub fn generate(acquired_at_ms: i64) -> Self {
        Self {
            token: uuid::Uuid::new_v4().to_string(),
            acquired_at_ms,
        }
    }

    /// Milliseconds elapsed since the record was written.
    #[must_use]
    pub const fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.acquired_at_ms)
    }
}

impl fmt::Display for LockRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.token, self.acquired_at_ms)
    }
}

impl FromStr for LockRecord {
    type Err = AppError;

    // Tokens are UUIDs and contain hyphens, so split on the last one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::InvalidData {
            message: format!("Malformed lock record: {s}"),
        };

        let (token, timestamp) = s.rsplit_once('-').ok_or_else(invalid)?;
        if token.is_empty() {
            return Err(invalid());
        }
        let acquired_at_ms = timestamp.parse::<i64>().map_err(|_| invalid())?;

        Ok(Self {
            token: token.to_string(),
            acquired_at_ms,
        })
    }
}

/// Typed result of one modify invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOutcome {
    Injected,
    NotFound,
    /// Output carried neither marker; status stays as it was.
    Unrecognized,
}

impl ModifyOutcome {
    /// Interpret the textual output of a modify operation.
    #[must_use]
    pub fn from_output(stdout: &str) -> Self {
        if stdout.contains(INJECTED_MARKER) {
            Self::Injected
        } else if stdout.contains(NOT_FOUND_MARKER) {
            Self::NotFound
        } else {
            Self::Unrecognized
        }
    }

    /// Status this outcome moves a target into, if any.
    #[must_use]
    pub const fn status(self) -> Option<ExtensionStatus> {
        match self {
            Self::Injected => Some(ExtensionStatus::Injected),
            Self::NotFound => Some(ExtensionStatus::NotFound),
            Self::Unrecognized => None,
        }
    }
}

/// A user-facing notice emitted on status transitions and config changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Injected { target: String },
    NotFound { target: String },
    ConfigurationChanged,
}

impl Notice {
    /// Whether the notice offers an immediate window reload.
    #[must_use]
    pub const fn offers_reload(&self) -> bool {
        matches!(self, Self::Injected { .. } | Self::ConfigurationChanged)
    }

    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Injected { target } => {
                format!("Env Injector: Successfully injected env vars into {target}.")
            }
            Self::NotFound { target } => {
                format!("Env Injector: No extension found for {target}")
            }
            Self::ConfigurationChanged => "Env Injector: Please reload the editor window for the configuration changes to take effect.".to_string(),
        }
    }
}

/// What one orchestrator run did, per target id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Targets that transitioned into `Injected`.
    pub injected: Vec<String>,
    /// Targets that transitioned into `NotFound`.
    pub not_found: Vec<String>,
    /// Targets whose observed status matched the stored one.
    pub unchanged: Vec<String>,
    /// Targets skipped because they declare no variables.
    pub skipped: Vec<String>,
    /// Targets whose modify call failed.
    pub failed: Vec<String>,
}

impl RunSummary {
    #[must_use]
    pub fn transitions(&self) -> usize {
        self.injected.len() + self.not_found.len()
    }
}
