//! Domain layer - core types and errors.
//!
//! This layer contains pure domain models and error types
//! without any external dependencies (DB, IO, etc.).

pub mod config;
pub mod error;
pub mod models;

pub use config::{AppConfig, LockConfig, ModifierConfig, ModifierMode, TargetConfig, TargetSettings};
pub use error::{AppError, Result};
pub use models::{
    ExtensionStatus, LockRecord, ModifyOutcome, Notice, RunSummary, StatusMap, Target,
    INJECTED_MARKER, NOT_FOUND_MARKER,
};
