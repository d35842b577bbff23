//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Env Injector - inject environment variables into installed editor extensions.
#[derive(Parser, Debug)]
#[command(name = "env-injector")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to ~/.env-injector/config.toml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inject into every configured target once (startup trigger).
    Run,

    /// Reset all statuses and re-inject (configuration-change trigger).
    ConfigChanged,

    /// Run once, then re-inject whenever the config file changes.
    Watch,

    /// Patch every installed version of one extension.
    Modify {
        /// Directory holding installed extensions.
        extension_parent_dir: PathBuf,

        /// Extension name, matched as a directory name prefix.
        extension_name: String,

        /// Variables as a JSON object, e.g. '{"KEY":"value"}'.
        env_vars_json: String,
    },

    /// Show the recorded status of each target and the lock holder.
    Status,

    /// Force-release the injection lock.
    Unlock,

    /// Add or update a target's variables, then re-inject.
    Set {
        /// Extension name, e.g. google.geminicodeassist.
        extension_name: String,

        /// Variables as KEY=VALUE pairs.
        #[arg(required = true, value_parser = parse_key_value)]
        vars: Vec<(String, String)>,
    },

    /// Remove a target from the configuration, then re-inject.
    Remove {
        /// Extension name to remove.
        extension_name: String,
    },

    /// Create a default configuration file if none exists.
    Init,

    /// Show configuration, state and extension paths being used.
    Paths,
}

/// Parse a `KEY=VALUE` argument.
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected KEY=VALUE, got: {s}"))?;

    if key.trim().is_empty() {
        return Err(format!("Empty variable name in: {s}"));
    }

    Ok((key.trim().to_string(), value.to_string()))
}
