//! Env Injector - inject environment variables into installed editor extensions.
//!
//! Each configured extension gets a `process.env[...]` block appended to its
//! bundled entry file. Runs are serialized across editor windows by a lock
//! record in a shared `SQLite` state database, and each target's last result
//! is kept there so a restart does not repeat its notices.
//!
//! QUICK START:
//!   env-injector init                              # Write a default config
//!   env-injector set pub.ext HTTPS_PROXY=http://h  # Add a target and inject
//!   env-injector run                               # Startup run
//!   env-injector watch                             # Re-inject on config edits
//!   env-injector status                            # Per-target status and lock

mod application;
mod cli;
mod domain;
mod infrastructure;

use clap::Parser;
use colored::Colorize;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    format_lock_holder, format_run_outcome, format_status_table, load_statuses, Injector,
    RunOutcome, StateLock,
};
use cli::{Cli, Commands};
use domain::{AppConfig, AppError};
use infrastructure::{
    ensure_config_exists, find_default_extensions_dir, modify_report, save_config, Clock,
    ConfigFile, ConfiguredModifier, ConsoleNotifier, SqliteStateStore, SystemClock,
};

type AppInjector =
    Injector<SqliteStateStore, SystemClock, ConfiguredModifier, ConsoleNotifier, ConfigFile>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> domain::Result<()> {
    let config_file = ConfigFile::resolve(cli.config);

    match cli.command {
        Commands::Run => cmd_run(config_file).await?,
        Commands::ConfigChanged => cmd_config_changed(config_file).await?,
        Commands::Watch => cmd_watch(config_file).await?,
        Commands::Modify {
            extension_parent_dir,
            extension_name,
            env_vars_json,
        } => cmd_modify(&extension_parent_dir, &extension_name, &env_vars_json)?,
        Commands::Status => cmd_status(&config_file)?,
        Commands::Unlock => cmd_unlock(&config_file)?,
        Commands::Set {
            extension_name,
            vars,
        } => {
            let mut config = config_file.load()?;
            config.upsert_target(extension_name.trim(), vars);
            save_and_reinject(config_file, &config).await?;
        }
        Commands::Remove { extension_name } => {
            let mut config = config_file.load()?;
            if !config.remove_target(extension_name.trim()) {
                return Err(AppError::Config {
                    message: format!("No target named {extension_name}"),
                });
            }
            save_and_reinject(config_file, &config).await?;
        }
        Commands::Init => cmd_init(&config_file)?,
        Commands::Paths => cmd_paths(&config_file)?,
    }

    Ok(())
}

/// Wire the injector from the configuration on disk.
fn build_injector(config_file: ConfigFile) -> domain::Result<AppInjector> {
    let config = config_file.load()?;
    let store = SqliteStateStore::open(&config.state_db_path())?;
    let modifier = ConfiguredModifier::from_config(&config.modifier)?;

    Injector::new(
        store,
        SystemClock,
        modifier,
        ConsoleNotifier,
        config_file,
        config.lock,
    )
}

fn print_outcome(outcome: &RunOutcome) {
    let line = format_run_outcome(outcome);
    match outcome {
        RunOutcome::LockUnavailable => println!("{} {}", "⏳".yellow(), line.yellow()),
        RunOutcome::Completed(summary) if !summary.failed.is_empty() => {
            println!("{} {}", "⚠".yellow().bold(), line);
        }
        RunOutcome::Completed(_) => println!("{} {}", "✓".green().bold(), line),
    }
}

/// Startup trigger: one guarded run.
async fn cmd_run(config_file: ConfigFile) -> domain::Result<()> {
    let mut injector = build_injector(config_file)?;
    let outcome = injector.on_startup().await?;
    print_outcome(&outcome);
    Ok(())
}

/// Configuration-change trigger: reset, run, prompt for reload.
async fn cmd_config_changed(config_file: ConfigFile) -> domain::Result<()> {
    let mut injector = build_injector(config_file)?;
    let outcome = injector.on_configuration_change().await?;
    print_outcome(&outcome);
    Ok(())
}

async fn save_and_reinject(config_file: ConfigFile, config: &AppConfig) -> domain::Result<()> {
    save_config(config, config_file.path())?;
    println!(
        "{} Saved {}",
        "✓".green().bold(),
        config_file.path().display()
    );
    cmd_config_changed(config_file).await
}

/// Startup run, then one configuration-change run per edit of the config
/// file until interrupted. Run errors are logged and the loop continues.
async fn cmd_watch(config_file: ConfigFile) -> domain::Result<()> {
    let poll_interval = config_file.load()?.poll_interval();
    let mut injector = build_injector(config_file.clone())?;

    match injector.on_startup().await {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) => tracing::error!("Startup run failed: {}", e),
    }

    println!(
        "{} Watching {} (Ctrl+C to stop)",
        "👀".bold(),
        config_file.path().display()
    );

    let mut last_modified = config_file.modified();
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Interrupted, stopping watch");
                break;
            }
            _ = ticker.tick() => {
                let modified = config_file.modified();
                if modified == last_modified {
                    continue;
                }
                last_modified = modified;

                match injector.on_configuration_change().await {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => tracing::error!("Configuration-change run failed: {}", e),
                }
            }
        }
    }

    Ok(())
}

/// Modify operation: patch every installed version of one extension and
/// print the marker-bearing report on stdout.
fn cmd_modify(parent_dir: &std::path::Path, name: &str, env_vars_json: &str) -> domain::Result<()> {
    print!("{}", modify_report(parent_dir, name, env_vars_json)?);
    Ok(())
}

/// Show per-target status and the lock holder.
fn cmd_status(config_file: &ConfigFile) -> domain::Result<()> {
    let config = config_file.load()?;
    let configured: Vec<String> = config
        .target_settings()?
        .targets
        .into_iter()
        .map(|t| t.id)
        .collect();

    let store = SqliteStateStore::open(&config.state_db_path())?;
    let statuses = load_statuses(&store)?;

    println!("{}", "📋 Extension Status".bold());
    println!("{}", format_status_table(&configured, &statuses));

    let clock = SystemClock;
    let holder = StateLock::new(&store, &clock, config.lock).holder()?;
    println!("{}", format_lock_holder(holder.as_ref(), clock.now_millis()));

    Ok(())
}

/// Force-release the lock.
fn cmd_unlock(config_file: &ConfigFile) -> domain::Result<()> {
    let config = config_file.load()?;
    let store = SqliteStateStore::open(&config.state_db_path())?;
    let clock = SystemClock;
    let lock = StateLock::new(&store, &clock, config.lock);

    match lock.holder()? {
        Some(record) => {
            lock.release()?;
            println!("{} Released lock held by {}", "✓".green().bold(), record.token);
        }
        None => {
            // Clears an unreadable record too
            lock.release()?;
            println!("{} Lock was not held", "ℹ".blue().bold());
        }
    }

    Ok(())
}

fn cmd_init(config_file: &ConfigFile) -> domain::Result<()> {
    if ensure_config_exists(config_file.path())? {
        println!(
            "{} Created {}",
            "✓".green().bold(),
            config_file.path().display()
        );
    } else {
        println!(
            "{} Config already exists: {}",
            "ℹ".blue().bold(),
            config_file.path().display()
        );
    }
    Ok(())
}

/// Show paths in use.
fn cmd_paths(config_file: &ConfigFile) -> domain::Result<()> {
    let config = config_file.load()?;

    println!("{}", "📂 Env Injector Paths".bold());
    println!();

    let exists = |p: &std::path::Path| {
        if p.exists() {
            "found".green()
        } else {
            "missing".yellow()
        }
    };

    let config_path = config_file.path();
    println!("  config:     [{}] {}", exists(config_path), config_path.display());

    let state_db = config.state_db_path();
    println!("  state db:   [{}] {}", exists(&state_db), state_db.display());

    match config
        .target_settings()?
        .extension_parent_dir
        .or_else(find_default_extensions_dir)
    {
        Some(dir) => println!("  extensions: [{}] {}", exists(&dir), dir.display()),
        None => println!("  extensions: [{}] none detected", "missing".yellow()),
    }

    Ok(())
}

/// Setup tracing/logging based on verbosity level.
///
/// Logs go to stderr; stdout of the `modify` command is parsed for markers.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .init();
}
