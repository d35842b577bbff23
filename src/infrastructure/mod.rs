//! Infrastructure layer - external adapters (state database, filesystem,
//! subprocesses, console).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod clock;
pub mod config;
pub mod extension_paths;
pub mod extension_patcher;
pub mod modifier;
pub mod notifier;
pub mod state_store;

pub use clock::{Clock, SystemClock};
pub use config::{ensure_config_exists, save_config, ConfigFile};
pub use extension_paths::find_default_extensions_dir;
pub use extension_patcher::modify_report;
pub use modifier::{ConfiguredModifier, Modifier};
pub use notifier::{ConsoleNotifier, Notifier};
pub use state_store::{SqliteStateStore, StateStore, LOCK_KEY, STATUS_KEY};
