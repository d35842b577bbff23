//! Application layer - use cases and orchestration.
//!
//! This layer contains the durable lock, the injection run and the
//! triggers that request runs.

pub mod formatter;
pub mod lock;
pub mod orchestrator;
pub mod status;
pub mod triggers;

pub use formatter::{format_lock_holder, format_run_outcome, format_status_table};
pub use lock::StateLock;
pub use status::load_statuses;
pub use triggers::{Injector, RunOutcome};
