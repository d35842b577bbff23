//! Trigger sources: startup and configuration change.
//!
//! Each trigger requests one orchestrator run guarded by the durable lock.
//! A trigger that cannot get the lock is dropped, not queued.

use crate::domain::{LockConfig, Notice, Result, RunSummary, StatusMap};
use crate::infrastructure::{Clock, Modifier, Notifier, StateStore};

use super::lock::StateLock;
use super::orchestrator::{Orchestrator, TargetSource};
use super::status::{load_statuses, save_statuses};

/// What a trigger ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Another run held the lock for the whole timeout.
    LockUnavailable,
}

/// Process-wide injector state wired to its collaborators.
pub struct Injector<S, C, M, N, T> {
    store: S,
    clock: C,
    modifier: M,
    notifier: N,
    source: T,
    lock: LockConfig,
    statuses: StatusMap,
}

impl<S, C, M, N, T> Injector<S, C, M, N, T>
where
    S: StateStore,
    C: Clock,
    M: Modifier,
    N: Notifier,
    T: TargetSource,
{
    /// Wire the injector and load the persisted status map once.
    ///
    /// # Errors
    /// Returns error if the state store cannot be read.
    pub fn new(store: S, clock: C, modifier: M, notifier: N, source: T, lock: LockConfig) -> Result<Self> {
        let statuses = load_statuses(&store)?;
        tracing::debug!(known = statuses.len(), "Loaded extension status");

        Ok(Self {
            store,
            clock,
            modifier,
            notifier,
            source,
            lock,
            statuses,
        })
    }

    #[cfg(test)]
    pub const fn statuses(&self) -> &StatusMap {
        &self.statuses
    }

    /// Startup: one guarded run.
    ///
    /// # Errors
    /// Returns error if the state store fails or the configuration is invalid.
    pub async fn on_startup(&mut self) -> Result<RunOutcome> {
        tracing::info!("Startup injection run");
        self.guarded_run().await
    }

    /// Configuration change: reset every status, run, then prompt for reload.
    ///
    /// The reset is persisted before the lock is requested, so it happens
    /// even when the run is skipped.
    ///
    /// # Errors
    /// Returns error if the state store fails or the configuration is invalid.
    pub async fn on_configuration_change(&mut self) -> Result<RunOutcome> {
        tracing::info!("Configuration changed, re-injecting");

        self.statuses.reset_all();
        save_statuses(&self.store, &self.statuses)?;

        let outcome = self.guarded_run().await;
        self.notifier.notify(&Notice::ConfigurationChanged);
        outcome
    }

    async fn guarded_run(&mut self) -> Result<RunOutcome> {
        let lock = StateLock::new(&self.store, &self.clock, self.lock);

        if !lock.acquire(self.lock.timeout()).await? {
            tracing::warn!("Another injection run holds the lock, skipping");
            return Ok(RunOutcome::LockUnavailable);
        }

        let orchestrator =
            Orchestrator::new(&self.store, &self.modifier, &self.notifier, &self.source);
        let result = orchestrator.run(&mut self.statuses).await;
        lock.release()?;

        let summary = result?;
        tracing::info!(
            transitions = summary.transitions(),
            injected = summary.injected.len(),
            not_found = summary.not_found.len(),
            unchanged = summary.unchanged.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Injection run finished"
        );

        Ok(RunOutcome::Completed(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExtensionStatus, LockRecord, Target, TargetSettings, INJECTED_MARKER};
    use crate::infrastructure::clock::MockClock;
    use crate::infrastructure::modifier::ScriptedModifier;
    use crate::infrastructure::notifier::RecordingNotifier;
    use crate::infrastructure::state_store::MemoryStateStore;
    use crate::infrastructure::{LOCK_KEY, STATUS_KEY};
    use std::path::PathBuf;
    use std::time::Duration;

    const T0: i64 = 1_700_000_000_000;

    fn source() -> TargetSettings {
        TargetSettings {
            targets: vec![Target::new("A", [("X", "1")])],
            extension_parent_dir: Some(PathBuf::from("/ext")),
        }
    }

    fn quick_lock() -> LockConfig {
        LockConfig {
            timeout_ms: 500,
            ..LockConfig::default()
        }
    }

    type TestInjector<'a> = Injector<
        &'a MemoryStateStore,
        &'a MockClock,
        &'a ScriptedModifier,
        &'a RecordingNotifier,
        &'a TargetSettings,
    >;

    struct Fixture {
        store: MemoryStateStore,
        clock: MockClock,
        modifier: ScriptedModifier,
        notifier: RecordingNotifier,
        source: TargetSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let modifier = ScriptedModifier::new();
            modifier.respond("A", INJECTED_MARKER);
            Self {
                store: MemoryStateStore::new(),
                clock: MockClock::at(T0),
                modifier,
                notifier: RecordingNotifier::new(),
                source: source(),
            }
        }

        fn injector(&self) -> TestInjector<'_> {
            Injector::new(
                &self.store,
                &self.clock,
                &self.modifier,
                &self.notifier,
                &self.source,
                quick_lock(),
            )
            .unwrap()
        }
    }

    #[tokio::test]
    async fn test_startup_runs_and_releases_lock() {
        let fx = Fixture::new();
        let mut injector = fx.injector();

        let outcome = injector.on_startup().await.unwrap();
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(summary.injected, ["A"]);
        assert!(fx.store.get(LOCK_KEY).unwrap().is_none());
        assert_eq!(fx.notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_does_not_renotify() {
        let fx = Fixture::new();
        fx.injector().on_startup().await.unwrap();

        // A new process loads the persisted map
        let mut restarted = fx.injector();
        assert_eq!(restarted.statuses().get("A"), Some(ExtensionStatus::Injected));
        restarted.on_startup().await.unwrap();

        assert_eq!(fx.notifier.notices().len(), 1);
        assert_eq!(fx.modifier.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_configuration_change_resets_then_renotifies() {
        let fx = Fixture::new();
        let mut injector = fx.injector();
        injector.on_startup().await.unwrap();

        injector.on_configuration_change().await.unwrap();

        assert_eq!(
            fx.notifier.notices(),
            [
                Notice::Injected { target: "A".into() },
                Notice::Injected { target: "A".into() },
                Notice::ConfigurationChanged,
            ]
        );
        assert_eq!(injector.statuses().get("A"), Some(ExtensionStatus::Injected));
    }

    #[tokio::test]
    async fn test_reset_persisted_even_when_lock_unavailable() {
        let fx = Fixture::new();
        let mut injector = fx.injector();
        injector.on_startup().await.unwrap();

        let held = LockRecord {
            token: "other-window".into(),
            acquired_at_ms: T0 - 1_000,
        }
        .to_string();
        fx.store.put(LOCK_KEY, &held).unwrap();

        let outcome = injector.on_configuration_change().await.unwrap();
        assert_eq!(outcome, RunOutcome::LockUnavailable);

        assert_eq!(
            fx.store.get(STATUS_KEY).unwrap().as_deref(),
            Some(r#"{"A":"not modified"}"#)
        );
        assert_eq!(fx.store.get(LOCK_KEY).unwrap().as_deref(), Some(held.as_str()));
        assert_eq!(fx.modifier.calls().len(), 1);
        assert_eq!(
            fx.notifier.notices().last(),
            Some(&Notice::ConfigurationChanged)
        );
    }

    #[tokio::test]
    async fn test_lock_unavailable_skips_run() {
        let fx = Fixture::new();
        fx.store
            .put(
                LOCK_KEY,
                &LockRecord {
                    token: "other-window".into(),
                    acquired_at_ms: T0,
                }
                .to_string(),
            )
            .unwrap();

        let outcome = fx.injector().on_startup().await.unwrap();
        assert_eq!(outcome, RunOutcome::LockUnavailable);
        assert!(fx.modifier.calls().is_empty());
        assert!(fx.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_lock_is_recovered_on_next_trigger() {
        let fx = Fixture::new();
        fx.store
            .put(
                LOCK_KEY,
                &LockRecord {
                    token: "crashed-window".into(),
                    acquired_at_ms: T0,
                }
                .to_string(),
            )
            .unwrap();

        let mut injector = fx.injector();
        assert_eq!(
            injector.on_startup().await.unwrap(),
            RunOutcome::LockUnavailable
        );

        fx.clock.advance(Duration::from_secs(31));
        assert!(matches!(
            injector.on_startup().await.unwrap(),
            RunOutcome::Completed(_)
        ));
        assert!(fx.store.get(LOCK_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_error_still_releases_lock() {
        let fx = Fixture::new();
        let bad = crate::domain::AppConfig {
            targets: vec![
                crate::domain::TargetConfig {
                    extension_name: "A".into(),
                    env_vars: std::collections::BTreeMap::new(),
                },
                crate::domain::TargetConfig {
                    extension_name: "A".into(),
                    env_vars: std::collections::BTreeMap::new(),
                },
            ],
            ..Default::default()
        };

        let mut injector = Injector::new(
            &fx.store,
            &fx.clock,
            &fx.modifier,
            &fx.notifier,
            &bad,
            quick_lock(),
        )
        .unwrap();

        assert!(injector.on_startup().await.is_err());
        assert!(fx.store.get(LOCK_KEY).unwrap().is_none());
    }
}
