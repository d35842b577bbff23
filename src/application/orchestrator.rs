//! Injection run: one modify call per configured target.
//!
//! Must only run while the durable lock is held. Notices fire on status
//! transitions only, so repeated runs with the same result stay quiet.

use std::path::PathBuf;

use crate::domain::{
    AppConfig, ExtensionStatus, Notice, Result, RunSummary, StatusMap, TargetSettings,
};
use crate::infrastructure::{find_default_extensions_dir, ConfigFile, Modifier, Notifier, StateStore};

use super::status::save_statuses;

/// Where the targets for a run come from. Read again on every run.
pub trait TargetSource {
    /// Load the current targets.
    ///
    /// # Errors
    /// Returns error if the configuration cannot be read or is invalid.
    fn load_targets(&self) -> Result<TargetSettings>;
}

impl<T: TargetSource + ?Sized> TargetSource for &T {
    fn load_targets(&self) -> Result<TargetSettings> {
        (**self).load_targets()
    }
}

impl TargetSource for ConfigFile {
    fn load_targets(&self) -> Result<TargetSettings> {
        self.load()?.target_settings()
    }
}

impl TargetSource for AppConfig {
    fn load_targets(&self) -> Result<TargetSettings> {
        self.target_settings()
    }
}

impl TargetSource for TargetSettings {
    fn load_targets(&self) -> Result<TargetSettings> {
        Ok(self.clone())
    }
}

/// Runs the modify operation for each target and records transitions.
pub struct Orchestrator<'a, S, M, N, T> {
    store: &'a S,
    modifier: &'a M,
    notifier: &'a N,
    source: &'a T,
}

impl<'a, S, M, N, T> Orchestrator<'a, S, M, N, T>
where
    S: StateStore,
    M: Modifier,
    N: Notifier,
    T: TargetSource,
{
    #[must_use]
    pub const fn new(store: &'a S, modifier: &'a M, notifier: &'a N, source: &'a T) -> Self {
        Self {
            store,
            modifier,
            notifier,
            source,
        }
    }

    /// Process every configured target in order.
    ///
    /// Modify failures are logged and leave the target's status alone.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or a status cannot be
    /// persisted.
    pub async fn run(&self, statuses: &mut StatusMap) -> Result<RunSummary> {
        let settings = self.source.load_targets()?;
        let mut summary = RunSummary::default();

        if settings.targets.is_empty() {
            tracing::info!("No target extensions configured");
            return Ok(summary);
        }

        let Some(parent_dir) = resolve_parent_dir(settings.extension_parent_dir) else {
            tracing::warn!("No extensions directory found; set extension_parent_dir");
            return Ok(summary);
        };
        tracing::info!(
            targets = settings.targets.len(),
            "Injecting into extensions under {}",
            parent_dir.display()
        );

        for target in &settings.targets {
            if target.variables.is_empty() {
                tracing::warn!(extension = %target.id, "No env vars configured, skipping");
                summary.skipped.push(target.id.clone());
                continue;
            }

            let outcome = match self.modifier.modify(&parent_dir, target).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(extension = %target.id, "{}", e);
                    summary.failed.push(target.id.clone());
                    continue;
                }
            };

            let Some(status) = outcome.status() else {
                tracing::debug!(extension = %target.id, "Modify output had no result marker");
                summary.unchanged.push(target.id.clone());
                continue;
            };

            // Commit in memory only once the new map is persisted
            let mut updated = statuses.clone();
            if !updated.transition(&target.id, status) {
                tracing::debug!(extension = %target.id, %status, "Status unchanged");
                summary.unchanged.push(target.id.clone());
                continue;
            }
            save_statuses(self.store, &updated)?;
            *statuses = updated;
            tracing::info!(extension = %target.id, %status, "Status changed");

            let target_id = target.id.clone();
            if status == ExtensionStatus::Injected {
                self.notifier.notify(&Notice::Injected { target: target_id });
                summary.injected.push(target.id.clone());
            } else {
                self.notifier.notify(&Notice::NotFound { target: target_id });
                summary.not_found.push(target.id.clone());
            }
        }

        Ok(summary)
    }
}

fn resolve_parent_dir(configured: Option<PathBuf>) -> Option<PathBuf> {
    configured.or_else(find_default_extensions_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::status::load_statuses;
    use crate::domain::{Target, INJECTED_MARKER, NOT_FOUND_MARKER};
    use crate::infrastructure::modifier::ScriptedModifier;
    use crate::infrastructure::notifier::RecordingNotifier;
    use crate::infrastructure::state_store::MemoryStateStore;
    use std::path::Path;

    /// Store whose writes fail while `failing` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStateStore,
        failing: std::sync::atomic::AtomicBool,
    }

    impl FlakyStore {
        fn set_failing(&self, failing: bool) {
            self.failing
                .store(failing, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl StateStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: &str) -> Result<()> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(crate::domain::AppError::InvalidData {
                    message: "disk full".into(),
                });
            }
            self.inner.put(key, value)
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key)
        }

        fn delete_if(&self, key: &str, expected: &str) -> Result<bool> {
            self.inner.delete_if(key, expected)
        }
    }

    fn settings(targets: Vec<Target>) -> TargetSettings {
        TargetSettings {
            targets,
            extension_parent_dir: Some(PathBuf::from("/ext")),
        }
    }

    struct Fixture {
        store: MemoryStateStore,
        modifier: ScriptedModifier,
        notifier: RecordingNotifier,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStateStore::new(),
                modifier: ScriptedModifier::new(),
                notifier: RecordingNotifier::new(),
            }
        }

        async fn run(&self, source: &TargetSettings, statuses: &mut StatusMap) -> RunSummary {
            Orchestrator::new(&self.store, &self.modifier, &self.notifier, source)
                .run(statuses)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_injected_target_notifies_once() {
        let fx = Fixture::new();
        fx.modifier
            .respond("A", &format!("{INJECTED_MARKER} into /ext/A/dist/extension.js"));
        let source = settings(vec![Target::new("A", [("X", "1")])]);
        let mut statuses = StatusMap::new();

        let summary = fx.run(&source, &mut statuses).await;
        assert_eq!(summary.injected, ["A"]);
        assert_eq!(statuses.get("A"), Some(ExtensionStatus::Injected));
        assert_eq!(
            load_statuses(&fx.store).unwrap().get("A"),
            Some(ExtensionStatus::Injected)
        );
        assert_eq!(
            fx.notifier.notices(),
            [Notice::Injected { target: "A".into() }]
        );

        let summary = fx.run(&source, &mut statuses).await;
        assert_eq!(summary.unchanged, ["A"]);
        assert_eq!(summary.transitions(), 0);
        assert_eq!(statuses.get("A"), Some(ExtensionStatus::Injected));
        assert_eq!(fx.notifier.notices().len(), 1);
        assert_eq!(fx.modifier.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_not_found_warns_without_reload() {
        let fx = Fixture::new();
        fx.modifier.respond(
            "B",
            &format!("{NOT_FOUND_MARKER}, with base name: B in: /ext"),
        );
        let source = settings(vec![Target::new("B", [("Y", "2")])]);
        let mut statuses = StatusMap::new();

        let summary = fx.run(&source, &mut statuses).await;
        assert_eq!(summary.not_found, ["B"]);
        assert_eq!(statuses.get("B"), Some(ExtensionStatus::NotFound));

        let notices = fx.notifier.notices();
        assert_eq!(notices, [Notice::NotFound { target: "B".into() }]);
        assert!(!notices[0].offers_reload());
    }

    #[tokio::test]
    async fn test_reset_target_notifies_again() {
        let fx = Fixture::new();
        fx.modifier.respond("A", INJECTED_MARKER);
        let source = settings(vec![Target::new("A", [("X", "1")])]);
        let mut statuses = StatusMap::new();
        statuses.transition("A", ExtensionStatus::NotModified);

        fx.run(&source, &mut statuses).await;
        assert_eq!(fx.notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_status_for_next_run() {
        let store = FlakyStore::default();
        let modifier = ScriptedModifier::new();
        modifier.respond("A", INJECTED_MARKER);
        let notifier = RecordingNotifier::new();
        let source = settings(vec![Target::new("A", [("X", "1")])]);
        let orchestrator = Orchestrator::new(&store, &modifier, &notifier, &source);
        let mut statuses = StatusMap::new();

        store.set_failing(true);
        assert!(orchestrator.run(&mut statuses).await.is_err());
        assert_eq!(statuses.get("A"), None);
        assert!(notifier.notices().is_empty());

        store.set_failing(false);
        let summary = orchestrator.run(&mut statuses).await.unwrap();
        assert_eq!(summary.injected, ["A"]);
        assert_eq!(statuses.get("A"), Some(ExtensionStatus::Injected));
        assert_eq!(notifier.notices(), [Notice::Injected { target: "A".into() }]);
    }

    #[tokio::test]
    async fn test_empty_targets_is_a_no_op() {
        let fx = Fixture::new();
        let mut statuses = StatusMap::new();

        let summary = fx.run(&settings(Vec::new()), &mut statuses).await;
        assert_eq!(summary, RunSummary::default());
        assert!(fx.modifier.calls().is_empty());
        assert!(fx.store.get(crate::infrastructure::STATUS_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_target_without_vars_is_skipped() {
        let fx = Fixture::new();
        fx.modifier.respond("B", INJECTED_MARKER);
        let source = settings(vec![
            Target::new("A", Vec::<(String, String)>::new()),
            Target::new("B", [("X", "1")]),
        ]);
        let mut statuses = StatusMap::new();

        let summary = fx.run(&source, &mut statuses).await;
        assert_eq!(summary.skipped, ["A"]);
        assert_eq!(summary.injected, ["B"]);
        assert_eq!(statuses.get("A"), None);

        let called: Vec<_> = fx.modifier.calls().into_iter().map(|c| c.1).collect();
        assert_eq!(called, ["B"]);
    }

    #[tokio::test]
    async fn test_failure_keeps_prior_status_and_continues() {
        let fx = Fixture::new();
        fx.modifier
            .fail("A", "exit status 1")
            .respond("B", INJECTED_MARKER);
        let source = settings(vec![
            Target::new("A", [("X", "1")]),
            Target::new("B", [("X", "1")]),
        ]);
        let mut statuses = StatusMap::new();
        statuses.transition("A", ExtensionStatus::NotFound);

        let summary = fx.run(&source, &mut statuses).await;
        assert_eq!(summary.failed, ["A"]);
        assert_eq!(summary.injected, ["B"]);
        assert_eq!(statuses.get("A"), Some(ExtensionStatus::NotFound));
        assert_eq!(
            fx.notifier.notices(),
            [Notice::Injected { target: "B".into() }]
        );
    }

    #[tokio::test]
    async fn test_unrecognized_output_changes_nothing() {
        let fx = Fixture::new();
        fx.modifier.respond("A", "Error: extension.js not found");
        let source = settings(vec![Target::new("A", [("X", "1")])]);
        let mut statuses = StatusMap::new();

        let summary = fx.run(&source, &mut statuses).await;
        assert_eq!(summary.unchanged, ["A"]);
        assert!(statuses.is_empty());
        assert!(fx.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_modify_receives_parent_dir_and_json_vars() {
        let fx = Fixture::new();
        let source = settings(vec![Target::new("A", [("X", "1"), ("Y", "two")])]);

        fx.run(&source, &mut StatusMap::new()).await;

        let calls = fx.modifier.calls();
        let (parent, id, vars) = &calls[0];
        assert_eq!(parent, Path::new("/ext"));
        assert_eq!(id, "A");
        assert_eq!(vars, r#"{"X":"1","Y":"two"}"#);
    }

    #[tokio::test]
    async fn test_targets_processed_in_configured_order() {
        let fx = Fixture::new();
        let source = settings(vec![
            Target::new("c", [("X", "1")]),
            Target::new("a", [("X", "1")]),
            Target::new("b", [("X", "1")]),
        ]);

        fx.run(&source, &mut StatusMap::new()).await;

        let called: Vec<_> = fx.modifier.calls().into_iter().map(|c| c.1).collect();
        assert_eq!(called, ["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let fx = Fixture::new();
        let config: AppConfig = toml::from_str(
            r#"
            [[targets]]
            extension_name = "A"
            [[targets]]
            extension_name = "A"
            "#,
        )
        .unwrap();

        let result = Orchestrator::new(&fx.store, &fx.modifier, &fx.notifier, &config)
            .run(&mut StatusMap::new())
            .await;
        assert!(result.is_err());
        assert!(fx.modifier.calls().is_empty());
    }
}
