//! Durable, cooperative mutual-exclusion lock.
//!
//! The lock is a single record in the shared state store. The store has no
//! compare-and-swap, so ownership is claimed by writing a fresh record and
//! reading it back: a racing writer that lands between the two steps makes
//! the confirmation fail. A narrow window remains where two writers both
//! confirm; that is accepted.
//!
//! A holder that dies without releasing leaves a record behind. Once the
//! record is older than the staleness threshold any acquirer may clear it,
//! but only while the stored value is still the stale one it read.

use std::time::Duration;

use crate::domain::{LockConfig, LockRecord, Result};
use crate::infrastructure::{Clock, StateStore, LOCK_KEY};

/// Result of a single acquisition attempt.
enum Attempt {
    Acquired(LockRecord),
    /// Our write was overwritten before it could be confirmed.
    LostRace,
    Held(LockRecord),
    /// Held past the staleness threshold, or unreadable. Carries the raw
    /// stored value for the conditional delete.
    Stale {
        raw: String,
        record: Option<LockRecord>,
    },
}

/// Handle on the single named lock in a state store.
pub struct StateLock<'a, S, C> {
    store: &'a S,
    clock: &'a C,
    settings: LockConfig,
}

impl<'a, S: StateStore, C: Clock> StateLock<'a, S, C> {
    #[must_use]
    pub const fn new(store: &'a S, clock: &'a C, settings: LockConfig) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Try to take the lock, waiting up to `timeout`.
    ///
    /// Returns `false` when the lock stayed with another holder for the
    /// whole timeout.
    ///
    /// # Errors
    /// Returns error if the state store fails.
    pub async fn acquire(&self, timeout: Duration) -> Result<bool> {
        let started = self.clock.now_millis();
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let retry = Duration::from_millis(self.settings.retry_interval_ms);

        loop {
            match self.attempt()? {
                Attempt::Acquired(record) => {
                    tracing::debug!(
                        token = %record.token,
                        waited_ms = self.clock.now_millis() - started,
                        "Lock acquired"
                    );
                    return Ok(true);
                }
                Attempt::Stale { raw, record } => {
                    self.clear_stale(&raw, record)?;
                    continue;
                }
                Attempt::LostRace => {
                    tracing::debug!("Lock write was overwritten by another acquirer");
                }
                Attempt::Held(record) => {
                    tracing::trace!(holder = %record.token, "Lock held, waiting");
                }
            }

            if self.clock.now_millis() - started >= timeout_ms {
                tracing::info!(timeout_ms, "Timed out waiting for lock");
                return Ok(false);
            }

            self.clock.sleep(retry).await;
        }
    }

    /// Clear the lock record, whoever holds it.
    ///
    /// # Errors
    /// Returns error if the state store fails.
    pub fn release(&self) -> Result<()> {
        self.store.delete(LOCK_KEY)?;
        tracing::debug!("Lock released");
        Ok(())
    }

    /// Current lock record, if any and readable.
    ///
    /// # Errors
    /// Returns error if the state store fails.
    pub fn holder(&self) -> Result<Option<LockRecord>> {
        Ok(self
            .store
            .get(LOCK_KEY)?
            .and_then(|raw| raw.parse::<LockRecord>().ok()))
    }

    fn attempt(&self) -> Result<Attempt> {
        let now = self.clock.now_millis();

        let Some(raw) = self.store.get(LOCK_KEY)? else {
            let record = LockRecord::generate(now);
            return Ok(if self.write_and_confirm(&record)? {
                Attempt::Acquired(record)
            } else {
                Attempt::LostRace
            });
        };

        let Ok(record) = raw.parse::<LockRecord>() else {
            return Ok(Attempt::Stale { raw, record: None });
        };

        let stale_after = i64::try_from(self.settings.stale_after_ms).unwrap_or(i64::MAX);
        if record.age_ms(now) >= stale_after {
            Ok(Attempt::Stale {
                raw,
                record: Some(record),
            })
        } else {
            Ok(Attempt::Held(record))
        }
    }

    /// Delete the stale record `raw`, unless someone replaced it since it was read.
    fn clear_stale(&self, raw: &str, record: Option<LockRecord>) -> Result<bool> {
        let holder = record.map(|r| r.token);
        let cleared = self.store.delete_if(LOCK_KEY, raw)?;
        if cleared {
            tracing::warn!(?holder, "Cleared stale lock");
        } else {
            tracing::debug!(?holder, "Stale lock already replaced");
        }
        Ok(cleared)
    }

    /// Best-effort compare-and-swap: write, then read back. Not atomic.
    fn write_and_confirm(&self, record: &LockRecord) -> Result<bool> {
        let value = record.to_string();
        self.store.put(LOCK_KEY, &value)?;
        Ok(self.store.get(LOCK_KEY)?.as_deref() == Some(value.as_str()))
    }
}
