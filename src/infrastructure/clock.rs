//! Clock abstraction so lock timing can be driven by tests.
//!
//! - `SystemClock`: wall-clock epoch millis and real `tokio::time` sleeps
//! - `MockClock`: controllable time; `sleep()` advances it instead of waiting

use std::time::Duration;

/// Source of wall-clock time for the durable lock.
#[allow(async_fn_in_trait)]
pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// Suspend for the given duration.
    async fn sleep(&self, duration: Duration);
}

impl<T: Clock> Clock for &T {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}

/// Live implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Mock clock for unit tests.
/// - `now_millis()` only moves on `advance()`/`set()` or a `sleep()`
/// - `sleep()` advances time by its duration, then yields once to the runtime
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockClock {
    current: std::sync::Arc<std::sync::Mutex<i64>>,
}

#[cfg(test)]
impl MockClock {
    pub fn at(epoch_ms: i64) -> Self {
        let clock = Self::default();
        clock.set(epoch_ms);
        clock
    }

    pub fn advance(&self, duration: Duration) {
        *self.current.lock().unwrap() += i64::try_from(duration.as_millis()).unwrap();
    }

    pub fn set(&self, epoch_ms: i64) {
        *self.current.lock().unwrap() = epoch_ms;
    }
}

#[cfg(test)]
impl Clock for MockClock {
    fn now_millis(&self) -> i64 {
        *self.current.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
