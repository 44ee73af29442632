//! Blocking admission gate over a [`UsageStrategy`].
//!
//! One mutex guards the strategy; every check, increment and report runs
//! inside it. Waiters park on a shared [`Notify`] and wake when a report lands
//! (or the threshold changes), and at the latest after `check_interval` so
//! that decay alone can let them through.
//!
//! There is no FIFO guarantee: whichever waiter re-checks first after usage
//! drops may win, including one that arrived later. A waiter can in principle
//! starve under sustained contention. The remote API is the bottleneck here,
//! so the gate trades fairness for a single lock and no per-waiter state.
//!
//! Dropping an `acquire` future cancels it. The waiter leaves the wait set and
//! nothing else changes; wrap the call in your own deadline or use
//! [`UsageGate::acquire_timeout`].

use crate::clock::{Clock, MonotonicClock};
use crate::config::{validate_increment, validate_threshold, GateConfig};
use crate::error::{ConfigError, GateError};
use crate::key::ResourceKey;
use crate::report::UsageReport;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::strategy::UsageStrategy;
use crate::tunable::Tunable;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug)]
struct Shared {
    strategy: Mutex<UsageStrategy>,
    wake: Notify,
    threshold: Tunable<f64>,
    increment: Tunable<f64>,
    check_interval: Duration,
}

/// Shared admission gate. Clones share the same state.
///
/// ```
/// use headroom::{GateConfig, ResourceKey, UsageGate, UsageReport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let gate = UsageGate::new(GateConfig::builder().threshold_percent(50.0).build()?)?;
/// let key = ResourceKey::usage("act_1", "ads_insights");
///
/// gate.acquire(&[key.clone()]).await;
/// // ... call the remote API, then feed its headers back:
/// let report = UsageReport::from_headers([(
///     "x-business-use-case-usage",
///     r#"{"act_1":[{"type":"ads_insights","call_count":30,"total_time":7}]}"#,
/// )]);
/// gate.report_and_wake(&report)?;
/// assert_eq!(gate.usage(&key), Some(30.0));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct UsageGate {
    shared: Arc<Shared>,
    sleeper: Arc<dyn Sleeper>,
}

impl UsageGate {
    pub fn new(config: GateConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, MonotonicClock::default())
    }

    /// Build a gate whose cache reads time from `clock`.
    pub fn with_clock<C: Clock + 'static>(
        config: GateConfig,
        clock: C,
    ) -> Result<Self, ConfigError> {
        let strategy = UsageStrategy::with_shared_clock(&config, Arc::new(clock))?;
        Ok(Self::from_strategy(strategy, config.check_interval()))
    }

    /// Wrap an existing strategy.
    pub fn from_strategy(strategy: UsageStrategy, check_interval: Duration) -> Self {
        let threshold = strategy.threshold().clone();
        let increment = strategy.increment().clone();
        Self {
            shared: Arc::new(Shared {
                strategy: Mutex::new(strategy),
                wake: Notify::new(),
                threshold,
                increment,
                check_interval,
            }),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Override how waiters pause between re-checks.
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Wait until every key reads below threshold, then charge the increment.
    ///
    /// Never busy-spins and has no deadline of its own.
    pub async fn acquire(&self, keys: &[ResourceKey]) {
        let mut rechecks: u64 = 0;
        loop {
            // Register for wake-ups before checking so a report landing between
            // the check and the wait is not missed.
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_acquire(keys) {
                tracing::debug!(target: "headroom::gate", keys = keys.len(), rechecks, "admitted");
                return;
            }
            tracing::trace!(
                target: "headroom::gate",
                keys = keys.len(),
                rechecks,
                "over threshold; waiting"
            );

            tokio::select! {
                _ = notified.as_mut() => {}
                _ = self.sleeper.sleep(self.shared.check_interval) => {}
            }
            rechecks += 1;
        }
    }

    /// [`acquire`](Self::acquire) with an upper bound on the wait.
    pub async fn acquire_timeout(
        &self,
        keys: &[ResourceKey],
        timeout: Duration,
    ) -> Result<(), GateError> {
        let start = tokio::time::Instant::now();
        tokio::time::timeout(timeout, self.acquire(keys)).await.map_err(|_| {
            let waited = start.elapsed();
            tracing::debug!(
                target: "headroom::gate",
                waited_ms = waited.as_millis() as u64,
                "admission timed out"
            );
            GateError::Timeout { waited }
        })
    }

    /// One atomic check-and-charge; never waits.
    pub fn try_acquire(&self, keys: &[ResourceKey]) -> bool {
        self.lock().check_admission(keys)
    }

    /// Apply a usage report and wake every waiter to re-check.
    ///
    /// Waiters are woken even when part of the report was rejected, since the
    /// well-formed parts have already been written. Returns the number of keys updated.
    pub fn report_and_wake(&self, report: &UsageReport) -> Result<usize, GateError> {
        let result = self.lock().ingest(report);
        self.wake_all();
        result.map_err(GateError::from)
    }

    /// Wake every waiter to re-check, e.g. after editing the strategy directly.
    pub fn wake_all(&self) {
        self.shared.wake.notify_waiters();
    }

    /// Run `f` inside the gate's critical section, then wake waiters.
    pub fn update<R>(&self, f: impl FnOnce(&mut UsageStrategy) -> R) -> R {
        let mut guard = self.lock();
        let out = f(&mut *guard);
        drop(guard);
        self.wake_all();
        out
    }

    /// Effective usage for `key`.
    pub fn usage(&self, key: &ResourceKey) -> Option<f64> {
        self.lock().usage(key)
    }

    pub fn threshold(&self) -> f64 {
        self.shared.threshold.value()
    }

    /// Change the threshold live; waiters re-check immediately.
    pub fn set_threshold(&self, threshold: f64) -> Result<(), ConfigError> {
        validate_threshold(threshold)?;
        tracing::info!(target: "headroom::gate", threshold, "threshold changed");
        self.shared.threshold.set(threshold);
        self.wake_all();
        Ok(())
    }

    pub fn increment(&self) -> f64 {
        self.shared.increment.value()
    }

    /// Change the per-admission increment live.
    pub fn set_increment(&self, increment: f64) -> Result<(), ConfigError> {
        validate_increment(increment)?;
        self.shared.increment.set(increment);
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        self.shared.check_interval
    }

    fn lock(&self) -> MutexGuard<'_, UsageStrategy> {
        // Every mutation is a per-key overwrite, so a panic elsewhere cannot
        // leave the strategy half-written.
        self.shared.strategy.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
