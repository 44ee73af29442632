//! Admission decisions over a decaying usage cache.
//!
//! [`UsageStrategy`] is the unsynchronized core: callers (normally
//! [`UsageGate`](crate::UsageGate)) must serialize access so that a
//! multi-key check and its follow-up increment happen as one step.

use crate::cache::DecayingCache;
use crate::clock::{Clock, MonotonicClock};
use crate::config::GateConfig;
use crate::error::{ConfigError, ReportError};
use crate::key::ResourceKey;
use crate::report::{FreezePolicy, UsageReport, UsageUpdate};
use crate::tunable::Tunable;
use std::sync::Arc;

/// Threshold + increment policy over a [`DecayingCache`].
#[derive(Debug)]
pub struct UsageStrategy {
    cache: DecayingCache<ResourceKey>,
    threshold: Tunable<f64>,
    increment: Tunable<f64>,
    freeze_policy: FreezePolicy,
}

impl UsageStrategy {
    pub fn new(config: &GateConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, MonotonicClock::default())
    }

    /// Build with an explicit clock for the cache.
    pub fn with_clock<C: Clock + 'static>(
        config: &GateConfig,
        clock: C,
    ) -> Result<Self, ConfigError> {
        Self::with_shared_clock(config, Arc::new(clock))
    }

    pub(crate) fn with_shared_clock(
        config: &GateConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache =
            DecayingCache::new(config.capacity(), config.decay()?)?.with_shared_clock(clock);
        Ok(Self {
            cache,
            threshold: Tunable::new(config.threshold_percent()),
            increment: Tunable::new(config.increment_amount()),
            freeze_policy: config.freeze_policy(),
        })
    }

    /// Whether a single key reads strictly below threshold. Unknown keys pass.
    pub fn check(&self, key: &ResourceKey) -> bool {
        self.below(key, self.threshold.value())
    }

    fn below(&self, key: &ResourceKey, threshold: f64) -> bool {
        match self.cache.get(key) {
            Some(usage) => usage < threshold,
            None => true,
        }
    }

    /// Admit the batch only if every key is below threshold; on success charge
    /// each distinct key the configured increment.
    pub fn check_admission(&mut self, keys: &[ResourceKey]) -> bool {
        let threshold = self.threshold.value();
        if !keys.iter().all(|key| self.below(key, threshold)) {
            return false;
        }
        let increment = self.increment.value();
        if increment > 0.0 {
            for (i, key) in keys.iter().enumerate() {
                if !keys[..i].contains(key) {
                    self.cache.increment(key, increment);
                }
            }
        }
        true
    }

    /// Apply a server usage report.
    ///
    /// Every well-formed part is written even when another part is broken;
    /// the first problem is returned after the rest has been applied.
    pub fn ingest(&mut self, report: &UsageReport) -> Result<usize, ReportError> {
        let (updates, errors) = report.updates(self.freeze_policy);
        let applied = updates.len();
        for update in updates {
            self.apply(update);
        }
        for error in &errors {
            tracing::warn!(
                target: "headroom::strategy",
                section = error.section(),
                error = %error,
                "skipped usage report data"
            );
        }
        match errors.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(applied),
        }
    }

    /// Write a single update into the cache.
    pub fn apply(&mut self, update: UsageUpdate) {
        tracing::debug!(
            target: "headroom::strategy",
            key = %update.key,
            value = update.value,
            freeze_ms = update.freeze.as_millis() as u64,
            "usage updated"
        );
        self.cache.set_frozen(update.key, update.value, update.freeze);
    }

    /// Effective usage for `key`.
    pub fn usage(&self, key: &ResourceKey) -> Option<f64> {
        self.cache.get(key)
    }

    pub fn cache(&self) -> &DecayingCache<ResourceKey> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut DecayingCache<ResourceKey> {
        &mut self.cache
    }

    pub fn threshold(&self) -> &Tunable<f64> {
        &self.threshold
    }

    pub fn increment(&self) -> &Tunable<f64> {
        &self.increment
    }

    pub fn freeze_policy(&self) -> FreezePolicy {
        self.freeze_policy
    }
}
