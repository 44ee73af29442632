//! Gate configuration, builder and presets.
//!
//! Durations serialize as integer milliseconds (`*_ms` fields), so a config
//! can live in any serde format:
//!
//! ```
//! use headroom::GateConfig;
//! let cfg: GateConfig = serde_json::from_str(r#"{
//!     "capacity": 500,
//!     "decay_rate": 5.0,
//!     "decay_interval_ms": 30000,
//!     "lower_limit": 0.0,
//!     "threshold_percent": 75.0,
//!     "increment_amount": 1.0,
//!     "check_interval_ms": 5000,
//!     "freeze_policy": "minutes_plus_one"
//! }"#).unwrap();
//! cfg.validate().unwrap();
//! assert_eq!(cfg.threshold_percent(), 75.0);
//! ```

use crate::cache::DecayConfig;
use crate::error::ConfigError;
use crate::report::FreezePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub(crate) const DEFAULT_CAPACITY: usize = 10_000;
pub(crate) const DEFAULT_THRESHOLD_PERCENT: f64 = 80.0;
const DEFAULT_DECAY_RATE: f64 = 10.0;
const DEFAULT_DECAY_INTERVAL_SECS: u64 = 60;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 5;

/// Everything needed to build a [`UsageGate`](crate::UsageGate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    capacity: usize,
    decay_rate: f64,
    #[serde(rename = "decay_interval_ms", with = "millis")]
    decay_interval: Duration,
    lower_limit: f64,
    threshold_percent: f64,
    increment_amount: f64,
    #[serde(rename = "check_interval_ms", with = "millis")]
    check_interval: Duration,
    freeze_policy: FreezePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            decay_rate: DEFAULT_DECAY_RATE,
            decay_interval: Duration::from_secs(DEFAULT_DECAY_INTERVAL_SECS),
            lower_limit: 0.0,
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            increment_amount: 0.0,
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            freeze_policy: FreezePolicy::default(),
        }
    }
}

impl GateConfig {
    pub fn builder() -> GateConfigBuilder {
        GateConfigBuilder { config: Self::default() }
    }

    /// Check every field; deserialized configs should call this before use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidCapacity { provided: self.capacity });
        }
        validate_threshold(self.threshold_percent)?;
        validate_increment(self.increment_amount)?;
        if self.check_interval.is_zero() {
            return Err(ConfigError::InvalidCheckInterval(self.check_interval));
        }
        self.decay().map(|_| ())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    pub fn decay_interval(&self) -> Duration {
        self.decay_interval
    }

    pub fn lower_limit(&self) -> f64 {
        self.lower_limit
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    pub fn increment_amount(&self) -> f64 {
        self.increment_amount
    }

    /// Upper bound between re-checks of a blocked `acquire` when nobody wakes it.
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn freeze_policy(&self) -> FreezePolicy {
        self.freeze_policy
    }

    /// Decay law for the underlying cache, checked field by field.
    pub fn decay(&self) -> Result<DecayConfig, ConfigError> {
        DecayConfig::new(self.decay_rate, self.decay_interval, self.lower_limit)
    }
}

pub(crate) fn validate_threshold(threshold: f64) -> Result<(), ConfigError> {
    if threshold.is_finite() && (0.0..=100.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { provided: threshold })
    }
}

pub(crate) fn validate_increment(increment: f64) -> Result<(), ConfigError> {
    if increment.is_finite() && increment >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidIncrement { provided: increment })
    }
}

/// Builder for [`GateConfig`]; `build` validates.
#[derive(Debug, Clone)]
pub struct GateConfigBuilder {
    config: GateConfig,
}

impl GateConfigBuilder {
    /// Maximum number of tracked keys.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Decay `rate` points every `interval`, never below `lower_limit`.
    pub fn decay(mut self, rate: f64, interval: Duration, lower_limit: f64) -> Self {
        self.config.decay_rate = rate;
        self.config.decay_interval = interval;
        self.config.lower_limit = lower_limit;
        self
    }

    /// Stored values never decay.
    pub fn no_decay(mut self) -> Self {
        self.config.decay_rate = 0.0;
        self
    }

    /// Keys at or above this percentage block admission.
    pub fn threshold_percent(mut self, threshold: f64) -> Self {
        self.config.threshold_percent = threshold;
        self
    }

    /// Load added to every admitted key.
    pub fn increment_amount(mut self, increment: f64) -> Self {
        self.config.increment_amount = increment;
        self
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.config.check_interval = interval;
        self
    }

    pub fn freeze_policy(mut self, policy: FreezePolicy) -> Self {
        self.config.freeze_policy = policy;
        self
    }

    pub fn build(self) -> Result<GateConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Ready-made configurations.
pub mod presets {
    use super::*;

    /// Defaults tuned for the Graph-style usage headers: threshold 80%,
    /// 10 points of decay per minute, re-check every 5 s, no admission increment.
    pub fn graph_api() -> GateConfig {
        GateConfig::default()
    }

    /// Backs off earlier and charges each admission, for callers sharing a
    /// quota with other processes.
    pub fn conservative() -> GateConfig {
        GateConfig { threshold_percent: 50.0, increment_amount: 1.0, ..GateConfig::default() }
    }
}
