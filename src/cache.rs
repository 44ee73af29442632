//! Bounded store of numeric values that erode with time unless frozen.
//!
//! Each entry keeps the raw value it was written with, the time it was
//! written (its anchor) and an optional freeze deadline. Reads compute the
//! effective value on the fly:
//!
//! - frozen and the deadline is still ahead: the raw value, untouched
//! - otherwise: `max(value - decay_rate * floor(elapsed / decay_interval), lower_limit)`
//!   with `elapsed` measured from the anchor
//!
//! Decay is never applied destructively, so reads do not mutate the store.
//!
//! ## Eviction
//!
//! When an insert of a new key would exceed `capacity`, settled entries
//! (unfrozen and already decayed down to `lower_limit`) are dropped first. If
//! that is not enough, the least-recently-written entries go next.
//! `set`/`set_frozen` refresh an entry's write order; `increment` does not.
//!
//! Cost: overwrites and write-order evictions are O(1) amortized. Write
//! order lives in a queue that may hold stale slots for
//! overwritten keys; it is compacted once it outgrows the map. The settled
//! purge is a full O(n) scan, so it runs at most once per `decay_interval`
//! (entries only settle as time passes); in between, a full cache evicts by
//! write order alone.

use crate::clock::{Clock, MonotonicClock};
use crate::error::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Decay law shared by every entry in a cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    decay_rate: f64,
    decay_interval: Duration,
    lower_limit: f64,
}

impl DecayConfig {
    /// Validated decay law. `decay_rate == 0` disables decay.
    pub fn new(
        decay_rate: f64,
        decay_interval: Duration,
        lower_limit: f64,
    ) -> Result<Self, ConfigError> {
        let cfg = Self { decay_rate, decay_interval, lower_limit };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Values never decay.
    pub fn none() -> Self {
        Self { decay_rate: 0.0, decay_interval: Duration::from_secs(1), lower_limit: 0.0 }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(ConfigError::InvalidDecayRate { provided: self.decay_rate });
        }
        if self.decay_interval.as_millis() == 0 {
            return Err(ConfigError::InvalidDecayInterval(self.decay_interval));
        }
        if !self.lower_limit.is_finite() {
            return Err(ConfigError::InvalidLowerLimit { provided: self.lower_limit });
        }
        Ok(())
    }

    /// Amount subtracted per full interval.
    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    /// Length of one decay step.
    pub fn decay_interval(&self) -> Duration {
        self.decay_interval
    }

    /// Floor decay never goes below.
    pub fn lower_limit(&self) -> f64 {
        self.lower_limit
    }

    fn interval_millis(&self) -> u64 {
        u64::try_from(self.decay_interval.as_millis()).unwrap_or(u64::MAX).max(1)
    }

    /// Effective value of `value` written at `anchor`, read at `now`.
    fn apply(&self, value: f64, anchor: u64, now: u64) -> f64 {
        // Values already at or under the floor are left alone: decay must not raise them.
        if value <= self.lower_limit || self.decay_rate == 0.0 {
            return value;
        }
        let steps = now.saturating_sub(anchor) / self.interval_millis();
        (value - self.decay_rate * steps as f64).max(self.lower_limit)
    }
}

/// Stored state for one key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheEntry {
    value: f64,
    anchor_millis: u64,
    frozen_until_millis: Option<u64>,
    written: u64,
}

impl CacheEntry {
    /// Raw value as written (plus any increments).
    pub fn raw_value(&self) -> f64 {
        self.value
    }

    /// Clock reading at write time.
    pub fn anchor_millis(&self) -> u64 {
        self.anchor_millis
    }

    /// Freeze deadline, if the entry was written frozen.
    pub fn frozen_until_millis(&self) -> Option<u64> {
        self.frozen_until_millis
    }

    fn is_frozen_at(&self, now: u64) -> bool {
        self.frozen_until_millis.is_some_and(|until| now < until)
    }

    fn effective(&self, decay: &DecayConfig, now: u64) -> f64 {
        if self.is_frozen_at(now) {
            self.value
        } else {
            decay.apply(self.value, self.anchor_millis, now)
        }
    }

    fn is_settled(&self, decay: &DecayConfig, now: u64) -> bool {
        !self.is_frozen_at(now) && self.effective(decay, now) <= decay.lower_limit
    }
}

/// Bounded key → decaying value store.
///
/// Not internally synchronized; the gate wraps it in its own critical section.
#[derive(Debug)]
pub struct DecayingCache<K> {
    entries: IndexMap<K, CacheEntry>,
    // (write sequence, key), oldest first; a slot is stale once its key was rewritten or removed.
    order: VecDeque<(u64, K)>,
    next_write: u64,
    last_purge_millis: Option<u64>,
    capacity: usize,
    decay: DecayConfig,
    clock: Arc<dyn Clock>,
}

impl<K> DecayingCache<K>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
{
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize, decay: DecayConfig) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidCapacity { provided: capacity });
        }
        decay.validate()?;
        Ok(Self {
            entries: IndexMap::with_capacity(capacity.min(1024)),
            order: VecDeque::new(),
            next_write: 0,
            last_purge_millis: None,
            capacity,
            decay,
            clock: Arc::new(MonotonicClock::default()),
        })
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub(crate) fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Store `value` anchored now, unfrozen. Overwrites any prior entry.
    pub fn set(&mut self, key: K, value: f64) {
        let now = self.clock.now_millis();
        self.insert(key, value, now, None);
    }

    /// Store `value` and hold it undecayed for `freeze`.
    ///
    /// A zero freeze is a plain [`set`](Self::set).
    pub fn set_frozen(&mut self, key: K, value: f64, freeze: Duration) {
        if freeze.is_zero() {
            return self.set(key, value);
        }
        let now = self.clock.now_millis();
        let freeze_millis = u64::try_from(freeze.as_millis()).unwrap_or(u64::MAX);
        self.insert(key, value, now, Some(now.saturating_add(freeze_millis)));
    }

    /// Effective value for `key`, or `None` if it was never set or has been evicted.
    pub fn get<Q>(&self, key: &Q) -> Option<f64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now_millis();
        self.entries.get(key).map(|entry| entry.effective(&self.decay, now))
    }

    /// Add `delta` to the raw value, keeping its anchor and freeze.
    ///
    /// Absent keys are left absent; returns whether an entry was updated.
    pub fn increment<Q>(&mut self, key: &Q, delta: f64) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value += delta;
                true
            }
            None => false,
        }
    }

    /// Whether `key` is currently frozen.
    pub fn is_frozen<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now_millis();
        self.entries.get(key).is_some_and(|entry| entry.is_frozen_at(now))
    }

    /// Raw stored entry for `key`.
    pub fn entry<Q>(&self, key: &Q) -> Option<&CacheEntry>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<CacheEntry>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.swap_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn decay(&self) -> &DecayConfig {
        &self.decay
    }

    fn insert(&mut self, key: K, value: f64, anchor_millis: u64, frozen_until_millis: Option<u64>) {
        if !self.entries.contains_key(&key) {
            self.evict_if_full();
        }
        let written = self.next_write;
        self.next_write += 1;
        self.order.push_back((written, key.clone()));
        self.entries.insert(key, CacheEntry { value, anchor_millis, frozen_until_millis, written });
        self.compact_order();
    }

    fn is_current(&self, written: u64, key: &K) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.written == written)
    }

    fn compact_order(&mut self) {
        if self.order.len() <= self.entries.len().saturating_mul(2).max(64) {
            return;
        }
        let entries = &self.entries;
        self.order.retain(|(written, key)| entries.get(key).is_some_and(|e| e.written == *written));
    }

    fn purge_due(&self, now: u64) -> bool {
        match self.last_purge_millis {
            Some(last) => now.saturating_sub(last) >= self.decay.interval_millis(),
            None => true,
        }
    }

    fn evict_if_full(&mut self) {
        if self.entries.len() < self.capacity {
            return;
        }
        let now = self.clock.now_millis();
        let decay = self.decay;
        if self.purge_due(now) {
            self.last_purge_millis = Some(now);
            self.entries.retain(|_, entry| !entry.is_settled(&decay, now));
        }
        while self.entries.len() >= self.capacity {
            let Some((written, key)) = self.order.pop_front() else { break };
            if !self.is_current(written, &key) {
                continue;
            }
            if let Some(entry) = self.entries.swap_remove(&key) {
                tracing::warn!(
                    target: "headroom::cache",
                    key = ?key,
                    value = entry.effective(&decay, now),
                    "evicting live usage entry; cache at capacity"
                );
            }
        }
    }
}
