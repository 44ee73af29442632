//! Live-updatable knobs shared between a gate and its operators.
//!
//! Reads are lock-free (`ArcSwap`), so the admission hot path never contends
//! with an operator turning the threshold up or down.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Shared value with cheap snapshots and whole-value replacement.
#[derive(Debug)]
pub struct Tunable<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for Tunable<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> Tunable<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// Snapshot the current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replace the value entirely.
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }
}

impl<T: Copy> Tunable<T> {
    /// Copy out the current value.
    pub fn value(&self) -> T {
        **self.inner.load()
    }
}
