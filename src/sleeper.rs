//! Pause between re-checks of a blocked admission.
//!
//! The gate never busy-spins: a waiter parks on the wake signal and, at most
//! every `check_interval`, on a [`Sleeper`] so that clock-only decay can
//! eventually admit it. Swapping the sleeper keeps tests off the wall clock.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Abstraction for sleeping/waiting
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Production sleeper using tokio runtime
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Sleeper that only yields to the scheduler.
///
/// A waiter using it re-checks on every poll, so reserve it for tests that
/// drive time through a manual clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::task::yield_now())
    }
}

/// Records every requested pause, then sleeps through `inner`.
#[derive(Debug, Clone)]
pub struct TrackingSleeper<S = TokioSleeper> {
    calls: Arc<Mutex<Vec<Duration>>>,
    inner: S,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::wrapping(TokioSleeper)
    }
}

impl Default for TrackingSleeper {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sleeper> TrackingSleeper<S> {
    pub fn wrapping(inner: S) -> Self {
        Self { calls: Arc::new(Mutex::new(Vec::new())), inner }
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<S: Sleeper> Sleeper for TrackingSleeper<S> {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(duration);
        self.inner.sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instant_sleeper_doesnt_sleep() {
        let start = std::time::Instant::now();
        InstantSleeper.sleep(Duration::from_secs(10)).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn tracking_sleeper_records_calls() {
        let sleeper = TrackingSleeper::wrapping(InstantSleeper);
        sleeper.sleep(Duration::from_millis(100)).await;
        sleeper.sleep(Duration::from_millis(200)).await;
        assert_eq!(sleeper.calls(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
        assert_eq!(sleeper.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_sleeps_on_the_runtime_clock() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
