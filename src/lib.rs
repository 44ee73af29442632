#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # headroom
//!
//! Admission gate for remote APIs that report their own quota consumption in
//! response headers instead of rejecting you with a token-bucket verdict.
//!
//! ## How it fits together
//!
//! - [`DecayingCache`]: last reported usage per [`ResourceKey`]. Values erode
//!   over time so usage you stopped generating is eventually forgotten, unless
//!   the server gave a reset time, in which case the value is frozen until then.
//! - [`UsageStrategy`]: threshold check across a batch of keys plus an optional
//!   per-admission increment, applied atomically.
//! - [`UsageGate`]: shares a strategy between many tasks. `acquire` parks until
//!   every key is below threshold; `report_and_wake` ingests a [`UsageReport`]
//!   and lets the waiters re-check.
//!
//! ## Quick Start
//!
//! ```rust
//! use headroom::{presets, ResourceKey, UsageGate, UsageReport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gate = UsageGate::new(presets::graph_api())?;
//!     let keys = [ResourceKey::usage("act_42", "ads_management"), ResourceKey::app_usage()];
//!
//!     gate.acquire(&keys).await;
//!     // issue the remote call here, then:
//!     let report = UsageReport::from_headers([("x-app-usage", r#"{"call_count": 12}"#)]);
//!     gate.report_and_wake(&report)?;
//!     Ok(())
//! }
//! ```
//!
//! This is a single-process limiter. It does not coordinate across processes
//! and makes no fairness promises among waiters.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod key;
pub mod middleware;
pub mod prelude;
pub mod report;
pub mod sleeper;
pub mod strategy;
pub mod tunable;

// Re-exports
pub use cache::{CacheEntry, DecayConfig, DecayingCache};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{presets, GateConfig, GateConfigBuilder};
pub use error::{ConfigError, GateError, ReportError};
pub use gate::UsageGate;
pub use key::{ResourceKey, UsageCategory};
pub use middleware::{ReportsUsage, UsageGateLayer, UsageGateService};
pub use report::{FreezePolicy, UsageReport, UsageUpdate};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use strategy::UsageStrategy;
pub use tunable::Tunable;
