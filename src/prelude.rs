//! Convenient re-exports for common headroom types.
pub use crate::{
    cache::{DecayConfig, DecayingCache},
    config::{presets, GateConfig},
    error::{ConfigError, GateError, ReportError},
    gate::UsageGate,
    key::{ResourceKey, UsageCategory},
    middleware::{ReportsUsage, UsageGateLayer},
    report::{FreezePolicy, UsageReport},
};
