//! Error types for the gate, its configuration and report ingestion.
use std::time::Duration;
use thiserror::Error;

/// Errors produced when validating gate configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Cache capacity must be > 0.
    #[error("capacity must be > 0 (got {provided})")]
    InvalidCapacity { provided: usize },
    /// Threshold must be a finite percentage in `0..=100`.
    #[error("threshold_percent must be within 0..=100 (got {provided})")]
    InvalidThreshold { provided: f64 },
    /// Decay rate must be finite and >= 0.
    #[error("decay_rate must be finite and >= 0 (got {provided})")]
    InvalidDecayRate { provided: f64 },
    /// Decay interval must be > 0.
    #[error("decay_interval must be > 0 (got {0:?})")]
    InvalidDecayInterval(Duration),
    /// Lower limit must be finite.
    #[error("lower_limit must be finite (got {provided})")]
    InvalidLowerLimit { provided: f64 },
    /// Increment must be finite and >= 0.
    #[error("increment_amount must be finite and >= 0 (got {provided})")]
    InvalidIncrement { provided: f64 },
    /// Re-check interval must be > 0.
    #[error("check_interval must be > 0 (got {0:?})")]
    InvalidCheckInterval(Duration),
}

/// A usage report (or part of one) could not be applied.
///
/// Parts of the same report that parsed cleanly are still applied; the error
/// only describes what was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// A whole report section failed to parse or had the wrong shape.
    #[error("malformed `{section}` report: {reason}")]
    Malformed { section: String, reason: String },
    /// A single entry inside an otherwise well-formed section was invalid.
    #[error("invalid `{section}` entry for `{entity}`: {reason}")]
    InvalidEntry { section: String, entity: String, reason: String },
}

impl ReportError {
    pub(crate) fn malformed(section: &str, reason: impl ToString) -> Self {
        ReportError::Malformed { section: section.to_string(), reason: reason.to_string() }
    }

    pub(crate) fn invalid_entry(section: &str, entity: &str, reason: impl ToString) -> Self {
        ReportError::InvalidEntry {
            section: section.to_string(),
            entity: entity.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Section of the report the error came from.
    pub fn section(&self) -> &str {
        match self {
            ReportError::Malformed { section, .. } | ReportError::InvalidEntry { section, .. } => {
                section
            }
        }
    }
}

/// Errors surfaced by [`UsageGate`](crate::UsageGate) operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GateError {
    /// `acquire_timeout` gave up before the keys were admitted.
    #[error("admission not granted within {waited:?}")]
    Timeout { waited: Duration },
    /// `report_and_wake` could not apply part of the report.
    #[error(transparent)]
    Report(#[from] ReportError),
}

impl GateError {
    /// Check if this error is due to timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Borrow the report error if present.
    pub fn as_report(&self) -> Option<&ReportError> {
        match self {
            Self::Report(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_mentions_duration() {
        let err = GateError::Timeout { waited: Duration::from_millis(1500) };
        let msg = err.to_string();
        assert!(msg.contains("1.5"));
        assert!(err.is_timeout());
        assert!(err.as_report().is_none());
    }

    #[test]
    fn report_error_is_transparent() {
        let inner = ReportError::malformed("app-usage", "expected an object");
        let err = GateError::from(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
        assert_eq!(err.as_report().map(ReportError::section), Some("app-usage"));
    }

    #[test]
    fn invalid_entry_names_the_entity() {
        let err = ReportError::invalid_entry("business-use-case-usage", "123", "missing `type`");
        let msg = err.to_string();
        assert!(msg.contains("123"));
        assert!(msg.contains("missing `type`"));
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidThreshold { provided: 120.0 };
        assert!(err.to_string().contains("120"));
        let err = ConfigError::InvalidDecayInterval(Duration::ZERO);
        assert!(err.to_string().contains("0ns"));
    }
}
