//! Server-reported usage snapshots and how they map onto cache writes.
//!
//! A report is a bag of independently optional sections, normally lifted
//! straight from response headers:
//!
//! | Section | Shape | Key written |
//! |---|---|---|
//! | `business-use-case-usage` | `{entity: [{type, ..metrics}]}` | `(entity, type)`, max metric |
//! | `ad-account-usage` | `{acc_id_util_pct}` | `ad-account-usage` |
//! | `app-usage` | `{metric: number, ..}` | `app-usage`, max metric |
//! | `fb-ads-insights-throttle` | `{metric: number, ..}` | `fb-ads-insights-throttle`, max metric |
//!
//! Business entries carry `call_count`, `total_cputime`, `total_time` and
//! `estimated_time_to_regain_access` (the eta, in minutes); a non-zero eta
//! freezes the written value per [`FreezePolicy`].
//!
//! Header names are matched case-insensitively, with or without the `x-` prefix.
//! Sections are parsed lazily so one broken header never hides the others.

use crate::error::ReportError;
use crate::key::{ResourceKey, AD_ACCOUNT_USAGE, ADS_INSIGHTS_THROTTLE, APP_USAGE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Section carrying per-entity, per-category usage.
pub const BUSINESS_USE_CASE_USAGE: &str = "business-use-case-usage";

const REGAIN_ACCESS_FIELD: &str = "estimated_time_to_regain_access";
const TYPE_FIELD: &str = "type";
const ACCOUNT_PCT_FIELD: &str = "acc_id_util_pct";

/// How "estimated time to regain access" (minutes) becomes a freeze duration.
///
/// A gate applies exactly one policy. A reported `0` never freezes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezePolicy {
    /// Freeze for `minutes + 1`, covering the partially elapsed minute the server rounds away.
    #[default]
    MinutesPlusOne,
    /// Freeze for exactly the reported minutes.
    Minutes,
}

impl FreezePolicy {
    /// Freeze duration for a reported regain-access estimate.
    pub fn freeze_for(&self, minutes: f64) -> Duration {
        if minutes <= 0.0 {
            return Duration::ZERO;
        }
        let minutes = match self {
            FreezePolicy::MinutesPlusOne => minutes + 1.0,
            FreezePolicy::Minutes => minutes,
        };
        Duration::try_from_secs_f64(minutes * 60.0).unwrap_or(Duration::MAX)
    }
}

/// One cache write derived from a report.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageUpdate {
    pub key: ResourceKey,
    pub value: f64,
    /// `Duration::ZERO` means an ordinary decaying write.
    pub freeze: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    BusinessUseCase,
    AdAccount,
    App,
    AdsInsightsThrottle,
}

impl SectionKind {
    fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let name = name.strip_prefix("x-").unwrap_or(&name);
        match name {
            BUSINESS_USE_CASE_USAGE => Some(SectionKind::BusinessUseCase),
            AD_ACCOUNT_USAGE => Some(SectionKind::AdAccount),
            APP_USAGE => Some(SectionKind::App),
            ADS_INSIGHTS_THROTTLE => Some(SectionKind::AdsInsightsThrottle),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SectionKind::BusinessUseCase => BUSINESS_USE_CASE_USAGE,
            SectionKind::AdAccount => AD_ACCOUNT_USAGE,
            SectionKind::App => APP_USAGE,
            SectionKind::AdsInsightsThrottle => ADS_INSIGHTS_THROTTLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Body {
    Raw(String),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq)]
struct Section {
    kind: SectionKind,
    body: Body,
}

/// A usage snapshot as received from the remote API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageReport {
    sections: Vec<Section>,
}

impl UsageReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect recognized headers; values are raw JSON text. Unknown headers are ignored.
    pub fn from_headers<I, N, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<String>,
    {
        headers
            .into_iter()
            .fold(Self::new(), |report, (name, value)| report.with_header(name, value))
    }

    /// Build from an already-decoded mapping of section name to section body.
    ///
    /// Bodies may be JSON objects or strings holding JSON text.
    pub fn from_json(value: Value) -> Result<Self, ReportError> {
        let Value::Object(map) = value else {
            return Err(ReportError::malformed("report", "expected an object of sections"));
        };
        let mut report = Self::new();
        for (name, body) in map {
            let Some(kind) = SectionKind::from_name(&name) else { continue };
            let body = match body {
                Value::String(raw) => Body::Raw(raw),
                other => Body::Json(other),
            };
            report.sections.push(Section { kind, body });
        }
        Ok(report)
    }

    /// Add one header. Later duplicates are kept and applied after earlier ones.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        if let Some(kind) = SectionKind::from_name(name.as_ref()) {
            self.sections.push(Section { kind, body: Body::Raw(value.into()) });
        }
        self
    }

    /// Number of recognized sections.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Translate every section into cache writes.
    ///
    /// Broken sections or entries are reported in the second vector; everything
    /// else still produces updates.
    pub fn updates(&self, policy: FreezePolicy) -> (Vec<UsageUpdate>, Vec<ReportError>) {
        let mut updates = Vec::new();
        let mut errors = Vec::new();
        for section in &self.sections {
            let section_name = section.kind.name();
            let parsed;
            let body = match &section.body {
                Body::Json(v) => v,
                Body::Raw(raw) => match serde_json::from_str::<Value>(raw) {
                    Ok(v) => {
                        parsed = v;
                        &parsed
                    }
                    Err(e) => {
                        errors.push(ReportError::malformed(section_name, e));
                        continue;
                    }
                },
            };
            let Value::Object(map) = body else {
                errors.push(ReportError::malformed(section_name, "expected a JSON object"));
                continue;
            };
            match section.kind {
                SectionKind::BusinessUseCase => {
                    business_use_case(map, policy, &mut updates, &mut errors)
                }
                SectionKind::AdAccount => match map.get(ACCOUNT_PCT_FIELD).and_then(Value::as_f64) {
                    Some(value) => updates.push(UsageUpdate {
                        key: ResourceKey::ad_account_usage(),
                        value,
                        freeze: Duration::ZERO,
                    }),
                    None => errors.push(ReportError::malformed(
                        section_name,
                        format!("missing numeric `{ACCOUNT_PCT_FIELD}`"),
                    )),
                },
                SectionKind::App | SectionKind::AdsInsightsThrottle => {
                    match max_metric(map.values()) {
                        Some(value) => updates.push(UsageUpdate {
                            key: ResourceKey::gauge(section_name),
                            value,
                            freeze: Duration::ZERO,
                        }),
                        None => errors.push(ReportError::malformed(
                            section_name,
                            "no numeric metrics reported",
                        )),
                    }
                }
            }
        }
        (updates, errors)
    }
}

/// Binding constraint: the metric closest to its limit. Non-numeric fields are skipped.
fn max_metric<'a>(values: impl Iterator<Item = &'a Value>) -> Option<f64> {
    values.filter_map(Value::as_f64).filter(|v| v.is_finite()).reduce(f64::max)
}

fn business_use_case(
    map: &Map<String, Value>,
    policy: FreezePolicy,
    updates: &mut Vec<UsageUpdate>,
    errors: &mut Vec<ReportError>,
) {
    let section = BUSINESS_USE_CASE_USAGE;
    for (entity, usages) in map {
        let Value::Array(usages) = usages else {
            errors.push(ReportError::invalid_entry(section, entity, "expected a list of usages"));
            continue;
        };
        for usage in usages {
            let Value::Object(fields) = usage else {
                errors.push(ReportError::invalid_entry(section, entity, "usage is not an object"));
                continue;
            };
            let Some(category) = fields.get(TYPE_FIELD).and_then(Value::as_str) else {
                errors.push(ReportError::invalid_entry(section, entity, "missing string `type`"));
                continue;
            };
            let regain_minutes = match fields.get(REGAIN_ACCESS_FIELD) {
                None | Some(Value::Null) => 0.0,
                Some(v) => match v.as_f64() {
                    Some(m) if m.is_finite() && m >= 0.0 => m,
                    _ => {
                        errors.push(ReportError::invalid_entry(
                            section,
                            entity,
                            format!("`{REGAIN_ACCESS_FIELD}` must be a non-negative number"),
                        ));
                        continue;
                    }
                },
            };
            let metrics = fields
                .iter()
                .filter(|(name, _)| {
                    name.as_str() != TYPE_FIELD && name.as_str() != REGAIN_ACCESS_FIELD
                })
                .map(|(_, v)| v);
            let Some(value) = max_metric(metrics) else {
                errors.push(ReportError::invalid_entry(
                    section,
                    entity,
                    "no numeric metrics reported",
                ));
                continue;
            };
            updates.push(UsageUpdate {
                key: ResourceKey::usage(entity.as_str(), category),
                value,
                freeze: policy.freeze_for(regain_minutes),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn buc(
        entity: &str,
        category: &str,
        call_count: f64,
        cputime: f64,
        total_time: f64,
        eta: u64,
    ) -> String {
        json!({
            entity: [{
                "type": category,
                "call_count": call_count,
                "total_cputime": cputime,
                "total_time": total_time,
                "estimated_time_to_regain_access": eta,
            }]
        })
        .to_string()
    }

    #[test]
    fn freeze_policies() {
        assert_eq!(FreezePolicy::MinutesPlusOne.freeze_for(0.0), Duration::ZERO);
        assert_eq!(FreezePolicy::Minutes.freeze_for(0.0), Duration::ZERO);
        assert_eq!(FreezePolicy::MinutesPlusOne.freeze_for(4.0), Duration::from_secs(300));
        assert_eq!(FreezePolicy::Minutes.freeze_for(4.0), Duration::from_secs(240));
    }

    #[test]
    fn header_names_are_normalized() {
        let report = UsageReport::from_headers([
            ("X-Business-Use-Case-Usage", "{}"),
            ("app-usage", "{}"),
            ("x-ad-account-usage", "{}"),
            ("content-type", "application/json"),
        ]);
        assert_eq!(report.len(), 3);
    }

    #[test]
    fn business_use_case_takes_max_metric() {
        let body = buc("acct1", "ads_insights", 12.0, 40.0, 7.0, 0);
        let report = UsageReport::new().with_header("x-business-use-case-usage", body);
        let (updates, errors) = report.updates(FreezePolicy::default());
        assert!(errors.is_empty());
        assert_eq!(
            updates,
            vec![UsageUpdate {
                key: ResourceKey::usage("acct1", "ads_insights"),
                value: 40.0,
                freeze: Duration::ZERO,
            }]
        );
    }

    #[test]
    fn regain_access_estimate_freezes() {
        let report = UsageReport::new()
            .with_header("x-business-use-case-usage", buc("acct1", "pages", 100.0, 5.0, 5.0, 9));
        let (updates, _) = report.updates(FreezePolicy::MinutesPlusOne);
        assert_eq!(updates[0].freeze, Duration::from_secs(600));
        let (updates, _) = report.updates(FreezePolicy::Minutes);
        assert_eq!(updates[0].freeze, Duration::from_secs(540));
    }

    #[test]
    fn scalar_gauges() {
        let report = UsageReport::from_headers([
            ("x-ad-account-usage", r#"{"acc_id_util_pct": 9.67}"#),
            ("x-app-usage", r#"{"call_count": 28, "total_time": 25, "total_cputime": 31}"#),
            (
                "x-fb-ads-insights-throttle",
                r#"{"app_id_util_pct": 4, "acc_id_util_pct": 17, "access_tier": "standard"}"#,
            ),
        ]);
        let (updates, errors) = report.updates(FreezePolicy::default());
        assert!(errors.is_empty(), "{errors:?}");
        let values: Vec<_> = updates.iter().map(|u| (u.key.to_string(), u.value)).collect();
        assert_eq!(
            values,
            vec![
                (AD_ACCOUNT_USAGE.to_string(), 9.67),
                (APP_USAGE.to_string(), 31.0),
                (ADS_INSIGHTS_THROTTLE.to_string(), 17.0),
            ]
        );
    }

    #[test]
    fn broken_section_does_not_hide_the_rest() {
        let report = UsageReport::from_headers([
            ("x-app-usage", "{not json"),
            ("x-ad-account-usage", r#"{"acc_id_util_pct": 50}"#),
        ]);
        let (updates, errors) = report.updates(FreezePolicy::default());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].key, ResourceKey::ad_account_usage());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].section(), APP_USAGE);
    }

    #[test]
    fn broken_entry_does_not_hide_siblings() {
        let body = json!({
            "good": [{
                "type": "ads_management",
                "call_count": 10,
                "estimated_time_to_regain_access": 0,
            }],
            "no_type": [{"call_count": 99}],
            "not_a_list": {"type": "pages"},
            "bad_eta": [{
                "type": "pages",
                "call_count": 1,
                "estimated_time_to_regain_access": "soon",
            }],
        });
        let report = UsageReport::from_json(json!({ BUSINESS_USE_CASE_USAGE: body })).unwrap();
        let (updates, errors) = report.updates(FreezePolicy::default());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].key, ResourceKey::usage("good", "ads_management"));
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| matches!(e, ReportError::InvalidEntry { .. })));
    }

    #[test]
    fn missing_account_pct_is_malformed() {
        let report = UsageReport::new().with_header("x-ad-account-usage", r#"{"other": 1}"#);
        let (updates, errors) = report.updates(FreezePolicy::default());
        assert!(updates.is_empty());
        assert!(matches!(
            &errors[0],
            ReportError::Malformed { section, .. } if section == AD_ACCOUNT_USAGE
        ));
    }

    #[test]
    fn from_json_accepts_strings_and_objects() {
        let report = UsageReport::from_json(json!({
            "x-app-usage": "{\"call_count\": 3}",
            "fb-ads-insights-throttle": {"app_id_util_pct": 8},
            "unrelated": 1,
        }))
        .unwrap();
        assert_eq!(report.len(), 2);
        let (updates, errors) = report.updates(FreezePolicy::default());
        assert!(errors.is_empty());
        assert_eq!(updates.len(), 2);
    }

    #[test]
    fn from_json_rejects_non_object() {
        assert!(UsageReport::from_json(json!([1, 2])).is_err());
    }
}
