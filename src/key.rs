//! Resource keys: what the gate throttles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Gauge fed by the `ad-account-usage` report.
pub const AD_ACCOUNT_USAGE: &str = "ad-account-usage";
/// Gauge fed by the `app-usage` report.
pub const APP_USAGE: &str = "app-usage";
/// Gauge fed by the `fb-ads-insights-throttle` report.
pub const ADS_INSIGHTS_THROTTLE: &str = "fb-ads-insights-throttle";

/// Business-use-case call category.
///
/// The remote API reports usage per `(entity, category)`. The well-known
/// categories get their own variant; anything else round-trips through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UsageCategory {
    AdsInsights,
    AdsManagement,
    CustomAudience,
    Instagram,
    Leadgen,
    Messenger,
    Pages,
    Other(String),
}

impl UsageCategory {
    pub fn as_str(&self) -> &str {
        match self {
            UsageCategory::AdsInsights => "ads_insights",
            UsageCategory::AdsManagement => "ads_management",
            UsageCategory::CustomAudience => "custom_audience",
            UsageCategory::Instagram => "instagram",
            UsageCategory::Leadgen => "leadgen",
            UsageCategory::Messenger => "messenger",
            UsageCategory::Pages => "pages",
            UsageCategory::Other(s) => s,
        }
    }
}

impl From<&str> for UsageCategory {
    fn from(s: &str) -> Self {
        match s {
            "ads_insights" => UsageCategory::AdsInsights,
            "ads_management" => UsageCategory::AdsManagement,
            "custom_audience" => UsageCategory::CustomAudience,
            "instagram" => UsageCategory::Instagram,
            "leadgen" => UsageCategory::Leadgen,
            "messenger" => UsageCategory::Messenger,
            "pages" => UsageCategory::Pages,
            other => UsageCategory::Other(other.to_string()),
        }
    }
}

impl From<String> for UsageCategory {
    fn from(s: String) -> Self {
        match UsageCategory::from(s.as_str()) {
            UsageCategory::Other(_) => UsageCategory::Other(s),
            known => known,
        }
    }
}

impl From<UsageCategory> for String {
    fn from(c: UsageCategory) -> Self {
        match c {
            UsageCategory::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One throttled quota dimension.
///
/// Keys are opaque to the gate; only equality and hashing matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKey {
    /// Per-entity, per-category usage (business use case).
    Usage {
        /// Business or account id the usage is billed against.
        entity_id: String,
        /// Call category.
        category: UsageCategory,
    },
    /// Scalar gauge such as overall app usage.
    Gauge(String),
}

impl ResourceKey {
    pub fn usage(entity_id: impl Into<String>, category: impl Into<UsageCategory>) -> Self {
        ResourceKey::Usage { entity_id: entity_id.into(), category: category.into() }
    }

    pub fn gauge(name: impl Into<String>) -> Self {
        ResourceKey::Gauge(name.into())
    }

    pub fn ad_account_usage() -> Self {
        Self::gauge(AD_ACCOUNT_USAGE)
    }

    pub fn app_usage() -> Self {
        Self::gauge(APP_USAGE)
    }

    pub fn ads_insights_throttle() -> Self {
        Self::gauge(ADS_INSIGHTS_THROTTLE)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Usage { entity_id, category } => write!(f, "{}:{}", entity_id, category),
            ResourceKey::Gauge(name) => f.write_str(name),
        }
    }
}

impl<E, C> From<(E, C)> for ResourceKey
where
    E: Into<String>,
    C: Into<UsageCategory>,
{
    fn from((entity, category): (E, C)) -> Self {
        ResourceKey::usage(entity, category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_categories_round_trip() {
        for name in [
            "ads_insights",
            "ads_management",
            "custom_audience",
            "instagram",
            "leadgen",
            "messenger",
            "pages",
        ] {
            let cat = UsageCategory::from(name);
            assert!(!matches!(cat, UsageCategory::Other(_)), "{name} should be known");
            assert_eq!(cat.as_str(), name);
        }
    }

    #[test]
    fn unknown_category_is_preserved() {
        let cat = UsageCategory::from("whatsapp".to_string());
        assert_eq!(cat, UsageCategory::Other("whatsapp".into()));
        assert_eq!(String::from(cat), "whatsapp");
    }

    #[test]
    fn tuple_and_constructor_keys_are_equal() {
        let a: ResourceKey = ("acct1", "ads_insights").into();
        let b = ResourceKey::usage("acct1", UsageCategory::AdsInsights);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "acct1:ads_insights");
    }

    #[test]
    fn gauge_keys_are_distinct_from_usage_keys() {
        assert_ne!(ResourceKey::app_usage(), ResourceKey::usage("app-usage", "pages"));
        assert_eq!(ResourceKey::app_usage().to_string(), APP_USAGE);
    }
}
