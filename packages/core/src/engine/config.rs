//! Typed alert configuration.
//!
//! Alert rules arrive as string-keyed records (`"warning_threshold": "10"`).
//! They are parsed exactly once into one typed config per classifier
//! family; classifiers never look at strings. Anything missing or
//! unparseable disables the affected severity instead of failing.

use std::collections::{BTreeMap, HashMap};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::codes::{ClassifierKind, MetricCode};

/// String-keyed rule record as it appears in configuration files.
///
/// Scalar JSON values are accepted and stringified so `"10"` and `10`
/// both work.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, serde_json::Value>")]
pub struct RawMetricConfig {
    entries: BTreeMap<String, String>,
}

impl RawMetricConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).map(parse_bool).unwrap_or(false)
    }

    fn number(&self, key: &str) -> Option<f64> {
        let raw = self.get(key)?;
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                warn!("Ignoring unparseable value {:?} for {}", raw, key);
                None
            }
        }
    }

    /// Number under `key`, only when the `gate` flag is on.
    fn gated_number(&self, gate: &str, key: &str) -> Option<f64> {
        if self.flag(gate) {
            self.number(key)
        } else {
            None
        }
    }
}

impl From<BTreeMap<String, serde_json::Value>> for RawMetricConfig {
    fn from(values: BTreeMap<String, serde_json::Value>) -> Self {
        let entries = values
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect();
        Self { entries }
    }
}

/// `true`, `yes`, `y` and `1` (any case) are true; everything else is false.
pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1"
    )
}

fn seconds(value: f64) -> Duration {
    Duration::milliseconds((value.max(0.0) * 1000.0).round() as i64)
}

/// Config for threshold, reverse-threshold and era-scoped classifiers.
///
/// A `None` threshold means that severity is disabled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThresholdConfig {
    pub enabled: bool,
    pub warning: Option<f64>,
    pub critical: Option<f64>,
    /// Breach depth between repeated critical alerts.
    pub critical_repeat: Option<f64>,
}

impl ThresholdConfig {
    pub fn from_raw(raw: &RawMetricConfig) -> Self {
        Self {
            enabled: raw.flag("enabled"),
            warning: raw.gated_number("warning_enabled", "warning_threshold"),
            critical: raw.gated_number("critical_enabled", "critical_threshold"),
            critical_repeat: raw
                .gated_number("critical_repeat_enabled", "critical_repeat")
                .filter(|step| *step > 0.0),
        }
    }
}

/// Config for no-change and downtime classifiers. Thresholds are durations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeWindowConfig {
    pub enabled: bool,
    pub warning: Option<Duration>,
    pub critical: Option<Duration>,
    pub critical_repeat: Option<Duration>,
}

impl TimeWindowConfig {
    pub fn from_raw(raw: &RawMetricConfig) -> Self {
        Self {
            enabled: raw.flag("enabled"),
            warning: raw
                .gated_number("warning_enabled", "warning_threshold")
                .map(seconds),
            critical: raw
                .gated_number("critical_enabled", "critical_threshold")
                .map(seconds),
            critical_repeat: raw
                .gated_number("critical_repeat_enabled", "critical_repeat")
                .map(seconds)
                .filter(|interval| *interval > Duration::zero()),
        }
    }
}

/// "At least `threshold` occurrences within `window`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowedThreshold {
    pub threshold: u64,
    pub window: Duration,
}

/// Config for the occurrence-window threshold classifier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OccurrenceConfig {
    pub enabled: bool,
    pub warning: Option<WindowedThreshold>,
    pub critical: Option<WindowedThreshold>,
    pub critical_repeat: Option<u64>,
}

impl OccurrenceConfig {
    pub fn from_raw(raw: &RawMetricConfig) -> Self {
        let level = |gate: &str, threshold: &str, window: &str| {
            let threshold = raw.gated_number(gate, threshold)?;
            let window = raw.number(window)?;
            Some(WindowedThreshold {
                threshold: threshold.max(0.0).ceil() as u64,
                window: seconds(window),
            })
        };
        Self {
            enabled: raw.flag("enabled"),
            warning: level("warning_enabled", "warning_threshold", "warning_time_window"),
            critical: level(
                "critical_enabled",
                "critical_threshold",
                "critical_time_window",
            ),
            critical_repeat: raw
                .gated_number("critical_repeat_enabled", "critical_repeat")
                .filter(|step| *step >= 1.0)
                .map(|step| step.floor() as u64),
        }
    }
}

/// Config for conditional and error classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagConfig {
    pub enabled: bool,
}

impl FlagConfig {
    pub fn from_raw(raw: &RawMetricConfig) -> Self {
        Self {
            enabled: raw.flag("enabled"),
        }
    }
}

/// A parsed rule for one metric. The variant follows the metric's classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricRule {
    Threshold(ThresholdConfig),
    TimeWindow(TimeWindowConfig),
    Occurrence(OccurrenceConfig),
    Flag(FlagConfig),
}

impl MetricRule {
    pub fn parse(metric: MetricCode, raw: &RawMetricConfig) -> Self {
        match metric.classifier() {
            ClassifierKind::Threshold
            | ClassifierKind::ReverseThreshold
            | ClassifierKind::EraThreshold => Self::Threshold(ThresholdConfig::from_raw(raw)),
            ClassifierKind::NoChange | ClassifierKind::Downtime => {
                Self::TimeWindow(TimeWindowConfig::from_raw(raw))
            }
            ClassifierKind::OccurrenceThreshold => {
                Self::Occurrence(OccurrenceConfig::from_raw(raw))
            }
            ClassifierKind::Conditional
            | ClassifierKind::SolvableConditional
            | ClassifierKind::Error => Self::Flag(FlagConfig::from_raw(raw)),
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Self::Threshold(c) => c.enabled,
            Self::TimeWindow(c) => c.enabled,
            Self::Occurrence(c) => c.enabled,
            Self::Flag(c) => c.enabled,
        }
    }
}

/// What kind of monitorable an entity is. Selects the threshold profile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Node,
    Validator,
    Contract,
    Chain,
    System,
}

/// Per-metric rules that apply to one kind of entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdProfile {
    rules: HashMap<MetricCode, MetricRule>,
}

impl ThresholdProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, metric: MetricCode, rule: MetricRule) -> Self {
        self.rules.insert(metric, rule);
        self
    }

    /// Parse a profile from raw records keyed by metric name. Unknown
    /// metric names are skipped.
    pub fn from_raw(raw: &BTreeMap<String, RawMetricConfig>) -> Self {
        let rules = raw
            .iter()
            .filter_map(|(name, config)| match name.parse::<MetricCode>() {
                Ok(metric) => Some((metric, MetricRule::parse(metric, config))),
                Err(err) => {
                    warn!("Skipping alert rule: {}", err);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn rule(&self, metric: MetricCode) -> Option<&MetricRule> {
        self.rules.get(&metric)
    }

    pub fn rules(&self) -> impl Iterator<Item = (&MetricCode, &MetricRule)> {
        self.rules.iter()
    }

    /// Whether entities using this profile need era sub-state.
    pub fn tracks_eras(&self) -> bool {
        self.rules
            .keys()
            .any(|m| m.classifier() == ClassifierKind::EraThreshold)
    }
}

/// Raw alerts configuration file: chain -> entity kind -> metric -> record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAlertsConfig {
    #[serde(default)]
    pub chains: BTreeMap<String, BTreeMap<EntityKind, BTreeMap<String, RawMetricConfig>>>,
}

/// Per-chain threshold profiles keyed by entity kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainProfiles {
    profiles: HashMap<EntityKind, ThresholdProfile>,
}

impl ChainProfiles {
    pub fn with_profile(mut self, kind: EntityKind, profile: ThresholdProfile) -> Self {
        self.profiles.insert(kind, profile);
        self
    }

    pub fn profile(&self, kind: EntityKind) -> Option<&ThresholdProfile> {
        self.profiles.get(&kind)
    }
}

/// Fully parsed alerts configuration for every monitored chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertsConfig {
    chains: HashMap<String, ChainProfiles>,
}

impl AlertsConfig {
    pub fn from_raw(raw: &RawAlertsConfig) -> Self {
        let chains = raw
            .chains
            .iter()
            .map(|(parent_id, kinds)| {
                let profiles = kinds
                    .iter()
                    .map(|(kind, metrics)| (*kind, ThresholdProfile::from_raw(metrics)))
                    .collect();
                (parent_id.clone(), ChainProfiles { profiles })
            })
            .collect();
        Self { chains }
    }

    pub fn with_chain(mut self, parent_id: impl Into<String>, profiles: ChainProfiles) -> Self {
        self.chains.insert(parent_id.into(), profiles);
        self
    }

    pub fn chain(&self, parent_id: &str) -> Option<&ChainProfiles> {
        self.chains.get(parent_id)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &String> {
        self.chains.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::codes::{CosmosMetric, SubstrateMetric, SystemMetric};

    fn raw(pairs: &[(&str, &str)]) -> RawMetricConfig {
        pairs
            .iter()
            .fold(RawMetricConfig::default(), |acc, (k, v)| acc.with(k, v))
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for yes in ["true", "True", "YES", "y", "1", " true "] {
            assert!(parse_bool(yes), "{yes}");
        }
        for no in ["false", "no", "0", "", "maybe"] {
            assert!(!parse_bool(no), "{no}");
        }
    }

    #[test]
    fn threshold_config_parses_all_keys() {
        let config = ThresholdConfig::from_raw(&raw(&[
            ("enabled", "true"),
            ("warning_enabled", "true"),
            ("warning_threshold", "10"),
            ("critical_enabled", "true"),
            ("critical_threshold", "20"),
            ("critical_repeat_enabled", "true"),
            ("critical_repeat", "5"),
        ]));
        assert_eq!(
            config,
            ThresholdConfig {
                enabled: true,
                warning: Some(10.0),
                critical: Some(20.0),
                critical_repeat: Some(5.0),
            }
        );
    }

    #[test]
    fn unparseable_threshold_disables_that_severity_only() {
        let config = ThresholdConfig::from_raw(&raw(&[
            ("enabled", "true"),
            ("warning_enabled", "true"),
            ("warning_threshold", "ten"),
            ("critical_enabled", "true"),
            ("critical_threshold", "20"),
        ]));
        assert_eq!(config.warning, None);
        assert_eq!(config.critical, Some(20.0));
        assert_eq!(config.critical_repeat, None);
    }

    #[test]
    fn missing_keys_default_to_disabled() {
        let config = ThresholdConfig::from_raw(&RawMetricConfig::default());
        assert_eq!(config, ThresholdConfig::default());
        assert!(!config.enabled);
    }

    #[test]
    fn time_window_thresholds_are_seconds() {
        let config = TimeWindowConfig::from_raw(&raw(&[
            ("enabled", "true"),
            ("warning_enabled", "true"),
            ("warning_threshold", "3"),
            ("critical_enabled", "true"),
            ("critical_threshold", "7.5"),
            ("critical_repeat_enabled", "true"),
            ("critical_repeat", "-1"),
        ]));
        assert_eq!(config.warning, Some(Duration::seconds(3)));
        assert_eq!(config.critical, Some(Duration::milliseconds(7500)));
        assert_eq!(config.critical_repeat, None);
    }

    #[test]
    fn repeat_rounding_to_zero_is_disabled() {
        let config = TimeWindowConfig::from_raw(&raw(&[
            ("enabled", "true"),
            ("critical_enabled", "true"),
            ("critical_threshold", "10"),
            ("critical_repeat_enabled", "true"),
            ("critical_repeat", "0.0004"),
        ]));
        assert_eq!(config.critical, Some(Duration::seconds(10)));
        assert_eq!(config.critical_repeat, None);
    }

    #[test]
    fn occurrence_config_needs_a_window() {
        let config = OccurrenceConfig::from_raw(&raw(&[
            ("enabled", "true"),
            ("warning_enabled", "true"),
            ("warning_threshold", "5"),
            ("critical_enabled", "true"),
            ("critical_threshold", "10"),
            ("critical_time_window", "60"),
        ]));
        assert_eq!(config.warning, None);
        assert_eq!(
            config.critical,
            Some(WindowedThreshold {
                threshold: 10,
                window: Duration::seconds(60),
            })
        );
    }

    #[test]
    fn raw_config_accepts_json_scalars() {
        let parsed: RawMetricConfig = serde_json::from_str(
            r#"{"enabled": true, "warning_enabled": "yes", "warning_threshold": 12.5, "note": null}"#,
        )
        .unwrap();
        assert_eq!(parsed.get("enabled"), Some("true"));
        assert_eq!(parsed.get("warning_threshold"), Some("12.5"));
        assert_eq!(parsed.get("note"), None);
    }

    #[test]
    fn rule_variant_follows_classifier() {
        let enabled = raw(&[("enabled", "true")]);
        assert!(matches!(
            MetricRule::parse(MetricCode::System(SystemMetric::CpuUsage), &enabled),
            MetricRule::Threshold(_)
        ));
        assert!(matches!(
            MetricRule::parse(MetricCode::Cosmos(CosmosMetric::NodeIsDown), &enabled),
            MetricRule::TimeWindow(_)
        ));
        assert!(matches!(
            MetricRule::parse(MetricCode::Cosmos(CosmosMetric::MissedBlocks), &enabled),
            MetricRule::Occurrence(_)
        ));
        assert!(matches!(
            MetricRule::parse(MetricCode::Cosmos(CosmosMetric::ValidatorIsJailed), &enabled),
            MetricRule::Flag(FlagConfig { enabled: true })
        ));
    }

    #[test]
    fn alerts_config_loads_from_json_and_skips_unknown_metrics() {
        let raw: RawAlertsConfig = serde_json::from_str(
            r#"{
                "chains": {
                    "polkadot": {
                        "validator": {
                            "substrate_payout_not_claimed": {"enabled": "true"},
                            "substrate_unknown_metric": {"enabled": "true"}
                        },
                        "node": {}
                    }
                }
            }"#,
        )
        .unwrap();
        let config = AlertsConfig::from_raw(&raw);
        let chain = config.chain("polkadot").unwrap();
        let validator = chain.profile(EntityKind::Validator).unwrap();
        assert!(validator
            .rule(MetricCode::Substrate(SubstrateMetric::PayoutNotClaimed))
            .is_some());
        assert_eq!(validator.rules().count(), 1);
        assert!(validator.tracks_eras());
        assert!(!chain.profile(EntityKind::Node).unwrap().tracks_eras());
        assert!(config.chain("kusama").is_none());
    }
}
