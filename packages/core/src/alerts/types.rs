//! Alert records and the constructors classifiers use to build them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::codes::MetricCode;
use crate::engine::state::EraIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert ready to be handed to the delivery layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_code: String,
    pub metric: MetricCode,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub parent_id: String,
    pub origin_id: String,
}

/// Identifies the entity, metric and round a classification call is about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation<'a> {
    pub parent_id: &'a str,
    pub entity_id: &'a str,
    pub entity_name: &'a str,
    pub metric: MetricCode,
    pub timestamp: DateTime<Utc>,
}

/// Why a classifier decided to raise an alert.
#[derive(Debug, Clone, Copy)]
pub struct Trigger<'a> {
    pub observation: &'a Observation<'a>,
    pub severity: Severity,
    pub value: Option<f64>,
    /// Threshold that was crossed or recovered from.
    pub threshold: Option<f64>,
    /// Severity band the threshold belongs to; differs from `severity`
    /// on resolutions.
    pub threshold_severity: Option<Severity>,
    pub duration: Option<Duration>,
    pub era: Option<EraIndex>,
}

impl<'a> Trigger<'a> {
    pub fn new(observation: &'a Observation<'a>, severity: Severity) -> Self {
        Self {
            observation,
            severity,
            value: None,
            threshold: None,
            threshold_severity: None,
            duration: None,
            era: None,
        }
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn threshold(mut self, threshold: f64, band: Severity) -> Self {
        self.threshold = Some(threshold);
        self.threshold_severity = Some(band);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn era(mut self, era: EraIndex) -> Self {
        self.era = Some(era);
        self
    }
}

/// Builds an [`Alert`] from a [`Trigger`]. Implemented for closures so
/// callers can pass `|t: &Trigger<'_>| ...` directly.
pub trait AlertConstructor {
    fn construct(&self, trigger: &Trigger<'_>) -> Alert;
}

impl<F> AlertConstructor for F
where
    F: Fn(&Trigger<'_>) -> Alert,
{
    fn construct(&self, trigger: &Trigger<'_>) -> Alert {
        self(trigger)
    }
}

/// Default constructor: a fixed alert code plus a summary line, with the
/// trigger's details appended to the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertTemplate {
    code: String,
    summary: String,
}

impl AlertTemplate {
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
        }
    }

    pub fn problem(metric: MetricCode) -> Self {
        Self::new(metric.as_str(), format!("{} raised", label(metric)))
    }

    pub fn repeat(metric: MetricCode) -> Self {
        Self::new(
            format!("{}_still_active", metric.as_str()),
            format!("{} still active", label(metric)),
        )
    }

    pub fn resolved(metric: MetricCode) -> Self {
        Self::new(
            format!("{}_resolved", metric.as_str()),
            format!("{} resolved", label(metric)),
        )
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

fn label(metric: MetricCode) -> String {
    metric.as_str().replace('_', " ")
}

impl AlertConstructor for AlertTemplate {
    fn construct(&self, trigger: &Trigger<'_>) -> Alert {
        let obs = trigger.observation;
        let mut message = format!("{}: {}.", obs.entity_name, self.summary);
        if let Some(value) = trigger.value {
            message.push_str(&format!(" Current value: {}.", value));
        }
        if let (Some(threshold), Some(band)) = (trigger.threshold, trigger.threshold_severity) {
            message.push_str(&format!(" {} threshold: {}.", band, threshold));
        }
        if let Some(duration) = trigger.duration {
            message.push_str(&format!(" Duration: {}s.", duration.num_seconds()));
        }
        if let Some(era) = trigger.era {
            message.push_str(&format!(" Era: {}.", era));
        }

        Alert {
            alert_code: self.code.clone(),
            metric: obs.metric,
            message,
            severity: trigger.severity,
            timestamp: obs.timestamp,
            parent_id: obs.parent_id.to_string(),
            origin_id: obs.entity_id.to_string(),
        }
    }
}
