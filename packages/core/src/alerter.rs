//! Alerter driver.
//!
//! Turns one [`MetricRound`] into classification calls: looks up the
//! chain's threshold profile for the entity kind, creates the entity's
//! alerting state on first sight, and dispatches the sample to the
//! classifier its metric code names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alerts::{Alert, AlertTemplate, Observation, Severity};
use crate::engine::codes::{ClassifierKind, CosmosMetric, ErrorCode, MetricCode, SubstrateMetric};
use crate::engine::{
    classify_conditional, AlertingState, AlertsConfig, EntityKind, EraIndex, MetricRule,
    ThresholdProfile,
};
use crate::error::AppError;

/// One metric of one entity for one monitoring round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRound {
    pub parent_id: String,
    pub entity_id: String,
    pub entity_name: String,
    #[serde(default)]
    pub kind: EntityKind,
    /// For `error` samples this names the chain family; every error
    /// metric of that family is evaluated.
    pub metric: MetricCode,
    pub timestamp: DateTime<Utc>,
    pub sample: Sample,
}

/// Metric payload, shaped by the classifier that consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sample {
    Pair {
        current: f64,
        #[serde(default)]
        previous: Option<f64>,
        /// Extra guard for no-change metrics; defaults to true.
        #[serde(default)]
        condition: Option<bool>,
    },
    Downtime {
        #[serde(default)]
        went_down_at: Option<DateTime<Utc>>,
    },
    Error {
        #[serde(default)]
        code: Option<ErrorCode>,
    },
    Flag {
        active: bool,
    },
    Era {
        era: EraIndex,
        value: f64,
        #[serde(default)]
        settled: bool,
    },
}

impl Sample {
    pub fn name(&self) -> &'static str {
        match self {
            Sample::Pair { .. } => "pair",
            Sample::Downtime { .. } => "downtime",
            Sample::Error { .. } => "error",
            Sample::Flag { .. } => "flag",
            Sample::Era { .. } => "era",
        }
    }
}

/// Severity of the problem alert for single-level (conditional) metrics.
fn conditional_severity(metric: MetricCode) -> Severity {
    match metric {
        MetricCode::Cosmos(CosmosMetric::ValidatorIsJailed)
        | MetricCode::Cosmos(CosmosMetric::ValidatorWasSlashed)
        | MetricCode::Substrate(SubstrateMetric::NoHeartbeatAndBlockAuthored) => {
            Severity::Critical
        }
        MetricCode::Substrate(SubstrateMetric::ValidatorNotActive) => Severity::Warning,
        _ => Severity::Info,
    }
}

/// Owns the alerting state of one alerter process and the configuration
/// it was built from.
#[derive(Debug, Default)]
pub struct Alerter {
    config: AlertsConfig,
    state: AlertingState,
}

impl Alerter {
    pub fn new(config: AlertsConfig) -> Self {
        Self {
            config,
            state: AlertingState::new(),
        }
    }

    pub fn state(&self) -> &AlertingState {
        &self.state
    }

    pub fn config(&self) -> &AlertsConfig {
        &self.config
    }

    /// Classify one round and return the alerts it produced.
    pub fn process(&mut self, round: &MetricRound) -> Result<Vec<Alert>, AppError> {
        let mut alerts = Vec::new();
        let Some(chain) = self.config.chain(&round.parent_id) else {
            debug!(parent_id = %round.parent_id, "No alert configuration for chain, skipping");
            return Ok(alerts);
        };
        let Some(profile) = chain.profile(round.kind) else {
            debug!(
                parent_id = %round.parent_id,
                kind = ?round.kind,
                "No threshold profile for entity kind, skipping"
            );
            return Ok(alerts);
        };

        self.state
            .create_state(&round.parent_id, &round.entity_id, round.kind, profile);
        dispatch(&mut self.state, profile, round, &mut alerts)?;
        Ok(alerts)
    }

    /// Swap in a new configuration. State of every chain whose
    /// configuration changed or disappeared is dropped and rebuilt on next
    /// sight. Returns the number of chains reset.
    pub fn reload(&mut self, config: AlertsConfig) -> usize {
        let stale: Vec<String> = self
            .state
            .chain_ids()
            .filter(|id| self.config.chain(id) != config.chain(id))
            .cloned()
            .collect();
        for parent_id in &stale {
            self.state.remove_chain_state(parent_id);
        }
        self.config = config;
        stale.len()
    }

    pub fn remove_chain(&mut self, parent_id: &str) -> usize {
        self.state.remove_chain_state(parent_id)
    }

    pub fn remove_entity(&mut self, parent_id: &str, entity_id: &str) -> bool {
        self.state.remove_entity_state(parent_id, entity_id)
    }

    pub fn remove_era(
        &mut self,
        parent_id: &str,
        entity_id: &str,
        era: EraIndex,
    ) -> Result<bool, AppError> {
        Ok(self.state.remove_era_state(parent_id, entity_id, era)?)
    }
}

fn dispatch(
    state: &mut AlertingState,
    profile: &ThresholdProfile,
    round: &MetricRound,
    alerts: &mut Vec<Alert>,
) -> Result<(), AppError> {
    let metric = round.metric;
    let obs = Observation {
        parent_id: &round.parent_id,
        entity_id: &round.entity_id,
        entity_name: &round.entity_name,
        metric,
        timestamp: round.timestamp,
    };

    if let Sample::Error { code } = round.sample {
        return classify_errors(state, profile, &obs, code, alerts);
    }

    let Some(rule) = profile.rule(metric) else {
        debug!(%metric, "Metric has no alert rule, skipping");
        return Ok(());
    };

    let raise = AlertTemplate::problem(metric);
    let repeat = AlertTemplate::repeat(metric);
    let resolve = AlertTemplate::resolved(metric);
    let classifier = metric.classifier();

    match (classifier, &round.sample, rule) {
        (ClassifierKind::Threshold, Sample::Pair { current, .. }, MetricRule::Threshold(c)) => {
            state.classify_threshold(&obs, *current, c, &raise, &resolve, alerts)?;
        }
        (
            ClassifierKind::ReverseThreshold,
            Sample::Pair { current, .. },
            MetricRule::Threshold(c),
        ) => {
            state.classify_reverse_threshold(&obs, *current, c, &raise, &resolve, alerts)?;
        }
        (
            ClassifierKind::OccurrenceThreshold,
            Sample::Pair {
                current, previous, ..
            },
            MetricRule::Occurrence(c),
        ) => {
            state.classify_occurrence_threshold(
                &obs, *current, *previous, c, &raise, &resolve, alerts,
            )?;
        }
        (
            ClassifierKind::NoChange,
            Sample::Pair {
                current,
                previous,
                condition,
            },
            MetricRule::TimeWindow(c),
        ) => {
            let condition = condition.unwrap_or(true);
            state.classify_no_change(
                &obs,
                *current,
                *previous,
                || condition,
                c,
                &raise,
                &resolve,
                alerts,
            )?;
        }
        (ClassifierKind::Downtime, Sample::Downtime { went_down_at }, MetricRule::TimeWindow(c)) => {
            state.classify_downtime(&obs, *went_down_at, c, &raise, &repeat, &resolve, alerts)?;
        }
        (
            ClassifierKind::EraThreshold,
            Sample::Era {
                era,
                value,
                settled,
            },
            MetricRule::Threshold(c),
        ) => {
            if *settled {
                state.classify_era_solved(&obs, *era, &resolve, alerts)?;
            } else {
                state.classify_era_threshold(&obs, *era, *value, c, &raise, alerts)?;
            }
        }
        (ClassifierKind::Conditional, Sample::Flag { active }, MetricRule::Flag(c)) => {
            classify_conditional(
                &obs,
                || *active,
                conditional_severity(metric),
                c,
                &raise,
                alerts,
            );
        }
        (ClassifierKind::SolvableConditional, Sample::Flag { active }, MetricRule::Flag(c)) => {
            state.classify_solvable_conditional(
                &obs,
                || *active,
                || !*active,
                conditional_severity(metric),
                c,
                &raise,
                &resolve,
                alerts,
            )?;
        }
        (classifier, sample, _) => {
            return Err(AppError::SampleMismatch {
                metric,
                classifier,
                sample: sample.name(),
            });
        }
    }
    Ok(())
}

/// Run every configured error metric of the round's chain family against
/// the received error code, root causes first.
fn classify_errors(
    state: &mut AlertingState,
    profile: &ThresholdProfile,
    obs: &Observation<'_>,
    received: Option<ErrorCode>,
    alerts: &mut Vec<Alert>,
) -> Result<(), AppError> {
    for metric in obs.metric.family_error_metrics() {
        let (Some(MetricRule::Flag(config)), Some(watched)) =
            (profile.rule(metric), metric.watched_error())
        else {
            continue;
        };
        let obs = Observation { metric, ..*obs };
        state.classify_error(
            &obs,
            watched,
            received,
            metric.suppressed_by(),
            config,
            &AlertTemplate::problem(metric),
            &AlertTemplate::resolved(metric),
            alerts,
        )?;
    }
    Ok(())
}
