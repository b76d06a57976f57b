//! Threshold classifiers: increasing, reverse (decreasing),
//! occurrence-window and era-scoped.
//!
//! Critical repeats in this family are value-stepped: after the first
//! critical alert, another one fires each time the breach depth crosses
//! into a new multiple of `critical_repeat` beyond the threshold.

use tracing::debug;

use crate::alerts::{Alert, AlertConstructor, Observation, Severity, Trigger};
use crate::engine::codes::MetricCode;
use crate::engine::config::{OccurrenceConfig, ThresholdConfig};
use crate::engine::emit;
use crate::engine::error::EngineError;
use crate::engine::state::{AlertingState, EntityState, EraIndex};

/// `(value, threshold)` pairs fed to [`climb`]. A `None` level is disabled.
struct Ladder {
    warning: Option<(f64, f64)>,
    critical: Option<(f64, f64)>,
    repeat: Option<f64>,
}

enum Step {
    Critical { value: f64, threshold: f64 },
    Warning { value: f64, threshold: f64 },
    Resolved { band: Severity, threshold: Option<f64> },
    Quiet,
}

fn repeat_step(depth: f64, repeat: Option<f64>) -> i64 {
    match repeat {
        Some(step) if step > 0.0 => (depth / step).floor() as i64,
        _ => 0,
    }
}

/// Shared increasing-threshold state machine. Critical wins over warning,
/// and a problem is only resolved once no enabled level is breached.
fn climb(state: &mut EntityState, metric: MetricCode, ladder: &Ladder) -> Step {
    let critical = ladder.critical.filter(|(value, threshold)| value >= threshold);
    let warning = ladder.warning.filter(|(value, threshold)| value >= threshold);

    if let Some((value, threshold)) = critical {
        let step = repeat_step(value - threshold, ladder.repeat);
        if state.critical_sent.insert(metric) {
            state.critical_repeat_step.insert(metric, step);
            return Step::Critical { value, threshold };
        }
        if ladder.repeat.is_some() {
            let last = state.critical_repeat_step.entry(metric).or_insert(step);
            if step > *last {
                *last = step;
                return Step::Critical { value, threshold };
            }
        }
        return Step::Quiet;
    }

    if let Some((value, threshold)) = warning {
        if !state.critical_sent(metric) && state.warning_sent.insert(metric) {
            return Step::Warning { value, threshold };
        }
        return Step::Quiet;
    }

    if state.has_problem(metric) {
        let (band, level) = if state.critical_sent(metric) {
            (Severity::Critical, ladder.critical)
        } else {
            (Severity::Warning, ladder.warning)
        };
        state.clear_severity(metric);
        return Step::Resolved {
            band,
            threshold: level.map(|(_, threshold)| threshold),
        };
    }

    Step::Quiet
}

fn resolution<'a>(
    obs: &'a Observation<'a>,
    value: f64,
    band: Severity,
    threshold: Option<f64>,
) -> Trigger<'a> {
    let trigger = Trigger::new(obs, Severity::Info).value(value);
    match threshold {
        Some(threshold) => trigger.threshold(threshold, band),
        None => Trigger {
            threshold_severity: Some(band),
            ..trigger
        },
    }
}

impl AlertingState {
    /// Classify a metric whose problem grows with its value.
    pub fn classify_threshold(
        &mut self,
        obs: &Observation<'_>,
        current: f64,
        config: &ThresholdConfig,
        raise: &dyn AlertConstructor,
        resolve: &dyn AlertConstructor,
        out: &mut Vec<Alert>,
    ) -> Result<(), EngineError> {
        if !config.enabled {
            return Ok(());
        }
        let state = self.entity_mut(obs.parent_id, obs.entity_id)?;
        let ladder = Ladder {
            warning: config.warning.map(|t| (current, t)),
            critical: config.critical.map(|t| (current, t)),
            repeat: config.critical_repeat,
        };

        match climb(state, obs.metric, &ladder) {
            Step::Critical { value, threshold } => {
                let trigger = Trigger::new(obs, Severity::Critical)
                    .value(value)
                    .threshold(threshold, Severity::Critical);
                emit(out, raise, &trigger);
            }
            Step::Warning { value, threshold } => {
                let trigger = Trigger::new(obs, Severity::Warning)
                    .value(value)
                    .threshold(threshold, Severity::Warning);
                emit(out, raise, &trigger);
            }
            Step::Resolved { band, threshold } => {
                emit(out, resolve, &resolution(obs, current, band, threshold));
            }
            Step::Quiet => {}
        }
        Ok(())
    }

    /// Classify a metric whose problem grows as its value falls (balances,
    /// peer counts). Warning and critical recover independently, so one
    /// call may emit a critical recovery together with a warning.
    pub fn classify_reverse_threshold(
        &mut self,
        obs: &Observation<'_>,
        current: f64,
        config: &ThresholdConfig,
        raise: &dyn AlertConstructor,
        resolve: &dyn AlertConstructor,
        out: &mut Vec<Alert>,
    ) -> Result<(), EngineError> {
        if !config.enabled {
            return Ok(());
        }
        let state = self.entity_mut(obs.parent_id, obs.entity_id)?;
        let metric = obs.metric;
        let critical = config.critical.filter(|t| current <= *t);
        let warning = config.warning.filter(|t| current <= *t);

        if critical.is_none() && state.critical_sent.remove(&metric) {
            state.critical_repeat_step.remove(&metric);
            let trigger = resolution(obs, current, Severity::Critical, config.critical);
            emit(out, resolve, &trigger);
        }
        if warning.is_none() && state.warning_sent.remove(&metric) {
            let trigger = resolution(obs, current, Severity::Warning, config.warning);
            emit(out, resolve, &trigger);
        }

        if let Some(threshold) = critical {
            let step = repeat_step(threshold - current, config.critical_repeat);
            let fire = if state.critical_sent.insert(metric) {
                state.critical_repeat_step.insert(metric, step);
                true
            } else if config.critical_repeat.is_some() {
                let last = state.critical_repeat_step.entry(metric).or_insert(step);
                let deeper = step > *last;
                if deeper {
                    *last = step;
                }
                deeper
            } else {
                false
            };
            if fire {
                let trigger = Trigger::new(obs, Severity::Critical)
                    .value(current)
                    .threshold(threshold, Severity::Critical);
                emit(out, raise, &trigger);
            }
        } else if let Some(threshold) = warning {
            if state.warning_sent.insert(metric) {
                let trigger = Trigger::new(obs, Severity::Warning)
                    .value(current)
                    .threshold(threshold, Severity::Warning);
                emit(out, raise, &trigger);
            }
        }
        Ok(())
    }

    /// Classify "too many occurrences within a time window". `current` and
    /// `previous` are running totals; their difference is recorded as new
    /// occurrences at the observation timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_occurrence_threshold(
        &mut self,
        obs: &Observation<'_>,
        current: f64,
        previous: Option<f64>,
        config: &OccurrenceConfig,
        raise: &dyn AlertConstructor,
        resolve: &dyn AlertConstructor,
        out: &mut Vec<Alert>,
    ) -> Result<(), EngineError> {
        if !config.enabled {
            return Ok(());
        }
        let state = self.entity_mut(obs.parent_id, obs.entity_id)?;
        let metric = obs.metric;
        let now = obs.timestamp;
        let occurrences = previous
            .map(|previous| (current - previous).max(0.0).round() as u64)
            .unwrap_or(0);
        let (warning_count, critical_count) = {
            let (warning, critical) = state.occurrence_counters(
                metric,
                config.warning.map(|w| w.window),
                config.critical.map(|c| c.window),
            );
            if !warning.record(now, occurrences) {
                debug!(%metric, %now, "Ignoring stale occurrence recording");
            }
            critical.record(now, occurrences);
            (warning.count(now), critical.count(now))
        };

        let ladder = Ladder {
            warning: config
                .warning
                .map(|w| (warning_count as f64, w.threshold as f64)),
            critical: config
                .critical
                .map(|c| (critical_count as f64, c.threshold as f64)),
            repeat: config.critical_repeat.map(|step| step as f64),
        };

        match climb(state, metric, &ladder) {
            Step::Critical { value, threshold } => {
                let trigger = Trigger::new(obs, Severity::Critical)
                    .value(value)
                    .threshold(threshold, Severity::Critical);
                emit(out, raise, &trigger);
            }
            Step::Warning { value, threshold } => {
                let trigger = Trigger::new(obs, Severity::Warning)
                    .value(value)
                    .threshold(threshold, Severity::Warning);
                emit(out, raise, &trigger);
            }
            Step::Resolved { band, threshold } => {
                let count = match band {
                    Severity::Critical => critical_count,
                    _ => warning_count,
                };
                for counters in [&mut state.warning_occurrences, &mut state.critical_occurrences] {
                    if let Some(counter) = counters.get_mut(&metric) {
                        counter.reset();
                    }
                }
                emit(out, resolve, &resolution(obs, count as f64, band, threshold));
            }
            Step::Quiet => {}
        }
        Ok(())
    }

    /// Increasing-threshold classification scoped to one era. Era
    /// sub-state is created on the first breach and only removed through
    /// [`AlertingState::classify_era_solved`] or
    /// [`AlertingState::remove_era_state`].
    #[allow(clippy::too_many_arguments)]
    pub fn classify_era_threshold(
        &mut self,
        obs: &Observation<'_>,
        era: EraIndex,
        current: f64,
        config: &ThresholdConfig,
        raise: &dyn AlertConstructor,
        out: &mut Vec<Alert>,
    ) -> Result<(), EngineError> {
        if !config.enabled {
            return Ok(());
        }
        let metric = obs.metric;
        let eras = self
            .entity_mut(obs.parent_id, obs.entity_id)?
            .eras_mut(obs.parent_id, obs.entity_id)?;
        let critical = config.critical.filter(|t| current >= *t);
        let warning = config.warning.filter(|t| current >= *t);
        if critical.is_none() && warning.is_none() {
            return Ok(());
        }

        let era_state = eras.entry(era).or_default();
        if let Some(threshold) = critical {
            if era_state.critical_sent.insert(metric) {
                let trigger = Trigger::new(obs, Severity::Critical)
                    .value(current)
                    .threshold(threshold, Severity::Critical)
                    .era(era);
                emit(out, raise, &trigger);
            }
        } else if let Some(threshold) = warning {
            if !era_state.critical_sent(metric) && era_state.warning_sent.insert(metric) {
                let trigger = Trigger::new(obs, Severity::Warning)
                    .value(current)
                    .threshold(threshold, Severity::Warning)
                    .era(era);
                emit(out, raise, &trigger);
            }
        }
        Ok(())
    }

    /// The problem for `era` has been settled upstream: resolve it once and
    /// drop the era's flags for this metric.
    pub fn classify_era_solved(
        &mut self,
        obs: &Observation<'_>,
        era: EraIndex,
        resolve: &dyn AlertConstructor,
        out: &mut Vec<Alert>,
    ) -> Result<(), EngineError> {
        let metric = obs.metric;
        let eras = self
            .entity_mut(obs.parent_id, obs.entity_id)?
            .eras_mut(obs.parent_id, obs.entity_id)?;
        let Some(era_state) = eras.get_mut(&era) else {
            return Ok(());
        };

        let was_critical = era_state.critical_sent.remove(&metric);
        let was_warning = era_state.warning_sent.remove(&metric);
        if era_state.is_empty() {
            eras.remove(&era);
        }

        let band = if was_critical {
            Severity::Critical
        } else if was_warning {
            Severity::Warning
        } else {
            return Ok(());
        };
        let trigger = Trigger {
            threshold_severity: Some(band),
            ..Trigger::new(obs, Severity::Info).era(era)
        };
        emit(out, resolve, &trigger);
        Ok(())
    }
}
