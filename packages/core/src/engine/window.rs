//! Time-window classifiers: "value stuck for too long" and "entity down
//! for too long".
//!
//! Both run the same state machine. While the problem condition holds,
//! the warning and critical timers run from the moment it started; each
//! level alerts once when its timer elapses, critical suppresses warning,
//! and an outstanding critical is repeated whenever the repeat limiter
//! allows. When the condition clears, an outstanding problem is resolved
//! once and every timer is reset.

use chrono::{DateTime, Utc};

use crate::alerts::{Alert, AlertConstructor, Observation, Severity, Trigger};
use crate::engine::config::TimeWindowConfig;
use crate::engine::emit;
use crate::engine::error::EngineError;
use crate::engine::state::{AlertingState, EntityState};

fn window_seconds(duration: chrono::Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

/// Resolve an outstanding problem (if any) and reset the window.
fn clear(
    state: &mut EntityState,
    obs: &Observation<'_>,
    value: Option<f64>,
    resolve: &dyn AlertConstructor,
    out: &mut Vec<Alert>,
) {
    let metric = obs.metric;
    if state.has_problem(metric) {
        let band = if state.critical_sent(metric) {
            Severity::Critical
        } else {
            Severity::Warning
        };
        let since = state
            .critical_timer(metric)
            .and_then(|t| t.started_at())
            .or_else(|| state.warning_timer(metric).and_then(|t| t.started_at()));

        let mut trigger = Trigger {
            threshold_severity: Some(band),
            ..Trigger::new(obs, Severity::Info)
        };
        if let Some(value) = value {
            trigger = trigger.value(value);
        }
        if let Some(since) = since {
            trigger = trigger.duration(obs.timestamp.signed_duration_since(since));
        }
        emit(out, resolve, &trigger);
    }
    state.reset_window(metric);
}

/// Advance the window for a condition that has held since `since`.
#[allow(clippy::too_many_arguments)]
fn hold(
    state: &mut EntityState,
    obs: &Observation<'_>,
    config: &TimeWindowConfig,
    since: DateTime<Utc>,
    value: Option<f64>,
    raise: &dyn AlertConstructor,
    repeat: &dyn AlertConstructor,
    out: &mut Vec<Alert>,
) {
    let metric = obs.metric;
    let now = obs.timestamp;

    let (critical_due, warning_due, repeat_due) = {
        let (warning_timer, critical_timer, limiter) = state.window_timers(
            metric,
            config.warning,
            config.critical,
            config.critical_repeat,
        );
        if config.warning.is_some() {
            warning_timer.start(since);
        }
        if config.critical.is_some() {
            critical_timer.start(since);
        }
        (
            config.critical.is_some() && critical_timer.elapsed(now),
            config.warning.is_some() && warning_timer.elapsed(now),
            config.critical_repeat.is_some() && limiter.can_run(now),
        )
    };

    let held_for = now.signed_duration_since(since);
    let trigger = |severity: Severity, window: Option<chrono::Duration>| {
        let mut trigger = Trigger::new(obs, severity).duration(held_for);
        if let Some(value) = value {
            trigger = trigger.value(value);
        }
        if let Some(window) = window {
            trigger = trigger.threshold(window_seconds(window), severity);
        }
        trigger
    };

    if critical_due {
        let first = state.critical_sent.insert(metric);
        if first || repeat_due {
            if let Some(limiter) = state.critical_repeat_timer.get_mut(&metric) {
                limiter.mark_run(now);
            }
            let constructor = if first { raise } else { repeat };
            emit(out, constructor, &trigger(Severity::Critical, config.critical));
        }
    }

    if warning_due && !state.critical_sent(metric) && state.warning_sent.insert(metric) {
        emit(out, raise, &trigger(Severity::Warning, config.warning));
    }
}

impl AlertingState {
    /// Classify "the value has not changed for too long". `condition` is
    /// an extra guard evaluated only while the value is unchanged (e.g.
    /// "the node is not catching up"); when it is false the window is
    /// cleared as if the value had moved.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_no_change(
        &mut self,
        obs: &Observation<'_>,
        current: f64,
        previous: Option<f64>,
        condition: impl FnOnce() -> bool,
        config: &TimeWindowConfig,
        raise: &dyn AlertConstructor,
        resolve: &dyn AlertConstructor,
        out: &mut Vec<Alert>,
    ) -> Result<(), EngineError> {
        if !config.enabled {
            return Ok(());
        }
        let state = self.entity_mut(obs.parent_id, obs.entity_id)?;

        if previous != Some(current) || !condition() {
            clear(state, obs, Some(current), resolve, out);
            return Ok(());
        }

        let since = state
            .critical_timer(obs.metric)
            .and_then(|t| t.started_at())
            .or_else(|| state.warning_timer(obs.metric).and_then(|t| t.started_at()))
            .unwrap_or(obs.timestamp);
        hold(state, obs, config, since, Some(current), raise, raise, out);
        Ok(())
    }

    /// Classify downtime from the time the entity went down. `None` means
    /// the entity is up; a different `went_down_at` than the one the
    /// window started from means a new outage.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_downtime(
        &mut self,
        obs: &Observation<'_>,
        went_down_at: Option<DateTime<Utc>>,
        config: &TimeWindowConfig,
        went_down: &dyn AlertConstructor,
        still_down: &dyn AlertConstructor,
        back_up: &dyn AlertConstructor,
        out: &mut Vec<Alert>,
    ) -> Result<(), EngineError> {
        if !config.enabled {
            return Ok(());
        }
        let state = self.entity_mut(obs.parent_id, obs.entity_id)?;

        let Some(down_since) = went_down_at else {
            clear(state, obs, None, back_up, out);
            return Ok(());
        };

        let window_start = state
            .critical_timer(obs.metric)
            .and_then(|t| t.started_at())
            .or_else(|| state.warning_timer(obs.metric).and_then(|t| t.started_at()));
        if window_start.is_some_and(|start| start != down_since) {
            clear(state, obs, None, back_up, out);
        }

        hold(state, obs, config, down_since, None, went_down, still_down, out);
        Ok(())
    }
}
