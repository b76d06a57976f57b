//! Event-style classifiers: one-shot conditionals, solvable conditionals
//! and upstream error detection.

use crate::alerts::{Alert, AlertConstructor, Observation, Severity, Trigger};
use crate::engine::codes::{ErrorCode, MetricCode};
use crate::engine::config::FlagConfig;
use crate::engine::emit;
use crate::engine::error::EngineError;
use crate::engine::state::AlertingState;

/// Raise one alert when `condition` holds. Nothing is remembered: the
/// caller guarantees each qualifying event (a new proposal, a slashing)
/// is only observed once.
pub fn classify_conditional(
    obs: &Observation<'_>,
    condition: impl FnOnce() -> bool,
    severity: Severity,
    config: &FlagConfig,
    raise: &dyn AlertConstructor,
    out: &mut Vec<Alert>,
) {
    if config.enabled && condition() {
        emit(out, raise, &Trigger::new(obs, severity));
    }
}

impl AlertingState {
    /// Raise once while `problem` holds, then resolve once when it no
    /// longer holds and `resolved` confirms the recovery.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_solvable_conditional(
        &mut self,
        obs: &Observation<'_>,
        problem: impl FnOnce() -> bool,
        resolved: impl FnOnce() -> bool,
        severity: Severity,
        config: &FlagConfig,
        raise: &dyn AlertConstructor,
        resolve: &dyn AlertConstructor,
        out: &mut Vec<Alert>,
    ) -> Result<(), EngineError> {
        if !config.enabled {
            return Ok(());
        }
        let state = self.entity_mut(obs.parent_id, obs.entity_id)?;
        let metric = obs.metric;

        if problem() {
            if state.any_severity_sent.insert(metric) {
                emit(out, raise, &Trigger::new(obs, severity));
            }
        } else if state.any_severity_sent(metric) && resolved() {
            state.any_severity_sent.remove(&metric);
            let trigger = Trigger {
                threshold_severity: Some(severity),
                ..Trigger::new(obs, Severity::Info)
            };
            emit(out, resolve, &trigger);
        }
        Ok(())
    }

    /// Raise an error alert when `watched` is the error received this
    /// round and resolve it on the first round without it.
    ///
    /// While any metric in `suppressed_by` has an active error the check
    /// is skipped entirely, so root-cause errors must be classified first.
    #[allow(clippy::too_many_arguments)]
    pub fn classify_error(
        &mut self,
        obs: &Observation<'_>,
        watched: ErrorCode,
        received: Option<ErrorCode>,
        suppressed_by: &[MetricCode],
        config: &FlagConfig,
        raise: &dyn AlertConstructor,
        resolve: &dyn AlertConstructor,
        out: &mut Vec<Alert>,
    ) -> Result<(), EngineError> {
        if !config.enabled {
            return Ok(());
        }
        let state = self.entity_mut(obs.parent_id, obs.entity_id)?;
        if suppressed_by.iter().any(|m| state.error_sent(*m)) {
            return Ok(());
        }

        let metric = obs.metric;
        if received == Some(watched) {
            if state.error_sent.insert(metric) {
                emit(out, raise, &Trigger::new(obs, Severity::Error));
            }
        } else if state.error_sent.remove(&metric) {
            let trigger = Trigger {
                threshold_severity: Some(Severity::Error),
                ..Trigger::new(obs, Severity::Info)
            };
            emit(out, resolve, &trigger);
        }
        Ok(())
    }
}
