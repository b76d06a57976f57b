//! Per-entity alerting state and its lifecycle.
//!
//! [`AlertingState`] maps `(parent_id, entity_id)` to an [`EntityState`]
//! holding the "already alerted" flags and the timers each classifier
//! needs. State lives only in memory: it is rebuilt from configuration on
//! start and dropped when a chain or entity is retired.
//!
//! The store is owned by a single alerter and is not `Sync`-guarded;
//! callers that share it across tasks wrap it in a lock.

use std::collections::{HashMap, HashSet};

use chrono::Duration;
use tracing::debug;

use crate::engine::codes::MetricCode;
use crate::engine::config::{EntityKind, MetricRule, ThresholdProfile};
use crate::engine::error::EngineError;
use crate::engine::timing::{IntervalTracker, OccurrenceWindowCounter, RateLimiter};

/// Chain-defined epoch index (e.g. a staking era).
pub type EraIndex = u32;

/// Flags for metrics tracked per era instead of per entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EraState {
    pub(crate) warning_sent: HashSet<MetricCode>,
    pub(crate) critical_sent: HashSet<MetricCode>,
}

impl EraState {
    pub fn warning_sent(&self, metric: MetricCode) -> bool {
        self.warning_sent.contains(&metric)
    }

    pub fn critical_sent(&self, metric: MetricCode) -> bool {
        self.critical_sent.contains(&metric)
    }

    pub fn is_empty(&self) -> bool {
        self.warning_sent.is_empty() && self.critical_sent.is_empty()
    }
}

/// Everything the classifiers remember about one entity.
#[derive(Debug, Clone, Default)]
pub struct EntityState {
    pub(crate) kind: EntityKind,
    pub(crate) warning_sent: HashSet<MetricCode>,
    pub(crate) critical_sent: HashSet<MetricCode>,
    pub(crate) error_sent: HashSet<MetricCode>,
    pub(crate) any_severity_sent: HashSet<MetricCode>,
    pub(crate) warning_window_timer: HashMap<MetricCode, IntervalTracker>,
    pub(crate) critical_window_timer: HashMap<MetricCode, IntervalTracker>,
    pub(crate) critical_repeat_timer: HashMap<MetricCode, RateLimiter>,
    /// Highest breach-depth step already alerted, for value-stepped repeats.
    pub(crate) critical_repeat_step: HashMap<MetricCode, i64>,
    pub(crate) warning_occurrences: HashMap<MetricCode, OccurrenceWindowCounter>,
    pub(crate) critical_occurrences: HashMap<MetricCode, OccurrenceWindowCounter>,
    /// `Some` only for entities whose profile has era-scoped metrics.
    pub(crate) eras: Option<HashMap<EraIndex, EraState>>,
}

impl EntityState {
    pub fn new(kind: EntityKind, profile: &ThresholdProfile) -> Self {
        let mut state = Self {
            kind,
            ..Self::default()
        };
        state.apply_profile(profile);
        state
    }

    /// Bring timer intervals in line with `profile`. Running timers keep
    /// their start; flags and recorded occurrences are left alone.
    pub(crate) fn apply_profile(&mut self, profile: &ThresholdProfile) {
        for (metric, rule) in profile.rules() {
            match rule {
                MetricRule::TimeWindow(config) => {
                    self.window_timers(
                        *metric,
                        config.warning,
                        config.critical,
                        config.critical_repeat,
                    );
                }
                MetricRule::Occurrence(config) => {
                    self.occurrence_counters(
                        *metric,
                        config.warning.map(|w| w.window),
                        config.critical.map(|c| c.window),
                    );
                }
                MetricRule::Threshold(_) | MetricRule::Flag(_) => {}
            }
        }
        if profile.tracks_eras() && self.eras.is_none() {
            self.eras = Some(HashMap::new());
        }
    }

    /// Window timers for `metric`, created on demand and re-synced to the
    /// given intervals (disabled levels get a zero interval).
    pub(crate) fn window_timers(
        &mut self,
        metric: MetricCode,
        warning: Option<Duration>,
        critical: Option<Duration>,
        repeat: Option<Duration>,
    ) -> (&mut IntervalTracker, &mut IntervalTracker, &mut RateLimiter) {
        let zero = Duration::zero();
        let warning_timer = self
            .warning_window_timer
            .entry(metric)
            .or_insert_with(|| IntervalTracker::new(zero));
        warning_timer.set_interval(warning.unwrap_or(zero));
        let critical_timer = self
            .critical_window_timer
            .entry(metric)
            .or_insert_with(|| IntervalTracker::new(zero));
        critical_timer.set_interval(critical.unwrap_or(zero));
        let limiter = self
            .critical_repeat_timer
            .entry(metric)
            .or_insert_with(|| RateLimiter::new(zero));
        limiter.set_interval(repeat.unwrap_or(zero));
        (warning_timer, critical_timer, limiter)
    }

    /// Occurrence counters for `metric`, created on demand and re-synced to
    /// the given windows.
    pub(crate) fn occurrence_counters(
        &mut self,
        metric: MetricCode,
        warning: Option<Duration>,
        critical: Option<Duration>,
    ) -> (&mut OccurrenceWindowCounter, &mut OccurrenceWindowCounter) {
        let zero = Duration::zero();
        let warning_counter = self
            .warning_occurrences
            .entry(metric)
            .or_insert_with(|| OccurrenceWindowCounter::new(zero));
        warning_counter.set_window(warning.unwrap_or(zero));
        let critical_counter = self
            .critical_occurrences
            .entry(metric)
            .or_insert_with(|| OccurrenceWindowCounter::new(zero));
        critical_counter.set_window(critical.unwrap_or(zero));
        (warning_counter, critical_counter)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn warning_sent(&self, metric: MetricCode) -> bool {
        self.warning_sent.contains(&metric)
    }

    pub fn critical_sent(&self, metric: MetricCode) -> bool {
        self.critical_sent.contains(&metric)
    }

    pub fn error_sent(&self, metric: MetricCode) -> bool {
        self.error_sent.contains(&metric)
    }

    pub fn any_severity_sent(&self, metric: MetricCode) -> bool {
        self.any_severity_sent.contains(&metric)
    }

    /// A warning or critical alert is outstanding for `metric`.
    pub fn has_problem(&self, metric: MetricCode) -> bool {
        self.warning_sent(metric) || self.critical_sent(metric)
    }

    pub fn tracks_eras(&self) -> bool {
        self.eras.is_some()
    }

    pub fn era(&self, era: EraIndex) -> Option<&EraState> {
        self.eras.as_ref()?.get(&era)
    }

    pub fn warning_timer(&self, metric: MetricCode) -> Option<&IntervalTracker> {
        self.warning_window_timer.get(&metric)
    }

    pub fn critical_timer(&self, metric: MetricCode) -> Option<&IntervalTracker> {
        self.critical_window_timer.get(&metric)
    }

    pub fn repeat_limiter(&self, metric: MetricCode) -> Option<&RateLimiter> {
        self.critical_repeat_timer.get(&metric)
    }

    /// Drop both severity flags and the repeat progress for `metric`.
    pub(crate) fn clear_severity(&mut self, metric: MetricCode) {
        self.warning_sent.remove(&metric);
        self.critical_sent.remove(&metric);
        self.critical_repeat_step.remove(&metric);
    }

    /// Reset the no-change/downtime timers and flags for `metric`.
    pub(crate) fn reset_window(&mut self, metric: MetricCode) {
        if let Some(timer) = self.warning_window_timer.get_mut(&metric) {
            timer.reset();
        }
        if let Some(timer) = self.critical_window_timer.get_mut(&metric) {
            timer.reset();
        }
        if let Some(limiter) = self.critical_repeat_timer.get_mut(&metric) {
            limiter.reset();
        }
        self.clear_severity(metric);
    }

    pub(crate) fn eras_mut(
        &mut self,
        parent_id: &str,
        entity_id: &str,
    ) -> Result<&mut HashMap<EraIndex, EraState>, EngineError> {
        self.eras
            .as_mut()
            .ok_or_else(|| EngineError::era_tracking_disabled(parent_id, entity_id))
    }
}

/// Outcome of [`AlertingState::create_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Created,
    KindChanged,
    Unchanged,
}

/// Alerting state for every entity an alerter has seen, grouped by chain.
#[derive(Debug, Default)]
pub struct AlertingState {
    chains: HashMap<String, HashMap<String, EntityState>>,
}

impl AlertingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create state for an entity on first sight. Calling again is a no-op
    /// unless `kind` changed, in which case timers are rebuilt from
    /// `profile` and everything else is preserved.
    pub fn create_state(
        &mut self,
        parent_id: &str,
        entity_id: &str,
        kind: EntityKind,
        profile: &ThresholdProfile,
    ) -> StateChange {
        let entities = self.chains.entry(parent_id.to_string()).or_default();
        match entities.get_mut(entity_id) {
            Some(state) if state.kind == kind => StateChange::Unchanged,
            Some(state) => {
                debug!(
                    parent_id,
                    entity_id,
                    from = ?state.kind,
                    to = ?kind,
                    "Entity kind changed, rebuilding timers"
                );
                state.kind = kind;
                state.apply_profile(profile);
                StateChange::KindChanged
            }
            None => {
                debug!(parent_id, entity_id, ?kind, "Creating alerting state");
                entities.insert(entity_id.to_string(), EntityState::new(kind, profile));
                StateChange::Created
            }
        }
    }

    pub fn entity(&self, parent_id: &str, entity_id: &str) -> Option<&EntityState> {
        self.chains.get(parent_id)?.get(entity_id)
    }

    pub fn entity_mut(
        &mut self,
        parent_id: &str,
        entity_id: &str,
    ) -> Result<&mut EntityState, EngineError> {
        self.chains
            .get_mut(parent_id)
            .and_then(|entities| entities.get_mut(entity_id))
            .ok_or_else(|| EngineError::unknown_entity(parent_id, entity_id))
    }

    pub fn contains(&self, parent_id: &str, entity_id: &str) -> bool {
        self.entity(parent_id, entity_id).is_some()
    }

    /// Retire one entity. Returns `true` if it had state.
    pub fn remove_entity_state(&mut self, parent_id: &str, entity_id: &str) -> bool {
        let Some(entities) = self.chains.get_mut(parent_id) else {
            return false;
        };
        let removed = entities.remove(entity_id).is_some();
        if entities.is_empty() {
            self.chains.remove(parent_id);
        }
        if removed {
            debug!(parent_id, entity_id, "Removed alerting state");
        }
        removed
    }

    /// Drop every entity under a chain. Returns how many were removed.
    pub fn remove_chain_state(&mut self, parent_id: &str) -> usize {
        let removed = self
            .chains
            .remove(parent_id)
            .map(|entities| entities.len())
            .unwrap_or(0);
        if removed > 0 {
            debug!(parent_id, removed, "Removed chain alerting state");
        }
        removed
    }

    /// Create empty sub-state for `era` if it does not exist yet.
    pub fn create_era_state(
        &mut self,
        parent_id: &str,
        entity_id: &str,
        era: EraIndex,
    ) -> Result<(), EngineError> {
        self.entity_mut(parent_id, entity_id)?
            .eras_mut(parent_id, entity_id)?
            .entry(era)
            .or_default();
        Ok(())
    }

    /// Retire the sub-state of `era`. Returns `true` if it existed.
    pub fn remove_era_state(
        &mut self,
        parent_id: &str,
        entity_id: &str,
        era: EraIndex,
    ) -> Result<bool, EngineError> {
        let removed = self
            .entity_mut(parent_id, entity_id)?
            .eras_mut(parent_id, entity_id)?
            .remove(&era)
            .is_some();
        Ok(removed)
    }

    pub fn entity_count(&self) -> usize {
        self.chains.values().map(HashMap::len).sum()
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &String> {
        self.chains.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::codes::{CosmosMetric, SubstrateMetric};
    use crate::engine::config::{OccurrenceConfig, TimeWindowConfig, WindowedThreshold};
    use chrono::DateTime;

    const NO_CHANGE: MetricCode = MetricCode::Cosmos(CosmosMetric::NoChangeInBlockHeight);
    const MISSED: MetricCode = MetricCode::Cosmos(CosmosMetric::MissedBlocks);
    const PAYOUT: MetricCode = MetricCode::Substrate(SubstrateMetric::PayoutNotClaimed);

    fn window_profile(warning_secs: i64) -> ThresholdProfile {
        ThresholdProfile::new().with_rule(
            NO_CHANGE,
            MetricRule::TimeWindow(TimeWindowConfig {
                enabled: true,
                warning: Some(Duration::seconds(warning_secs)),
                critical: Some(Duration::seconds(warning_secs * 2)),
                critical_repeat: None,
            }),
        )
    }

    fn era_profile() -> ThresholdProfile {
        ThresholdProfile::new().with_rule(
            PAYOUT,
            MetricRule::Threshold(Default::default()),
        )
    }

    #[test]
    fn create_state_is_idempotent() {
        let mut store = AlertingState::new();
        let profile = window_profile(10);
        assert_eq!(
            store.create_state("chain", "node", EntityKind::Node, &profile),
            StateChange::Created
        );
        store.entity_mut("chain", "node").unwrap().warning_sent.insert(NO_CHANGE);
        assert_eq!(
            store.create_state("chain", "node", EntityKind::Node, &profile),
            StateChange::Unchanged
        );
        assert!(store.entity("chain", "node").unwrap().warning_sent(NO_CHANGE));
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn creation_builds_timers_from_profile() {
        let mut store = AlertingState::new();
        store.create_state("chain", "node", EntityKind::Node, &window_profile(10));
        let state = store.entity("chain", "node").unwrap();
        assert_eq!(
            state.warning_timer(NO_CHANGE).unwrap().interval(),
            Duration::seconds(10)
        );
        assert_eq!(
            state.critical_timer(NO_CHANGE).unwrap().interval(),
            Duration::seconds(20)
        );
        assert!(!state.tracks_eras());
    }

    #[test]
    fn kind_change_rebuilds_timers_but_keeps_flags() {
        let mut store = AlertingState::new();
        store.create_state("chain", "node", EntityKind::Node, &window_profile(10));
        let started = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        {
            let state = store.entity_mut("chain", "node").unwrap();
            state.warning_sent.insert(NO_CHANGE);
            state
                .warning_window_timer
                .get_mut(&NO_CHANGE)
                .unwrap()
                .start(started);
        }

        let validator_profile = window_profile(30).with_rule(
            MISSED,
            MetricRule::Occurrence(OccurrenceConfig {
                enabled: true,
                warning: Some(WindowedThreshold {
                    threshold: 5,
                    window: Duration::seconds(60),
                }),
                critical: None,
                critical_repeat: None,
            }),
        );
        assert_eq!(
            store.create_state("chain", "node", EntityKind::Validator, &validator_profile),
            StateChange::KindChanged
        );

        let state = store.entity("chain", "node").unwrap();
        assert_eq!(state.kind(), EntityKind::Validator);
        assert!(state.warning_sent(NO_CHANGE));
        let timer = state.warning_timer(NO_CHANGE).unwrap();
        assert_eq!(timer.interval(), Duration::seconds(30));
        assert_eq!(timer.started_at(), Some(started));
        assert_eq!(
            state.warning_occurrences.get(&MISSED).unwrap().window(),
            Duration::seconds(60)
        );
    }

    #[test]
    fn unknown_entity_is_reported() {
        let mut store = AlertingState::new();
        let err = store.entity_mut("chain", "ghost").unwrap_err();
        assert_eq!(err, EngineError::unknown_entity("chain", "ghost"));
    }

    #[test]
    fn remove_chain_state_drops_all_entities() {
        let mut store = AlertingState::new();
        let profile = ThresholdProfile::new();
        store.create_state("a", "n1", EntityKind::Node, &profile);
        store.create_state("a", "n2", EntityKind::Node, &profile);
        store.create_state("b", "n1", EntityKind::Node, &profile);

        assert_eq!(store.remove_chain_state("a"), 2);
        assert_eq!(store.remove_chain_state("a"), 0);
        assert!(!store.contains("a", "n1"));
        assert!(store.contains("b", "n1"));
    }

    #[test]
    fn remove_entity_state_only_touches_that_entity() {
        let mut store = AlertingState::new();
        let profile = ThresholdProfile::new();
        store.create_state("a", "n1", EntityKind::Node, &profile);
        store.create_state("a", "n2", EntityKind::Node, &profile);

        assert!(store.remove_entity_state("a", "n1"));
        assert!(!store.remove_entity_state("a", "n1"));
        assert!(store.contains("a", "n2"));
    }

    #[test]
    fn era_state_requires_era_tracking_profile() {
        let mut store = AlertingState::new();
        store.create_state("dot", "node", EntityKind::Node, &ThresholdProfile::new());
        assert_eq!(
            store.create_era_state("dot", "node", 7).unwrap_err(),
            EngineError::era_tracking_disabled("dot", "node")
        );

        store.create_state("dot", "val", EntityKind::Validator, &era_profile());
        store.create_era_state("dot", "val", 7).unwrap();
        let state = store.entity("dot", "val").unwrap();
        assert!(state.era(7).unwrap().is_empty());
        assert!(store.remove_era_state("dot", "val", 7).unwrap());
        assert!(!store.remove_era_state("dot", "val", 7).unwrap());
    }
}
