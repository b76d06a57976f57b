//! Alert Classification Engine
//!
//! Stateful decision logic that turns `{current, previous}` metric pairs
//! and typed threshold configuration into severity-classified alerts.
//! Every classifier reads a metric, consults and mutates the per-entity
//! [`AlertingState`], and appends zero or more [`Alert`]s to a
//! caller-owned list. Nothing in here performs I/O or reads the clock.

pub mod codes;
pub mod conditional;
pub mod config;
pub mod error;
pub mod state;
pub mod threshold;
pub mod timing;
pub mod window;


pub use codes::{ClassifierKind, ErrorCode, MetricCode};
pub use conditional::classify_conditional;
pub use config::{
    AlertsConfig, EntityKind, FlagConfig, MetricRule, OccurrenceConfig, RawMetricConfig,
    ThresholdConfig, ThresholdProfile, TimeWindowConfig,
};
pub use error::EngineError;
pub use state::{AlertingState, EntityState, EraIndex, EraState, StateChange};
pub use timing::{IntervalTracker, OccurrenceWindowCounter, RateLimiter};

use tracing::debug;

use crate::alerts::{Alert, AlertConstructor, Trigger};

/// Build an alert from `trigger` and append it to `out`.
pub(crate) fn emit(out: &mut Vec<Alert>, constructor: &dyn AlertConstructor, trigger: &Trigger<'_>) {
    let alert = constructor.construct(trigger);
    debug!(
        parent_id = trigger.observation.parent_id,
        entity_id = trigger.observation.entity_id,
        metric = %trigger.observation.metric,
        severity = %alert.severity,
        code = %alert.alert_code,
        "Alert raised"
    );
    out.push(alert);
}
