//! Prometheus metrics registry for the chain alerter.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup and pass it to the replay loop.
//! The registry is rendered in Prometheus text exposition format on
//! demand (`--print-metrics`).

use prometheus::{Counter, CounterVec, Gauge, Opts, Registry};

use crate::alerts::Alert;

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Metric rounds classified successfully.
    pub rounds_processed_total: Counter,
    /// Metric rounds dropped because they were malformed or inconsistent.
    pub rounds_skipped_total: Counter,
    /// Alerts raised, labelled by severity.
    pub alerts_raised_total: CounterVec,
    /// Entities with alerting state.
    pub tracked_entities: Gauge,
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let rounds_processed_total = Counter::with_opts(Opts::new(
            "chain_alerter_rounds_processed_total",
            "Metric rounds classified",
        ))?;

        let rounds_skipped_total = Counter::with_opts(Opts::new(
            "chain_alerter_rounds_skipped_total",
            "Metric rounds skipped as malformed or inconsistent",
        ))?;

        let alerts_raised_total = CounterVec::new(
            Opts::new("chain_alerter_alerts_raised_total", "Alerts raised by severity"),
            &["severity"],
        )?;

        let tracked_entities = Gauge::with_opts(Opts::new(
            "chain_alerter_tracked_entities",
            "Entities with alerting state",
        ))?;

        registry.register(Box::new(rounds_processed_total.clone()))?;
        registry.register(Box::new(rounds_skipped_total.clone()))?;
        registry.register(Box::new(alerts_raised_total.clone()))?;
        registry.register(Box::new(tracked_entities.clone()))?;

        Ok(Self {
            rounds_processed_total,
            rounds_skipped_total,
            alerts_raised_total,
            tracked_entities,
            registry,
        })
    }

    pub fn record_alerts(&self, alerts: &[Alert]) {
        for alert in alerts {
            self.alerts_raised_total
                .with_label_values(&[alert.severity.as_str()])
                .inc();
        }
    }

    /// Render all metrics as Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
