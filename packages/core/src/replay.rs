//! Metric round replay loop.
//!
//! Reads newline-delimited JSON [`MetricRound`]s, classifies each one and
//! publishes the resulting alerts before moving to the next line.
//! Malformed or inconsistent rounds are logged and skipped; a failing sink
//! stops the replay since the round could not be delivered.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::signal;

use crate::alerter::{Alerter, MetricRound};
use crate::alerts::AlertSink;
use crate::error::AppError;
use crate::metrics::AppMetrics;

/// Totals for one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub processed: u64,
    pub skipped: u64,
    pub alerts: u64,
}

enum LineOutcome {
    Blank,
    Skipped,
    Processed(usize),
}

/// Replay every round from `input` until end of input or `Ctrl+C`.
pub async fn run_replay<R, S>(
    input: R,
    alerter: &mut Alerter,
    sink: &S,
    metrics: &AppMetrics,
) -> Result<ReplaySummary, AppError>
where
    R: AsyncBufRead + Unpin,
    S: AlertSink + ?Sized,
{
    let mut lines = input.lines();
    let mut summary = ReplaySummary::default();
    let mut line_no = 0usize;

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!("Replay started (sink: {})", sink.sink_name());

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received. Stopping replay.");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        line_no += 1;

        match process_line(&line, line_no, alerter, sink, metrics).await? {
            LineOutcome::Blank => {}
            LineOutcome::Skipped => summary.skipped += 1,
            LineOutcome::Processed(alerts) => {
                summary.processed += 1;
                summary.alerts += alerts as u64;
            }
        }
    }

    tracing::info!(
        "Replay finished: {} round(s) processed, {} skipped, {} alert(s) raised",
        summary.processed,
        summary.skipped,
        summary.alerts
    );
    Ok(summary)
}

/// Classify and publish a single input line. Extracted for testability.
async fn process_line<S>(
    line: &str,
    line_no: usize,
    alerter: &mut Alerter,
    sink: &S,
    metrics: &AppMetrics,
) -> Result<LineOutcome, AppError>
where
    S: AlertSink + ?Sized,
{
    if line.trim().is_empty() {
        return Ok(LineOutcome::Blank);
    }

    let round: MetricRound = match serde_json::from_str(line) {
        Ok(round) => round,
        Err(err) => {
            tracing::warn!("Skipping malformed round on line {}: {}", line_no, err);
            metrics.rounds_skipped_total.inc();
            return Ok(LineOutcome::Skipped);
        }
    };

    let alerts = match alerter.process(&round) {
        Ok(alerts) => alerts,
        Err(err) => {
            tracing::warn!("Skipping round on line {}: {}", line_no, err);
            metrics.rounds_skipped_total.inc();
            return Ok(LineOutcome::Skipped);
        }
    };

    sink.publish(&alerts).await?;

    metrics.rounds_processed_total.inc();
    metrics.record_alerts(&alerts);
    metrics
        .tracked_entities
        .set(alerter.state().entity_count() as f64);
    tracing::debug!(
        "Line {}: {} alert(s) for {}/{}",
        line_no,
        alerts.len(),
        round.parent_id,
        round.entity_id
    );
    Ok(LineOutcome::Processed(alerts.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::alerts::{Alert, MemorySink, Severity, SinkError};
    use crate::engine::codes::{MetricCode, SystemMetric};
    use crate::engine::config::{
        AlertsConfig, ChainProfiles, EntityKind, MetricRule, ThresholdConfig, ThresholdProfile,
    };

    const CPU: MetricCode = MetricCode::System(SystemMetric::CpuUsage);

    fn alerter() -> Alerter {
        let profile = ThresholdProfile::new().with_rule(
            CPU,
            MetricRule::Threshold(ThresholdConfig {
                enabled: true,
                warning: Some(80.0),
                critical: Some(95.0),
                critical_repeat: None,
            }),
        );
        Alerter::new(AlertsConfig::default().with_chain(
            "infra",
            ChainProfiles::default().with_profile(EntityKind::System, profile),
        ))
    }

    fn line(secs: u32, current: f64) -> String {
        format!(
            r#"{{"parent_id":"infra","entity_id":"host-1","entity_name":"host one","kind":"system","metric":"system_cpu_usage","timestamp":"2026-01-01T00:00:{:02}Z","sample":{{"type":"pair","current":{}}}}}"#,
            secs, current
        )
    }

    struct FailingSink;

    #[async_trait]
    impl AlertSink for FailingSink {
        async fn publish(&self, alerts: &[Alert]) -> Result<(), SinkError> {
            if alerts.is_empty() {
                return Ok(());
            }
            Err(SinkError::Io(std::io::Error::other("queue unavailable")))
        }

        fn sink_name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn replay_classifies_every_round() {
        let input = [line(0, 50.0), line(1, 85.0), line(2, 97.0), line(3, 10.0)].join("\n");
        let mut alerter = alerter();
        let sink = MemorySink::new();
        let metrics = AppMetrics::new().unwrap();

        let summary = run_replay(input.as_bytes(), &mut alerter, &sink, &metrics)
            .await
            .unwrap();

        assert_eq!(
            summary,
            ReplaySummary {
                processed: 4,
                skipped: 0,
                alerts: 3
            }
        );
        let severities: Vec<_> = sink.alerts().await.into_iter().map(|a| a.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Warning, Severity::Critical, Severity::Info]
        );
        assert!((metrics.tracked_entities.get() - 1.0).abs() < f64::EPSILON);
        assert!((metrics.rounds_processed_total.get() - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn malformed_and_blank_lines_are_skipped() {
        let input = format!("{}\n\nnot json\n{}\n", line(0, 90.0), line(1, 90.0));
        let mut alerter = alerter();
        let sink = MemorySink::new();
        let metrics = AppMetrics::new().unwrap();

        let summary = run_replay(input.as_bytes(), &mut alerter, &sink, &metrics)
            .await
            .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(sink.alerts().await.len(), 1);
        assert!((metrics.rounds_skipped_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn inconsistent_round_is_skipped() {
        let bad = r#"{"parent_id":"infra","entity_id":"host-1","entity_name":"host one","kind":"system","metric":"system_cpu_usage","timestamp":"2026-01-01T00:00:00Z","sample":{"type":"flag","active":true}}"#;
        let mut alerter = alerter();
        let sink = MemorySink::new();
        let metrics = AppMetrics::new().unwrap();

        let summary = run_replay(bad.as_bytes(), &mut alerter, &sink, &metrics)
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test]
    async fn sink_failure_stops_the_replay() {
        let input = [line(0, 50.0), line(1, 97.0), line(2, 97.0)].join("\n");
        let mut alerter = alerter();
        let metrics = AppMetrics::new().unwrap();

        let err = run_replay(input.as_bytes(), &mut alerter, &FailingSink, &metrics)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Sink(_)));
        assert!((metrics.rounds_processed_total.get() - 1.0).abs() < f64::EPSILON);
    }
}
