//! Alert delivery interface.
//!
//! The engine never performs I/O: alerters hand the alerts produced for
//! one monitoring round to an [`AlertSink`] and only treat the round as
//! processed once `publish` succeeded.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::alerts::types::Alert;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write alert: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for classified alerts (a queue, a channel, a file).
#[async_trait]
pub trait AlertSink {
    /// Hand over every alert produced for one round.
    async fn publish(&self, alerts: &[Alert]) -> Result<(), SinkError>;

    /// Name of this sink for logging.
    fn sink_name(&self) -> &str;
}

/// Keeps published alerts in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }
}

#[async_trait]
impl AlertSink for MemorySink {
    async fn publish(&self, alerts: &[Alert]) -> Result<(), SinkError> {
        self.alerts.lock().await.extend_from_slice(alerts);
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "memory"
    }
}

/// Writes each alert as one JSON line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> AlertSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn publish(&self, alerts: &[Alert]) -> Result<(), SinkError> {
        if alerts.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for alert in alerts {
            serde_json::to_writer(&mut buf, alert)?;
            buf.push(b'\n');
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "json-lines"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::types::Severity;
    use crate::engine::codes::{MetricCode, SystemMetric};
    use chrono::DateTime;

    fn alert(code: &str) -> Alert {
        Alert {
            alert_code: code.to_string(),
            metric: MetricCode::System(SystemMetric::CpuUsage),
            message: "host-1: system cpu usage raised.".to_string(),
            severity: Severity::Warning,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            parent_id: "infra".to_string(),
            origin_id: "host-1".to_string(),
        }
    }

    #[tokio::test]
    async fn memory_sink_accumulates_alerts() {
        let sink = MemorySink::new();
        sink.publish(&[alert("a")]).await.unwrap();
        sink.publish(&[alert("b"), alert("c")]).await.unwrap();

        let codes: Vec<_> = sink.alerts().await.into_iter().map(|a| a.alert_code).collect();
        assert_eq!(codes, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn json_lines_sink_writes_one_line_per_alert() {
        let sink = JsonLinesSink::new(Vec::<u8>::new());
        sink.publish(&[alert("a"), alert("b")]).await.unwrap();
        sink.publish(&[]).await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Alert = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, alert("a"));
        assert!(lines[1].contains("\"severity\":\"WARNING\""));
        assert!(lines[1].contains("\"metric\":\"system_cpu_usage\""));
    }
}
