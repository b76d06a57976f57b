use thiserror::Error;

use crate::alerts::SinkError;
use crate::config::ConfigError;
use crate::engine::codes::{ClassifierKind, MetricCode};
use crate::engine::EngineError;

/// Unified application error.
///
/// Every layer (configuration, classification, delivery, input) reports
/// through this type so the binary can log one line and exit.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Input error: {0}")]
    Input(#[from] std::io::Error),

    #[error("Metric {metric} ({classifier:?}) cannot be classified from a {sample} sample")]
    SampleMismatch {
        metric: MetricCode,
        classifier: ClassifierKind,
        sample: &'static str,
    },
}
