//! Alert records and their delivery interface.

pub mod sink;
pub mod types;

pub use sink::{AlertSink, JsonLinesSink, MemorySink, SinkError};
pub use types::{Alert, AlertConstructor, AlertTemplate, Observation, Severity, Trigger};
