// Library root: exposes the engine and the replay pipeline for integration
// tests in `tests/`. Production entry point remains `src/main.rs`.

pub mod alerter;
pub mod alerts;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod replay;

// Only needed by the binary. Declared pub so the binary can reach them
// through the library crate.
pub mod cli;
pub mod config;
pub mod logging;
