//! Observability setup for Parley: structured logging with an optional
//! OpenTelemetry bridge.

pub mod tracing_setup;
