//! # netledger telemetry
//!
//! Logging initialization, lifecycle event logging and Prometheus metrics.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
