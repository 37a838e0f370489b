//! Observability for the serverless SSR orchestrator.
//!
//! This crate provides:
//! - `init` - tracing subscriber setup with human or JSON output
//! - `StepMetricsCollector` - per-step timings recorded through `StepObserver`

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;
