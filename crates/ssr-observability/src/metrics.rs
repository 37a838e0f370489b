//! Per-step run metrics.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use ssr_stack::{PipelineStep, StackError, StepObserver};

/// Timing of a single pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Step name.
    pub step: String,
    /// One-based position in the pipeline.
    pub number: usize,
    /// Step duration (microseconds).
    pub duration_us: u64,
    /// Whether the step succeeded.
    pub success: bool,
    /// Failure class, if failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Error message, if failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metrics for a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Run id.
    pub run_id: String,
    /// Finished steps in execution order.
    pub steps: Vec<StepMetrics>,
    /// Total run duration (microseconds).
    pub total_duration_us: u64,
}

impl RunMetrics {
    /// Whether every recorded step succeeded.
    pub fn success(&self) -> bool {
        self.steps.iter().all(|s| s.success)
    }

    /// The step that failed, if any.
    pub fn failed_step(&self) -> Option<&StepMetrics> {
        self.steps.iter().find(|s| !s.success)
    }

    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&StepMetrics> {
        self.steps.iter().find(|s| s.step == name)
    }

    /// Format as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Format as JSON (pretty printed).
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Format as human-readable summary.
    pub fn to_summary(&self) -> String {
        let mut lines = vec![format!(
            "Run {}: {:.2}s",
            self.run_id,
            self.total_duration_us as f64 / 1_000_000.0
        )];

        for step in &self.steps {
            let status = if step.success { "ok" } else { "FAILED" };
            lines.push(format!(
                "  {}. {} [{}]: {:.2}ms",
                step.number,
                step.step,
                status,
                step.duration_us as f64 / 1000.0
            ));
            if let Some(ref error) = step.error {
                lines.push(format!("     {}", error));
            }
        }

        lines.join("\n")
    }
}

/// Records step timings as they are reported.
#[derive(Debug)]
pub struct StepMetricsCollector {
    run_id: String,
    start: Instant,
    steps: Mutex<Vec<StepMetrics>>,
}

impl StepMetricsCollector {
    /// Create a collector for a run.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            start: Instant::now(),
            steps: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, step: PipelineStep, elapsed: Duration, error: Option<&StackError>) {
        let metrics = StepMetrics {
            step: step.name().to_string(),
            number: step.number(),
            duration_us: elapsed.as_micros() as u64,
            success: error.is_none(),
            error_kind: error.map(|e| e.kind().to_string()),
            error: error.map(|e| e.to_string()),
        };
        // A poisoned lock still holds every step recorded before the panic.
        let mut steps = match self.steps.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        steps.push(metrics);
    }

    /// Metrics recorded so far.
    pub fn snapshot(&self) -> RunMetrics {
        let steps = match self.steps.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        RunMetrics {
            run_id: self.run_id.clone(),
            steps,
            total_duration_us: self.start.elapsed().as_micros() as u64,
        }
    }

    /// Finalize and return the metrics.
    pub fn finalize(self) -> RunMetrics {
        self.snapshot()
    }
}

impl StepObserver for StepMetricsCollector {
    fn on_step_start(&self, step: PipelineStep) {
        tracing::trace!(step = step.name(), "step started");
    }

    fn on_step_complete(&self, step: PipelineStep, elapsed: Duration) {
        self.record(step, elapsed, None);
    }

    fn on_step_failed(&self, step: PipelineStep, elapsed: Duration, error: &StackError) {
        self.record(step, elapsed, Some(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_records_steps_in_order() {
        let collector = StepMetricsCollector::new("run-1");
        collector.on_step_start(PipelineStep::Build);
        collector.on_step_complete(PipelineStep::Build, Duration::from_millis(1500));
        collector.on_step_start(PipelineStep::InjectAdapter);
        collector.on_step_failed(
            PipelineStep::InjectAdapter,
            Duration::from_micros(40),
            &StackError::ArtifactMissing(PathBuf::from(".output/server")),
        );

        let metrics = collector.finalize();
        assert_eq!(metrics.run_id, "run-1");
        assert_eq!(metrics.steps.len(), 2);
        assert_eq!(metrics.step("build").unwrap().duration_us, 1_500_000);
        assert!(!metrics.success());

        let failed = metrics.failed_step().unwrap();
        assert_eq!(failed.step, "inject_adapter");
        assert_eq!(failed.number, 2);
        assert_eq!(failed.error_kind.as_deref(), Some("filesystem layout failure"));
    }

    #[test]
    fn test_summary_and_json() {
        let collector = StepMetricsCollector::new("run-2");
        collector.on_step_complete(PipelineStep::Synthesize, Duration::from_millis(3));
        let metrics = collector.snapshot();

        assert!(metrics.success());
        let summary = metrics.to_summary();
        assert!(summary.starts_with("Run run-2"));
        assert!(summary.contains("5. synthesize [ok]: 3.00ms"));

        let parsed: RunMetrics = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed, metrics);
        assert!(!metrics.to_json().contains("error"));
    }

    #[test]
    fn test_collector_as_observer_pair() {
        let a = StepMetricsCollector::new("a");
        let b = StepMetricsCollector::new("b");
        let both = (&a, &b);
        both.on_step_complete(PipelineStep::Provision, Duration::from_secs(1));
        assert_eq!(a.snapshot().steps.len(), 1);
        assert_eq!(b.snapshot().steps.len(), 1);
    }
}
