//! Pipeline step tracking.

use std::fmt;
use std::time::Duration;

use crate::error::StackError;

/// Ordered steps of an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineStep {
    /// Run the external application build.
    Build,
    /// Copy the handler adapter into the server bundle.
    InjectAdapter,
    /// Hash the server and public bundles.
    HashAssets,
    /// Assemble the resource declarations.
    Declare,
    /// Write the template and asset manifest.
    Synthesize,
    /// Hand the assembly to the provisioning engine.
    Provision,
    /// Derive the distribution URL.
    EmitOutputs,
}

impl PipelineStep {
    /// All steps in execution order.
    pub const ALL: [PipelineStep; 7] = [
        Self::Build,
        Self::InjectAdapter,
        Self::HashAssets,
        Self::Declare,
        Self::Synthesize,
        Self::Provision,
        Self::EmitOutputs,
    ];

    /// One-based position in the pipeline.
    pub fn number(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0) + 1
    }

    /// Whether the step belongs to the local build phase.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Build | Self::InjectAdapter | Self::HashAssets)
    }

    /// Stable name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::InjectAdapter => "inject_adapter",
            Self::HashAssets => "hash_assets",
            Self::Declare => "declare",
            Self::Synthesize => "synthesize",
            Self::Provision => "provision",
            Self::EmitOutputs => "emit_outputs",
        }
    }

    /// Human-readable description.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Build => "Building application",
            Self::InjectAdapter => "Injecting handler adapter",
            Self::HashAssets => "Hashing bundles",
            Self::Declare => "Declaring resources",
            Self::Synthesize => "Synthesizing template",
            Self::Provision => "Provisioning stack",
            Self::EmitOutputs => "Resolving outputs",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Observer for pipeline step events.
pub trait StepObserver {
    /// Called before a step runs.
    fn on_step_start(&self, step: PipelineStep);

    /// Called after a step succeeds.
    fn on_step_complete(&self, step: PipelineStep, elapsed: Duration);

    /// Called when a step fails; the run stops afterwards.
    fn on_step_failed(&self, step: PipelineStep, elapsed: Duration, error: &StackError) {
        let _ = (step, elapsed, error);
    }
}

impl<T: StepObserver + ?Sized> StepObserver for &T {
    fn on_step_start(&self, step: PipelineStep) {
        (**self).on_step_start(step)
    }

    fn on_step_complete(&self, step: PipelineStep, elapsed: Duration) {
        (**self).on_step_complete(step, elapsed)
    }

    fn on_step_failed(&self, step: PipelineStep, elapsed: Duration, error: &StackError) {
        (**self).on_step_failed(step, elapsed, error)
    }
}

impl<A: StepObserver, B: StepObserver> StepObserver for (A, B) {
    fn on_step_start(&self, step: PipelineStep) {
        self.0.on_step_start(step);
        self.1.on_step_start(step);
    }

    fn on_step_complete(&self, step: PipelineStep, elapsed: Duration) {
        self.0.on_step_complete(step, elapsed);
        self.1.on_step_complete(step, elapsed);
    }

    fn on_step_failed(&self, step: PipelineStep, elapsed: Duration, error: &StackError) {
        self.0.on_step_failed(step, elapsed, error);
        self.1.on_step_failed(step, elapsed, error);
    }
}

/// Observer that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StepObserver for NoopObserver {
    fn on_step_start(&self, _step: PipelineStep) {}

    fn on_step_complete(&self, _step: PipelineStep, _elapsed: Duration) {}
}
