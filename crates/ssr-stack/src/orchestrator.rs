//! Drives a deployment through every pipeline step in order.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::build::{inject_adapter, BuildArtifact, BuildStep, PreparedArtifact};
use crate::config::StackConfig;
use crate::error::Result;
use crate::lifecycle::{NoopObserver, PipelineStep, StepObserver};
use crate::provision::Provisioner;
use crate::resources::StackOutputs;
use crate::routing::FunctionVersionRef;
use crate::stack::{SsrStack, WrittenAssembly};

static NOOP: NoopObserver = NoopObserver;

/// Generate a run id from the current time.
pub fn generate_run_id() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string()
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    /// Run id recorded on the deployment resource.
    pub run_id: String,
    /// Stack name.
    pub stack_name: String,
    /// Public URL, `https://<domain>`.
    pub url: String,
    /// Raw outputs reported by the engine.
    pub outputs: StackOutputs,
    /// Function version the distribution routes to.
    pub function_version: FunctionVersionRef,
    /// Number of declared resources.
    pub resource_count: usize,
    /// Written template.
    pub template_path: PathBuf,
}

/// Runs build, declaration, synthesis and provisioning for one stack.
///
/// Steps run strictly in order and the first failure stops the run; later
/// steps, including provisioning, are never attempted.
pub struct Orchestrator<'a> {
    config: StackConfig,
    build: &'a dyn BuildStep,
    provisioner: &'a dyn Provisioner,
    observer: &'a dyn StepObserver,
    run_id: String,
    out_dir: PathBuf,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator for a resolved config.
    pub fn new(
        config: StackConfig,
        build: &'a dyn BuildStep,
        provisioner: &'a dyn Provisioner,
    ) -> Self {
        let out_dir = config.out_dir();
        Self {
            config,
            build,
            provisioner,
            observer: &NOOP,
            run_id: generate_run_id(),
            out_dir,
        }
    }

    /// Report step events to an observer.
    pub fn with_observer(mut self, observer: &'a dyn StepObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Use a fixed run id.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Write the assembly somewhere other than the configured directory.
    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self.config.provisioner.out_dir = self.out_dir.clone();
        self
    }

    /// Run id of this orchestrator.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Config in use.
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    fn step<T>(&self, step: PipelineStep, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let span = info_span!("step", name = step.name(), run = %self.run_id);
        let _enter = span.enter();

        self.observer.on_step_start(step);
        let start = Instant::now();
        match f() {
            Ok(value) => {
                self.observer.on_step_complete(step, start.elapsed());
                Ok(value)
            }
            Err(e) => {
                self.observer.on_step_failed(step, start.elapsed(), &e);
                Err(e)
            }
        }
    }

    /// Phase 1: build, inject the adapter and hash the bundles.
    ///
    /// A config with validation errors is rejected before the build runs.
    pub fn prepare(&self) -> Result<PreparedArtifact> {
        let report = self.config.ensure_valid()?;
        for warning in &report.warnings {
            warn!(run = %self.run_id, "{}", warning);
        }

        let app_root = self.config.app_root();
        self.step(PipelineStep::Build, || {
            info!(command = %self.build.describe(), "building application");
            self.build.run(&app_root)
        })?;

        let artifact = BuildArtifact::locate(&self.config);
        let entry_point = self.config.entry_point();
        let adapter_path = self.step(PipelineStep::InjectAdapter, || {
            inject_adapter(
                &self.config.adapter_source(),
                &artifact.server_dir,
                &entry_point,
            )
        })?;

        self.step(PipelineStep::HashAssets, || {
            let prepared = PreparedArtifact::from_artifact(artifact, adapter_path, entry_point)?;
            info!(
                server = prepared.server.short_hash(),
                public = prepared.public.short_hash(),
                files = prepared.server.file_count + prepared.public.file_count,
                "bundles hashed"
            );
            Ok(prepared)
        })
    }

    /// Phase 2: declare every resource.
    pub fn declare(&self, prepared: &PreparedArtifact) -> Result<SsrStack> {
        self.step(PipelineStep::Declare, || {
            SsrStack::declare(&self.config, prepared, &self.run_id)
        })
    }

    /// Synthesize the assembly into the output directory.
    pub fn synth(&self, stack: &SsrStack) -> Result<WrittenAssembly> {
        self.step(PipelineStep::Synthesize, || stack.synth()?.write(&self.out_dir))
    }

    /// Hand the assembly to the provisioning engine.
    pub fn provision(&self, assembly: &WrittenAssembly) -> Result<StackOutputs> {
        self.step(PipelineStep::Provision, || {
            info!(engine = %self.provisioner.describe(), stack = %assembly.assembly.stack_name, "provisioning stack");
            self.provisioner.provision(assembly)
        })
    }

    /// Derive the public URL from the engine's outputs.
    pub fn emit_outputs(&self, outputs: &StackOutputs) -> Result<String> {
        self.step(PipelineStep::EmitOutputs, || {
            let url = outputs.url()?;
            info!(url = %url, "stack deployed");
            Ok(url)
        })
    }

    /// Run every step.
    pub fn run(&self) -> Result<DeploymentOutcome> {
        let prepared = self.prepare()?;
        let stack = self.declare(&prepared)?;
        let assembly = self.synth(&stack)?;
        let outputs = self.provision(&assembly)?;
        let url = self.emit_outputs(&outputs)?;

        Ok(DeploymentOutcome {
            run_id: self.run_id.clone(),
            stack_name: stack.name().to_string(),
            url,
            outputs,
            function_version: stack.function().current_version(),
            resource_count: assembly.assembly.template.resources.len(),
            template_path: assembly.template_path,
        })
    }
}
