//! Build, synthesize and provision the stack.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use dialoguer::Confirm;
use serde::{Deserialize, Serialize};
use ssr_observability::{RunMetrics, StepMetricsCollector};
use ssr_stack::{generate_run_id, DeploymentOutcome, Orchestrator, Provisioner, StackError};
use tracing::warn;

use super::build::Offline;
use super::DeployArgs;
use crate::context::Context;
use crate::output::StepReporter;

/// Run the deploy command.
pub async fn run(args: DeployArgs, ctx: &Context) -> Result<()> {
    let environment = args.env.clone().unwrap_or_else(|| "default".to_string());
    // Rejected before the prompt so nothing is built or published
    let config = super::checked_config(ctx, args.env.as_deref())?;

    ctx.output.header(&format!("Deploying {}", config.provisioner.stack_name));

    let build = super::build_step(&config, args.no_build);
    let provisioner = ctx.provisioner(&config);
    let run_id = generate_run_id();

    ctx.output.kv("Application", &config.app.name);
    ctx.output.kv("Environment", &environment);
    ctx.output.kv("Region", &config.provisioner.region);
    ctx.output.kv("Build", &build.describe());
    ctx.output.kv("Engine", &provisioner.describe());
    ctx.output.kv("Run", &run_id);

    if !args.yes && !args.dry_run {
        ctx.output.info("");
        let confirmed = Confirm::new()
            .with_prompt("Proceed with deployment?")
            .default(true)
            .interact()?;

        if !confirmed {
            ctx.output.warn("Deployment cancelled");
            return Ok(());
        }
    }

    let stack_name = config.provisioner.stack_name.clone();
    let reporter = StepReporter::new(&ctx.output);

    if args.dry_run {
        let orchestrator = Orchestrator::new(config, build.as_ref(), &Offline)
            .with_observer(&reporter)
            .with_run_id(run_id);
        let prepared = orchestrator.prepare()?;
        let stack = orchestrator.declare(&prepared)?;
        let written = orchestrator.synth(&stack)?;

        ctx.output.success("Dry run completed, nothing was provisioned");
        ctx.output.kv("Template", &written.template_path.display().to_string());
        return Ok(());
    }

    let collector = StepMetricsCollector::new(run_id.clone());
    let observer = (reporter, &collector);
    let result = Orchestrator::new(config, build.as_ref(), &provisioner)
        .with_observer(&observer)
        .with_run_id(run_id.clone())
        .run();

    let metrics = collector.snapshot();
    if let Some(failed) = metrics.failed_step() {
        warn!(step = %failed.step, run = %run_id, "deployment stopped");
    }
    let record = DeploymentRecord::new(run_id, environment, stack_name, &result, metrics);
    let record_path = save_deployment_record(&record, ctx)?;
    ctx.output
        .debug(&format!("Saved deployment record: {}", record_path.display()));

    let outcome = result?;

    if ctx.output.is_json() {
        ctx.output.json(&outcome);
        return Ok(());
    }

    ctx.output.success("Deployment successful!");
    ctx.output.kv("Stack", &outcome.stack_name);
    ctx.output.kv("Function version", &outcome.function_version.to_string());
    ctx.output.kv("Resources", &outcome.resource_count.to_string());
    ctx.output.kv("URL", &outcome.url);

    Ok(())
}

/// Record of one deployment attempt.
#[derive(Debug, Serialize, Deserialize)]
struct DeploymentRecord {
    run_id: String,
    environment: String,
    timestamp: String,
    stack: String,
    url: Option<String>,
    status: String,
    metrics: RunMetrics,
    error: Option<String>,
}

impl DeploymentRecord {
    fn new(
        run_id: String,
        environment: String,
        stack: String,
        result: &Result<DeploymentOutcome, StackError>,
        metrics: RunMetrics,
    ) -> Self {
        let (url, status, error) = match result {
            Ok(outcome) => (Some(outcome.url.clone()), "succeeded".to_string(), None),
            Err(e) => (None, e.kind().to_string(), Some(e.to_string())),
        };

        Self {
            run_id,
            environment,
            timestamp: Utc::now().to_rfc3339(),
            stack,
            url,
            status,
            metrics,
            error,
        }
    }
}

fn save_deployment_record(record: &DeploymentRecord, ctx: &Context) -> Result<PathBuf> {
    let deployments_dir = ctx.deployments_dir();
    std::fs::create_dir_all(&deployments_dir)?;

    let filename = format!("{}-{}.json", record.environment, record.run_id);
    let path = deployments_dir.join(filename);

    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&path, json)?;

    Ok(path)
}
