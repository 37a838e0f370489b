//! Build the application and prepare its bundles.

use anyhow::Result;
use serde_json::json;
use ssr_stack::resources::StackOutputs;
use ssr_stack::{Asset, Orchestrator, PreparedArtifact, Provisioner, WrittenAssembly};

use super::BuildArgs;
use crate::context::Context;
use crate::output::{format_bytes, StepReporter};

/// Stands in for the engine when only local steps run.
pub(crate) struct Offline;

impl Provisioner for Offline {
    fn describe(&self) -> String {
        "offline".to_string()
    }

    fn provision(&self, _assembly: &WrittenAssembly) -> ssr_stack::Result<StackOutputs> {
        Ok(StackOutputs::new())
    }
}

/// Run the build command.
pub async fn run(args: BuildArgs, ctx: &Context) -> Result<()> {
    let config = super::checked_config(ctx, None)?;
    let build = super::build_step(&config, args.no_build);
    let reporter = StepReporter::new(&ctx.output);

    ctx.output.header(&format!("Building {}", config.app.name));
    ctx.output.kv("Command", &build.describe());

    let orchestrator = Orchestrator::new(config, build.as_ref(), &Offline).with_observer(&reporter);
    let prepared = orchestrator.prepare()?;

    if ctx.output.is_json() {
        ctx.output.json(&summary_json(&prepared));
        return Ok(());
    }

    ctx.output.success("Bundles ready");
    print_asset(ctx, "Server", &prepared.server);
    print_asset(ctx, "Public", &prepared.public);
    ctx.output.kv("Adapter", &prepared.adapter_path.display().to_string());
    ctx.output.kv("Handler", &prepared.entry_point.handler());

    Ok(())
}

fn print_asset(ctx: &Context, label: &str, asset: &Asset) {
    ctx.output.kv(
        label,
        &format!(
            "{} ({} files, {}) {}",
            asset.short_hash(),
            asset.file_count,
            format_bytes(asset.total_bytes),
            asset.path.display()
        ),
    );
}

fn summary_json(prepared: &PreparedArtifact) -> serde_json::Value {
    json!({
        "server": prepared.server,
        "public": prepared.public,
        "adapter": prepared.adapter_path,
        "handler": prepared.entry_point.handler(),
    })
}
