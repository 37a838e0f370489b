//! Synthesize the stack template and asset manifest.

use anyhow::Result;
use serde_json::json;
use ssr_stack::Orchestrator;

use super::build::Offline;
use super::SynthArgs;
use crate::context::{resolve_path, Context};
use crate::output::StepReporter;

/// Run the synth command.
pub async fn run(args: SynthArgs, ctx: &Context) -> Result<()> {
    let config = super::checked_config(ctx, args.env.as_deref())?;
    let build = super::build_step(&config, args.no_build);
    let reporter = StepReporter::new(&ctx.output);

    ctx.output.header(&format!("Synthesizing {}", config.provisioner.stack_name));

    let mut orchestrator =
        Orchestrator::new(config, build.as_ref(), &Offline).with_observer(&reporter);
    if let Some(out) = &args.out {
        orchestrator = orchestrator.with_out_dir(resolve_path(&ctx.cwd, out));
    }

    let prepared = orchestrator.prepare()?;
    let stack = orchestrator.declare(&prepared)?;
    let written = orchestrator.synth(&stack)?;
    let template = &written.assembly.template;

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "stack": written.assembly.stack_name,
            "run_id": orchestrator.run_id(),
            "template": written.template_path,
            "assets": written.assets_path,
            "resources": template.dependency_order()?,
        }));
        return Ok(());
    }

    ctx.output.success(&format!(
        "Synthesized {} resources",
        template.resources.len()
    ));
    ctx.output.info("");
    ctx.output.info("Resources (creation order):");
    for id in template.dependency_order()? {
        if let Some(resource) = template.get(&id) {
            ctx.output
                .table_row(&[id.as_str(), resource.resource_type.as_str()], &[44, 40]);
        }
    }

    ctx.output.info("");
    ctx.output.kv("Template", &written.template_path.display().to_string());
    ctx.output.kv("Assets", &written.assets_path.display().to_string());
    ctx.output.kv("Run", orchestrator.run_id());

    Ok(())
}
