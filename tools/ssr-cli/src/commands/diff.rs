//! Compare a fresh synthesis with the last written template.

use anyhow::{Context as _, Result};
use serde_json::json;
use ssr_stack::{Orchestrator, Template, TemplateDiff, TEMPLATE_FILE};

use super::build::Offline;
use super::DiffArgs;
use crate::context::Context;
use crate::output::StepReporter;

/// Run the diff command.
pub async fn run(args: DiffArgs, ctx: &Context) -> Result<()> {
    let config = super::checked_config(ctx, args.env.as_deref())?;
    let previous_path = config.out_dir().join(TEMPLATE_FILE);
    let build = super::build_step(&config, args.no_build);
    let reporter = StepReporter::new(&ctx.output);

    ctx.output.header(&format!("Diff for {}", config.provisioner.stack_name));

    let previous = if previous_path.is_file() {
        Template::read(&previous_path)
            .with_context(|| format!("Failed to read {}", previous_path.display()))?
    } else {
        ctx.output
            .warn("No previous template found, every resource will show as added");
        Template::new()
    };

    // Declaration only; the previous template stays on disk untouched
    let orchestrator = Orchestrator::new(config, build.as_ref(), &Offline).with_observer(&reporter);
    let prepared = orchestrator.prepare()?;
    let stack = orchestrator.declare(&prepared)?;
    let current = stack.template()?;

    let diff = TemplateDiff::between(&previous, &current);

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "added": diff.added,
            "removed": diff.removed,
            "modified": diff.modified,
        }));
        return Ok(());
    }

    if diff.is_empty() {
        ctx.output.success("No resource changes");
        return Ok(());
    }

    ctx.output.info("");
    for id in &diff.added {
        ctx.output.list_item(&format!("{} {}", console::style("+").green(), id));
    }
    for id in &diff.modified {
        ctx.output.list_item(&format!("{} {}", console::style("~").yellow(), id));
    }
    for id in &diff.removed {
        ctx.output.list_item(&format!("{} {}", console::style("-").red(), id));
    }
    ctx.output.info("");
    ctx.output.info(&format!(
        "{} added, {} modified, {} removed",
        diff.added.len(),
        diff.modified.len(),
        diff.removed.len()
    ));

    Ok(())
}
