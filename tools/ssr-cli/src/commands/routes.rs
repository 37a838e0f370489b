//! Show which behavior serves each request path.

use anyhow::Result;
use serde_json::json;
use ssr_stack::resources::{build_routing, EdgeFunction, ORIGIN_ID};

use super::RoutesArgs;
use crate::context::Context;

/// Run the routes command.
pub async fn run(args: RoutesArgs, ctx: &Context) -> Result<()> {
    let config = ctx.stack_config(args.env.as_deref())?;
    let routing = build_routing(&config.distribution, ORIGIN_ID, EdgeFunction::pending_version())?;

    if ctx.output.is_json() {
        let routes: Vec<_> = args
            .paths
            .iter()
            .map(|path| {
                let route = routing.resolve(path);
                json!({
                    "path": path,
                    "pattern": route.pattern.map(|p| p.as_str()),
                    "origin": route.behavior.origin,
                    "function": route.behavior.invokes_function(),
                })
            })
            .collect();
        ctx.output.json(&routes);
        return Ok(());
    }

    ctx.output.header("Routes");
    let widths = [32, 16, 16];
    ctx.output.table_row(&["PATH", "PATTERN", "SERVED BY"], &widths);
    for path in &args.paths {
        let route = routing.resolve(path);
        let pattern = route.pattern.map_or("(default)", |p| p.as_str());
        let served_by = if route.behavior.invokes_function() {
            format!("function ({})", config.distribution.event_type)
        } else {
            "bucket".to_string()
        };
        ctx.output
            .table_row(&[path.as_str(), pattern, served_by.as_str()], &widths);
    }

    Ok(())
}
