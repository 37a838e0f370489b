//! Initialize an application for deployment.

use anyhow::{bail, Result};

use super::InitArgs;
use crate::config::generate_default_config;
use crate::context::Context;

/// Handler adapter written next to the config.
const WRAPPER: &str = include_str!("../../static/wrapper.mjs");

/// Run the init command.
pub async fn run(args: InitArgs, ctx: &Context) -> Result<()> {
    let name = match args.name {
        Some(name) => name,
        None => ctx
            .cwd
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("my-app")
            .to_string(),
    };

    ctx.output.header(&format!("Initializing stack: {}", name));

    let config_path = ctx.cwd.join("ssr.toml");
    let wrapper_path = ctx.cwd.join("static").join("wrapper.mjs");

    if !args.force {
        for path in [&config_path, &wrapper_path] {
            if path.exists() {
                bail!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                );
            }
        }
    }

    ctx.output.step(1, 3, "Creating ssr.toml");
    std::fs::write(&config_path, generate_default_config(&name))?;

    ctx.output.step(2, 3, "Creating static/wrapper.mjs");
    std::fs::create_dir_all(ctx.cwd.join("static"))?;
    std::fs::write(&wrapper_path, WRAPPER)?;

    ctx.output.step(3, 3, "Done!");
    ctx.output.success(&format!("Stack '{}' initialized", name));
    ctx.output.info("");
    ctx.output.info("Next steps:");
    ctx.output.list_item("Check build.command and the bundle directories in ssr.toml");
    ctx.output.list_item("ssr build");
    ctx.output.list_item("ssr deploy");

    Ok(())
}
