//! Configuration management commands.

use anyhow::{bail, Context as _, Result};
use ssr_stack::{CommandSpec, StackConfig};

use super::{ConfigArgs, ConfigCommand};
use crate::config::{find_config_file, generate_default_config, get_config_value, set_config_value};
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx).await,
        ConfigCommand::Get { key } => get_config(&key, ctx).await,
        ConfigCommand::Set { key, value } => set_config(&key, &value, ctx).await,
        ConfigCommand::Init { force } => init_config(force, ctx).await,
        ConfigCommand::Validate => validate_config(ctx).await,
    }
}

fn command_line(spec: &CommandSpec) -> String {
    std::iter::once(spec.command.as_str())
        .chain(spec.args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

async fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    let config = &ctx.config;
    ctx.output.header("Current Configuration");
    if let Some(path) = &ctx.config_path {
        ctx.output.kv("file", &path.display().to_string());
    } else {
        ctx.output.warn("No config file found, showing defaults");
    }

    ctx.output.info("");
    ctx.output.info("[app]");
    ctx.output.kv("name", &config.app.name);
    ctx.output.kv("root", &config.app.root.display().to_string());

    ctx.output.info("");
    ctx.output.info("[build]");
    ctx.output.kv("command", &command_line(&CommandSpec {
        command: config.build.command.clone(),
        args: config.build.args.clone(),
    }));
    ctx.output.kv("server_dir", &config.build.server_dir.display().to_string());
    ctx.output.kv("public_dir", &config.build.public_dir.display().to_string());

    ctx.output.info("");
    ctx.output.info("[adapter]");
    ctx.output.kv("source", &config.adapter.source.display().to_string());
    ctx.output.kv("handler", &config.entry_point().handler());

    ctx.output.info("");
    ctx.output.info("[function]");
    ctx.output.kv("runtime", &config.function.runtime);
    ctx.output.kv("memory_mb", &config.function.memory_mb.to_string());
    ctx.output.kv("timeout_secs", &config.function.timeout_secs.to_string());

    ctx.output.info("");
    ctx.output.info("[bucket]");
    ctx.output.kv("removal_policy", &config.bucket.removal_policy.to_string());

    ctx.output.info("");
    ctx.output.info("[distribution]");
    ctx.output.kv("static_paths", &config.distribution.static_paths.join(", "));
    ctx.output.kv("event_type", config.distribution.event_type.as_str());
    ctx.output.kv("price_class", &config.distribution.price_class);

    ctx.output.info("");
    ctx.output.info("[deployment]");
    ctx.output.kv("invalidation_paths", &config.deployment.invalidation_paths.join(", "));
    ctx.output.kv("prune", &config.deployment.prune.to_string());

    ctx.output.info("");
    ctx.output.info("[provisioner]");
    ctx.output.kv("stack_name", &config.provisioner.stack_name);
    ctx.output.kv("region", &config.provisioner.region);
    ctx.output.kv("out_dir", &config.provisioner.out_dir.display().to_string());
    for step in &config.provisioner.steps {
        ctx.output.list_item(&command_line(step));
    }
    if let Some(outputs) = &config.provisioner.outputs {
        ctx.output.kv("outputs", &command_line(outputs));
    }
    if let Some(events) = &config.provisioner.events {
        ctx.output.kv("events", &command_line(events));
    }

    if !config.environments.is_empty() {
        ctx.output.info("");
        ctx.output.info("Environments:");
        for env in config.environments.keys() {
            ctx.output.list_item(env);
        }
    }

    Ok(())
}

async fn get_config(key: &str, ctx: &Context) -> Result<()> {
    let value = get_config_value(&ctx.config, key)?;

    if ctx.output.is_json() {
        println!(r#"{{"key": "{}", "value": {}}}"#, key, value);
    } else {
        println!("{}", value);
    }

    Ok(())
}

async fn set_config(key: &str, value: &str, ctx: &Context) -> Result<()> {
    let config_path = match &ctx.config_path {
        Some(path) => path.clone(),
        None => match find_config_file(&ctx.cwd) {
            Some(path) => path,
            None => bail!("No config file found. Run `ssr config init` first."),
        },
    };

    let mut config = StackConfig::load(&config_path)?;
    set_config_value(&mut config, key, value)?;

    let report = config.validate();
    if !report.is_valid() {
        bail!("Refusing to save invalid config: {}", report.errors.join("; "));
    }

    config
        .save(&config_path)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    ctx.output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

async fn init_config(force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.cwd.join("ssr.toml");

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let name = ctx
        .cwd
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("my-app")
        .to_string();

    std::fs::write(&config_path, generate_default_config(&name))?;

    ctx.output.success(&format!("Created: {}", config_path.display()));

    Ok(())
}

async fn validate_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Validating configuration");

    let report = ctx.config.validate();

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "valid": report.is_valid(),
            "errors": report.errors,
            "warnings": report.warnings,
        }));
    } else {
        for warning in &report.warnings {
            ctx.output.warn(warning);
        }
        for error in &report.errors {
            ctx.output.error(error);
        }
    }

    if !report.is_valid() {
        bail!("Configuration has {} error(s)", report.errors.len());
    }

    ctx.output.success("Configuration is valid");
    Ok(())
}
