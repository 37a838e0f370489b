//! CLI command implementations.

pub mod build;
pub mod config;
pub mod deploy;
pub mod diff;
pub mod init;
pub mod routes;
pub mod synth;

use clap::{Args, Subcommand};

/// Arguments for the init command.
#[derive(Args)]
pub struct InitArgs {
    /// Application name (default: current directory name).
    pub name: Option<String>,

    /// Overwrite existing files.
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the build command.
#[derive(Args)]
pub struct BuildArgs {
    /// Reuse existing build output instead of running the build command.
    #[arg(long)]
    pub no_build: bool,
}

/// Arguments for the synth command.
#[derive(Args)]
pub struct SynthArgs {
    /// Environment to synthesize.
    #[arg(short, long)]
    pub env: Option<String>,

    /// Reuse existing build output instead of running the build command.
    #[arg(long)]
    pub no_build: bool,

    /// Output directory (default: provisioner.out_dir).
    #[arg(short, long)]
    pub out: Option<String>,
}

/// Arguments for the diff command.
#[derive(Args)]
pub struct DiffArgs {
    /// Environment to compare.
    #[arg(short, long)]
    pub env: Option<String>,

    /// Reuse existing build output instead of running the build command.
    #[arg(long)]
    pub no_build: bool,
}

/// Arguments for the routes command.
#[derive(Args)]
pub struct RoutesArgs {
    /// Request paths to resolve.
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Environment whose routing to use.
    #[arg(short, long)]
    pub env: Option<String>,
}

/// Arguments for the deploy command.
#[derive(Args)]
pub struct DeployArgs {
    /// Environment to deploy to.
    #[arg(short, long)]
    pub env: Option<String>,

    /// Reuse existing build output instead of running the build command.
    #[arg(long)]
    pub no_build: bool,

    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run (synthesize but don't provision).
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Get a config value.
    Get {
        /// Config key (dot-separated).
        key: String,
    },
    /// Set a config value.
    Set {
        /// Config key (dot-separated).
        key: String,
        /// Value to set.
        value: String,
    },
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}

/// Resolve an environment's config, refusing configs with validation errors.
///
/// Warnings are printed and do not stop the command.
pub fn checked_config(
    ctx: &crate::context::Context,
    env: Option<&str>,
) -> anyhow::Result<ssr_stack::StackConfig> {
    let config = ctx.stack_config(env)?;
    let report = config.validate();
    for warning in &report.warnings {
        ctx.output.warn(warning);
    }
    if !report.is_valid() {
        for error in &report.errors {
            ctx.output.error(error);
        }
        anyhow::bail!(
            "Configuration has {} error(s); run `ssr config validate`",
            report.errors.len()
        );
    }
    Ok(config)
}

/// Build step for the command flags.
pub fn build_step(config: &ssr_stack::StackConfig, no_build: bool) -> Box<dyn ssr_stack::BuildStep> {
    if no_build {
        Box::new(ssr_stack::SkipBuild)
    } else {
        Box::new(ssr_stack::CommandBuild::from_config(&config.build))
    }
}
