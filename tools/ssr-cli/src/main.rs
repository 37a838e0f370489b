//! SSR CLI - Deploy server-rendered applications behind a CDN with an edge function.
//!
//! Commands:
//! - `ssr init` - Create `ssr.toml` and the handler adapter
//! - `ssr build` - Build the application and prepare its bundles
//! - `ssr synth` - Synthesize the stack template
//! - `ssr diff` - Compare a fresh synthesis with the last written template
//! - `ssr routes` - Show which behavior serves a request path
//! - `ssr deploy` - Build, synthesize and provision the stack
//! - `ssr config` - Manage configuration

mod commands;
mod config;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ssr_observability::LogFormat;

use commands::{BuildArgs, ConfigArgs, DeployArgs, DiffArgs, InitArgs, RoutesArgs, SynthArgs};

/// SSR CLI - Deploy server-rendered applications to the edge
#[derive(Parser)]
#[command(name = "ssr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create ssr.toml and the handler adapter
    Init(InitArgs),

    /// Build the application and prepare its bundles
    Build(BuildArgs),

    /// Synthesize the stack template and asset manifest
    Synth(SynthArgs),

    /// Compare a fresh synthesis with the last written template
    Diff(DiffArgs),

    /// Show which behavior serves each request path
    Routes(RoutesArgs),

    /// Build, synthesize and provision the stack
    Deploy(DeployArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; JSON mode keeps them machine readable too
    let format = if cli.json { LogFormat::Json } else { LogFormat::Human };
    if let Err(e) = ssr_observability::init(ssr_observability::default_directive(cli.verbose), format) {
        eprintln!("{}", e);
    }

    // Setup output formatting
    let output = output::Output::new(cli.verbose, cli.json);

    // Load config
    let config_path = cli.config.as_deref();
    let ctx = context::Context::load(config_path, output)?;

    // Execute command
    let result = match cli.command {
        Commands::Init(args) => commands::init::run(args, &ctx).await,
        Commands::Build(args) => commands::build::run(args, &ctx).await,
        Commands::Synth(args) => commands::synth::run(args, &ctx).await,
        Commands::Diff(args) => commands::diff::run(args, &ctx).await,
        Commands::Routes(args) => commands::routes::run(args, &ctx).await,
        Commands::Deploy(args) => commands::deploy::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
