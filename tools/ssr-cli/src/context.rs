//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use ssr_stack::{CommandProvisioner, StackConfig};
use tracing::debug;

use crate::config::find_config_file;
use crate::output::Output;

/// Execution context for CLI commands.
pub struct Context {
    /// Stack configuration.
    pub config: StackConfig,
    /// Config file the configuration was loaded from.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
}

impl Context {
    /// Load context from config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let config_path = match config_path {
            Some(path) => Some(resolve_path(&cwd, path)),
            // Try to find config in current directory or parent directories
            None => find_config_file(&cwd),
        };

        let config = match config_path {
            Some(ref path) => StackConfig::load(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => StackConfig {
                base_dir: cwd.clone(),
                ..StackConfig::default()
            },
        };

        debug!(
            config = ?config_path,
            base_dir = %config.base_dir.display(),
            "configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
            output,
            cwd,
        })
    }

    /// Config with an environment's overrides applied.
    pub fn stack_config(&self, env: Option<&str>) -> Result<StackConfig> {
        match env {
            Some(env) => Ok(self.config.for_environment(env)?),
            None => Ok(self.config.clone()),
        }
    }

    /// Provisioner for a resolved config.
    pub fn provisioner(&self, config: &StackConfig) -> CommandProvisioner {
        CommandProvisioner::from_config(
            &config.provisioner,
            ssr_stack::engine_working_dir(&config.base_dir),
        )
    }

    /// Directory holding deployment records.
    pub fn deployments_dir(&self) -> PathBuf {
        self.config.base_dir.join(".ssr").join("deployments")
    }
}

/// Resolve a path relative to the working directory.
pub fn resolve_path(cwd: &Path, path: &str) -> PathBuf {
    if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        cwd.join(path)
    }
}
