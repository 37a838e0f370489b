//! Phase 1: build the application and prepare its bundles.
//!
//! Everything here touches the local filesystem or spawns processes, and
//! must complete before any resource is declared.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use regex::Regex;
use tracing::{debug, info};

use crate::asset::Asset;
use crate::config::{BuildConfig, EntryPoint, StackConfig};
use crate::error::{Result, StackError};

/// External build step.
pub trait BuildStep {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Run the build in `working_dir`, blocking until it finishes.
    fn run(&self, working_dir: &Path) -> Result<()>;
}

/// Build step that runs a command.
#[derive(Debug, Clone)]
pub struct CommandBuild {
    program: String,
    args: Vec<String>,
    stream_output: bool,
}

impl CommandBuild {
    /// Create a build step for a program and arguments.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            stream_output: true,
        }
    }

    /// Create from the build config.
    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    /// Whether the build's stdout/stderr are passed through (default: true).
    pub fn stream_output(mut self, stream: bool) -> Self {
        self.stream_output = stream;
        self
    }
}

impl BuildStep for CommandBuild {
    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    fn run(&self, working_dir: &Path) -> Result<()> {
        if !working_dir.is_dir() {
            return Err(StackError::MissingWorkingDir(working_dir.to_path_buf()));
        }

        let (stdout, stderr) = if self.stream_output {
            (Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::null())
        };

        debug!(command = %self.describe(), dir = %working_dir.display(), "running build");
        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|source| StackError::BuildSpawn {
                command: self.describe(),
                source,
            })?;

        if !status.success() {
            return Err(StackError::BuildFailed {
                command: self.describe(),
                status: status.to_string(),
            });
        }

        Ok(())
    }
}

/// Build step that reuses existing build output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipBuild;

impl BuildStep for SkipBuild {
    fn describe(&self) -> String {
        "skipped".to_string()
    }

    fn run(&self, _working_dir: &Path) -> Result<()> {
        Ok(())
    }
}

/// Build output on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    /// Server bundle (function code).
    pub server_dir: PathBuf,
    /// Public bundle (static assets).
    pub public_dir: PathBuf,
}

impl BuildArtifact {
    /// Locate the artifact described by the config.
    pub fn locate(config: &StackConfig) -> Self {
        Self {
            server_dir: config.server_dir(),
            public_dir: config.public_dir(),
        }
    }

    /// Check that the build produced the expected layout.
    pub fn validate(&self) -> Result<()> {
        if !self.server_dir.is_dir() {
            return Err(StackError::ArtifactMissing(self.server_dir.clone()));
        }
        if !self.public_dir.is_dir() {
            return Err(StackError::ArtifactMissing(self.public_dir.clone()));
        }
        Ok(())
    }
}

/// Check whether JavaScript source exports a symbol.
pub fn exports_symbol(source: &str, export: &str) -> bool {
    let name = regex::escape(export);
    let patterns = [
        format!(r"export\s+(async\s+)?function\s*\*?\s*{name}\s*\("),
        format!(r"export\s+(const|let|var)\s+{name}\b"),
        format!(r"export\s*\{{[^}}]*\b{name}\b[^}}]*\}}"),
        format!(r"(module\.)?exports\.{name}\s*="),
    ];

    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .any(|re| re.is_match(source))
}

/// Copy the handler adapter into the server bundle.
///
/// The file is copied byte-for-byte to `<server_dir>/<entry file name>`,
/// replacing any existing file. Returns the destination path.
pub fn inject_adapter(source: &Path, server_dir: &Path, entry: &EntryPoint) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(StackError::AdapterMissing(source.to_path_buf()));
    }
    if !server_dir.is_dir() {
        return Err(StackError::ArtifactMissing(server_dir.to_path_buf()));
    }

    let content = std::fs::read(source).map_err(|e| StackError::io(source, e))?;
    if !exports_symbol(&String::from_utf8_lossy(&content), &entry.export) {
        return Err(StackError::AdapterExportMissing {
            path: source.to_path_buf(),
            export: entry.export.clone(),
        });
    }

    let dest = server_dir.join(entry.file_name());
    std::fs::write(&dest, &content).map_err(|e| StackError::io(&dest, e))?;

    info!(dest = %dest.display(), handler = %entry.handler(), "adapter injected");
    Ok(dest)
}

/// Output of phase 1, ready for declaration.
#[derive(Debug, Clone)]
pub struct PreparedArtifact {
    /// Build output locations.
    pub artifact: BuildArtifact,
    /// Injected adapter path.
    pub adapter_path: PathBuf,
    /// Entry point the adapter provides.
    pub entry_point: EntryPoint,
    /// Server bundle asset (function code).
    pub server: Asset,
    /// Public bundle asset (deployment source).
    pub public: Asset,
}

impl PreparedArtifact {
    /// Hash the bundles of an artifact whose adapter is already injected.
    pub fn from_artifact(
        artifact: BuildArtifact,
        adapter_path: PathBuf,
        entry_point: EntryPoint,
    ) -> Result<Self> {
        artifact.validate()?;
        let server = Asset::from_dir(&artifact.server_dir)?;
        let public = Asset::from_dir(&artifact.public_dir)?;

        Ok(Self {
            artifact,
            adapter_path,
            entry_point,
            server,
            public,
        })
    }
}
