//! Error types for stack orchestration.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, declaring or provisioning a stack.
#[derive(Error, Debug)]
pub enum StackError {
    /// The build working directory does not exist.
    #[error("Build working directory not found: {0}")]
    MissingWorkingDir(PathBuf),

    /// The build tool could not be started.
    #[error("Failed to start build command `{command}`: {source}")]
    BuildSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The build tool exited unsuccessfully.
    #[error("Build command `{command}` failed ({status})")]
    BuildFailed { command: String, status: String },

    /// The adapter source file is missing.
    #[error("Adapter source not found: {0}")]
    AdapterMissing(PathBuf),

    /// The adapter does not export the configured entry point.
    #[error("Adapter {path} does not export `{export}`")]
    AdapterExportMissing { path: PathBuf, export: String },

    /// A directory the build was expected to produce is missing.
    #[error("Build output not found: {0}")]
    ArtifactMissing(PathBuf),

    /// Filesystem error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid CDN path pattern.
    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPathPattern { pattern: String, reason: String },

    /// The resource graph is inconsistent.
    #[error("Template error: {0}")]
    Template(String),

    /// The provisioning engine rejected the stack.
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// The asset upload or cache invalidation was rejected.
    #[error("Asset reconciliation failed: {0}")]
    Reconciliation(String),

    /// Deployment outputs are missing or malformed.
    #[error("Output error: {0}")]
    Output(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Broad failure classes reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The external build tool failed or could not start.
    Build,
    /// Adapter or build output missing or misplaced.
    Layout,
    /// Invalid configuration or resource graph.
    Config,
    /// The provisioning engine rejected a declaration.
    Provisioning,
    /// Asset upload or invalidation rejected.
    Reconciliation,
    /// Outputs could not be derived.
    Output,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build failure"),
            Self::Layout => write!(f, "filesystem layout failure"),
            Self::Config => write!(f, "configuration failure"),
            Self::Provisioning => write!(f, "provisioning failure"),
            Self::Reconciliation => write!(f, "reconciliation failure"),
            Self::Output => write!(f, "output failure"),
        }
    }
}

impl StackError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingWorkingDir(_) | Self::BuildSpawn { .. } | Self::BuildFailed { .. } => {
                ErrorKind::Build
            }
            Self::AdapterMissing(_)
            | Self::AdapterExportMissing { .. }
            | Self::ArtifactMissing(_)
            | Self::Io { .. } => ErrorKind::Layout,
            Self::Config(_)
            | Self::InvalidPathPattern { .. }
            | Self::Template(_)
            | Self::Serialization(_) => ErrorKind::Config,
            Self::Provisioning(_) => ErrorKind::Provisioning,
            Self::Reconciliation(_) => ErrorKind::Reconciliation,
            Self::Output(_) => ErrorKind::Output,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for StackError {
    fn from(e: serde_json::Error) -> Self {
        StackError::Serialization(e.to_string())
    }
}

/// Result alias for stack operations.
pub type Result<T> = std::result::Result<T, StackError>;
