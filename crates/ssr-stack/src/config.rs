//! Stack configuration (`ssr.toml`).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};

/// Default CloudFormation stack name.
pub const DEFAULT_STACK_NAME: &str = "ServerlessSsrStack";

/// Full stack configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    /// Application metadata.
    #[serde(default)]
    pub app: AppConfig,

    /// External build invocation.
    #[serde(default)]
    pub build: BuildConfig,

    /// Handler adapter injected into the server bundle.
    #[serde(default)]
    pub adapter: AdapterConfig,

    /// Edge function settings.
    #[serde(default)]
    pub function: FunctionConfig,

    /// Origin bucket settings.
    #[serde(default)]
    pub bucket: BucketConfig,

    /// Distribution and routing settings.
    #[serde(default)]
    pub distribution: DistributionConfig,

    /// Asset deployment settings.
    #[serde(default)]
    pub deployment: DeploymentConfig,

    /// Provisioning engine contract.
    #[serde(default)]
    pub provisioner: ProvisionerConfig,

    /// Environment-specific overrides.
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,

    /// Directory relative paths are resolved against (the config file's directory).
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl StackConfig {
    /// Load config from a TOML or JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| StackError::io(path, e))?;

        let mut config: StackConfig = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| {
                StackError::Config(format!("failed to parse {}: {}", path.display(), e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                StackError::Config(format!("failed to parse {}: {}", path.display(), e))
            })?
        };

        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Save config to a TOML or JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self).map_err(|e| StackError::Serialization(e.to_string()))?
        };

        std::fs::write(path, content).map_err(|e| StackError::io(path, e))
    }

    /// Get the config with an environment's overrides applied.
    ///
    /// Unknown environments are a configuration error so that a typo never
    /// silently deploys the base settings.
    pub fn for_environment(&self, env: &str) -> Result<StackConfig> {
        let env_config = self.environments.get(env).ok_or_else(|| {
            StackError::Config(format!(
                "unknown environment '{}' (known: {})",
                env,
                self.environments
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        let mut config = self.clone();
        if let Some(ref function) = env_config.function {
            config.function = function.clone();
        }
        if let Some(ref bucket) = env_config.bucket {
            config.bucket = bucket.clone();
        }
        if let Some(ref distribution) = env_config.distribution {
            config.distribution = distribution.clone();
        }
        if let Some(ref provisioner) = env_config.provisioner {
            config.provisioner = provisioner.clone();
        }
        // Applied after the provisioner section, which replaces the base one whole
        if let Some(ref stack_name) = env_config.stack_name {
            config.provisioner.stack_name = stack_name.clone();
        }

        Ok(config)
    }

    /// Application root (build working directory).
    pub fn app_root(&self) -> PathBuf {
        resolve(&self.base_dir, &self.app.root)
    }

    /// Server bundle directory.
    pub fn server_dir(&self) -> PathBuf {
        resolve(&self.app_root(), &self.build.server_dir)
    }

    /// Public asset bundle directory.
    pub fn public_dir(&self) -> PathBuf {
        resolve(&self.app_root(), &self.build.public_dir)
    }

    /// Adapter source file.
    pub fn adapter_source(&self) -> PathBuf {
        resolve(&self.base_dir, &self.adapter.source)
    }

    /// Synthesis output directory.
    pub fn out_dir(&self) -> PathBuf {
        resolve(&self.base_dir, &self.provisioner.out_dir)
    }

    /// Entry point shared by the adapter injection and the function declaration.
    pub fn entry_point(&self) -> EntryPoint {
        self.adapter.entry_point()
    }

    /// Check the config for errors and suspicious values.
    pub fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        if self.app.name.is_empty() {
            report.errors.push("app.name is required".to_string());
        }
        if self.build.command.is_empty() {
            report.errors.push("build.command is required".to_string());
        }
        if !is_identifier(&self.adapter.module) {
            report.errors.push(format!(
                "adapter.module '{}' is not a valid module name",
                self.adapter.module
            ));
        }
        if !is_identifier(&self.adapter.export) {
            report.errors.push(format!(
                "adapter.export '{}' is not a valid identifier",
                self.adapter.export
            ));
        }
        if self.adapter.source.extension().is_none() {
            report
                .errors
                .push("adapter.source must have a file extension".to_string());
        }

        // Lambda@Edge limits
        let (max_memory, max_timeout) = match self.distribution.event_type {
            EdgeEventType::ViewerRequest | EdgeEventType::ViewerResponse => (128, 5),
            EdgeEventType::OriginRequest | EdgeEventType::OriginResponse => (10240, 30),
        };
        if !(128..=max_memory).contains(&self.function.memory_mb) {
            report.errors.push(format!(
                "function.memory_mb must be between 128 and {} for {} functions",
                max_memory, self.distribution.event_type
            ));
        }
        if self.function.timeout_secs == 0 || self.function.timeout_secs > max_timeout {
            report.errors.push(format!(
                "function.timeout_secs must be between 1 and {} for {} functions",
                max_timeout, self.distribution.event_type
            ));
        }
        if !self.function.runtime.starts_with("nodejs") && !self.function.runtime.starts_with("python") {
            report.warnings.push(format!(
                "function.runtime '{}' is not supported by Lambda@Edge",
                self.function.runtime
            ));
        }

        if self.distribution.static_paths.is_empty() {
            report.warnings.push(
                "distribution.static_paths is empty: every request will invoke the edge function"
                    .to_string(),
            );
        }
        for (i, path) in self.distribution.static_paths.iter().enumerate() {
            if let Err(e) = crate::routing::PathPattern::parse(path) {
                report
                    .errors
                    .push(format!("distribution.static_paths[{}]: {}", i, e));
            }
        }
        let public_dir = self.public_dir();
        if public_dir.is_dir() {
            for path in &self.distribution.static_paths {
                let Ok(pattern) = crate::routing::PathPattern::parse(path) else {
                    continue;
                };
                let first = pattern.literal_prefix().split('/').next().unwrap_or("");
                if !first.is_empty() && !public_dir.join(first).exists() {
                    report.warnings.push(format!(
                        "distribution.static_paths '{}' matches nothing in {}",
                        path,
                        public_dir.display()
                    ));
                }
            }
        }

        if self.provisioner.stack_name.is_empty() {
            report
                .errors
                .push("provisioner.stack_name is required".to_string());
        }
        if self.provisioner.region != "us-east-1" {
            report.warnings.push(format!(
                "provisioner.region '{}': Lambda@Edge functions must be created in us-east-1",
                self.provisioner.region
            ));
        }
        if self.provisioner.steps.is_empty() {
            report
                .warnings
                .push("provisioner.steps is empty: deploy will not change any resources".to_string());
        }

        if self.bucket.removal_policy == RemovalPolicy::DestroyEmptyFirst {
            report.warnings.push(
                "bucket.removal_policy 'destroy-empty-first' deletes all assets when the stack is deleted"
                    .to_string(),
            );
        }

        report
    }

    /// Validate, failing on any error.
    ///
    /// Returns the report so callers can surface the warnings.
    pub fn ensure_valid(&self) -> Result<ConfigReport> {
        let report = self.validate();
        if report.is_valid() {
            Ok(report)
        } else {
            Err(StackError::Config(report.errors.join("; ")))
        }
    }

    /// Create a default config for a new application.
    pub fn default_for_app(name: &str) -> Self {
        Self {
            app: AppConfig {
                name: name.to_string(),
                root: PathBuf::from("."),
            },
            ..Default::default()
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-')
}

/// Result of config validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigReport {
    /// Problems that prevent synthesis.
    pub errors: Vec<String>,
    /// Suspicious but accepted values.
    pub warnings: Vec<String>,
}

impl ConfigReport {
    /// Whether the config can be used.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name.
    pub name: String,

    /// Application root, relative to the config file.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "ssr-app".to_string(),
            root: default_root(),
        }
    }
}

/// Build tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build program (default: yarn).
    #[serde(default = "default_build_command")]
    pub command: String,

    /// Build arguments (default: ["build"]).
    #[serde(default = "default_build_args")]
    pub args: Vec<String>,

    /// Server bundle, relative to the app root.
    #[serde(default = "default_server_dir")]
    pub server_dir: PathBuf,

    /// Public asset bundle, relative to the app root.
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
}

fn default_build_command() -> String {
    "yarn".to_string()
}

fn default_build_args() -> Vec<String> {
    vec!["build".to_string()]
}

fn default_server_dir() -> PathBuf {
    PathBuf::from(".output/server")
}

fn default_public_dir() -> PathBuf {
    PathBuf::from(".output/public")
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            args: default_build_args(),
            server_dir: default_server_dir(),
            public_dir: default_public_dir(),
        }
    }
}

/// Handler adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Adapter source file, relative to the config file.
    #[serde(default = "default_adapter_source")]
    pub source: PathBuf,

    /// Module name the adapter is installed as in the server bundle.
    #[serde(default = "default_adapter_module")]
    pub module: String,

    /// Exported handler function name.
    #[serde(default = "default_adapter_export")]
    pub export: String,
}

fn default_adapter_source() -> PathBuf {
    PathBuf::from("static/wrapper.mjs")
}

fn default_adapter_module() -> String {
    "wrapper".to_string()
}

fn default_adapter_export() -> String {
    "handler".to_string()
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            source: default_adapter_source(),
            module: default_adapter_module(),
            export: default_adapter_export(),
        }
    }
}

impl AdapterConfig {
    /// The entry point this adapter provides.
    pub fn entry_point(&self) -> EntryPoint {
        let extension = self
            .source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mjs")
            .to_string();
        EntryPoint {
            module: self.module.clone(),
            export: self.export.clone(),
            extension,
        }
    }
}

/// Entry point of the edge function.
///
/// Both the injected adapter file name and the function's handler string
/// are derived from this one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Module (file stem) name.
    pub module: String,
    /// Exported function name.
    pub export: String,
    /// Module file extension.
    pub extension: String,
}

impl EntryPoint {
    /// File name of the adapter inside the server bundle.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.module, self.extension)
    }

    /// Handler reference for the function runtime.
    pub fn handler(&self) -> String {
        format!("{}.{}", self.module, self.export)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.handler())
    }
}

/// Edge function settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionConfig {
    /// Runtime identifier (default: nodejs16.x).
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Memory size in MB.
    #[serde(default = "default_memory")]
    pub memory_mb: u32,

    /// Timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,

    /// Function description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_runtime() -> String {
    "nodejs16.x".to_string()
}

fn default_memory() -> u32 {
    128
}

fn default_timeout() -> u32 {
    5
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            memory_mb: default_memory(),
            timeout_secs: default_timeout(),
            description: None,
        }
    }
}

/// What happens to the origin bucket when the stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalPolicy {
    /// Keep the bucket and its contents.
    Retain,
    /// Empty the bucket, then delete it.
    #[default]
    DestroyEmptyFirst,
}

impl RemovalPolicy {
    /// CloudFormation deletion policy value.
    pub fn deletion_policy(&self) -> &'static str {
        match self {
            Self::Retain => "Retain",
            Self::DestroyEmptyFirst => "Delete",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "retain" => Some(Self::Retain),
            "destroy-empty-first" | "destroy" => Some(Self::DestroyEmptyFirst),
            _ => None,
        }
    }
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retain => write!(f, "retain"),
            Self::DestroyEmptyFirst => write!(f, "destroy-empty-first"),
        }
    }
}

/// Origin bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Removal policy.
    #[serde(default)]
    pub removal_policy: RemovalPolicy,

    /// Export name of the auto-delete-objects provider function.
    #[serde(default = "default_auto_delete_provider")]
    pub auto_delete_provider: String,
}

fn default_auto_delete_provider() -> String {
    "SsrAutoDeleteObjectsProvider".to_string()
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            removal_policy: RemovalPolicy::default(),
            auto_delete_provider: default_auto_delete_provider(),
        }
    }
}

/// CloudFront event a function is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeEventType {
    /// Before the cache is checked.
    ViewerRequest,
    /// After a cache miss, before the origin is contacted.
    #[default]
    OriginRequest,
    /// After the origin responds.
    OriginResponse,
    /// Before the response is returned to the viewer.
    ViewerResponse,
}

impl EdgeEventType {
    /// CloudFront event type value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewerRequest => "viewer-request",
            Self::OriginRequest => "origin-request",
            Self::OriginResponse => "origin-response",
            Self::ViewerResponse => "viewer-response",
        }
    }
}

impl fmt::Display for EdgeEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distribution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Path patterns served directly from the bucket.
    #[serde(default = "default_static_paths")]
    pub static_paths: Vec<String>,

    /// Event the edge function is attached to on the default behavior.
    #[serde(default)]
    pub event_type: EdgeEventType,

    /// CloudFront price class.
    #[serde(default = "default_price_class")]
    pub price_class: String,

    /// Distribution comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_static_paths() -> Vec<String> {
    vec!["_nuxt/*".to_string()]
}

fn default_price_class() -> String {
    "PriceClass_All".to_string()
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            static_paths: default_static_paths(),
            event_type: EdgeEventType::default(),
            price_class: default_price_class(),
            comment: None,
        }
    }
}

/// Asset deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Paths invalidated after each upload.
    #[serde(default = "default_invalidation_paths")]
    pub invalidation_paths: Vec<String>,

    /// Remove objects that are no longer in the bundle.
    #[serde(default = "default_true")]
    pub prune: bool,

    /// Export name of the bucket deployment provider function.
    #[serde(default = "default_deployment_provider")]
    pub provider: String,
}

fn default_invalidation_paths() -> Vec<String> {
    vec!["/*".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_deployment_provider() -> String {
    "SsrBucketDeploymentProvider".to_string()
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            invalidation_paths: default_invalidation_paths(),
            prune: true,
            provider: default_deployment_provider(),
        }
    }
}

/// A command invocation with placeholder arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to run.
    pub command: String,

    /// Arguments; `{template}`, `{assets}`, `{stack}`, `{region}` and
    /// `{out_dir}` are substituted.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Provisioning engine contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Stack name.
    #[serde(default = "default_stack_name")]
    pub stack_name: String,

    /// Deployment region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Bootstrap qualifier of the asset staging bucket.
    #[serde(default = "default_qualifier")]
    pub qualifier: String,

    /// Synthesis output directory, relative to the config file.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Commands run in order to publish assets and deploy the template.
    #[serde(default = "default_steps")]
    pub steps: Vec<CommandSpec>,

    /// Command printing the stack outputs as JSON.
    #[serde(default = "default_outputs")]
    pub outputs: Option<CommandSpec>,

    /// Command printing recent failed resource events, one per line,
    /// queried after a step fails.
    #[serde(default = "default_events")]
    pub events: Option<CommandSpec>,
}

fn default_stack_name() -> String {
    DEFAULT_STACK_NAME.to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_qualifier() -> String {
    "hnb659fds".to_string()
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".ssr/out")
}

fn default_steps() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("npx", &["cdk-assets", "publish", "--path", "{assets}"]),
        CommandSpec::new(
            "aws",
            &[
                "cloudformation",
                "deploy",
                "--template-file",
                "{template}",
                "--stack-name",
                "{stack}",
                "--region",
                "{region}",
                "--capabilities",
                "CAPABILITY_IAM",
            ],
        ),
    ]
}

fn default_outputs() -> Option<CommandSpec> {
    Some(CommandSpec::new(
        "aws",
        &[
            "cloudformation",
            "describe-stacks",
            "--stack-name",
            "{stack}",
            "--region",
            "{region}",
            "--query",
            "Stacks[0].Outputs",
            "--output",
            "json",
        ],
    ))
}

fn default_events() -> Option<CommandSpec> {
    Some(CommandSpec::new(
        "aws",
        &[
            "cloudformation",
            "describe-stack-events",
            "--stack-name",
            "{stack}",
            "--region",
            "{region}",
            "--max-items",
            "25",
            "--query",
            "StackEvents[?contains(ResourceStatus, 'FAILED')].[LogicalResourceId,ResourceStatus,ResourceStatusReason]",
            "--output",
            "text",
        ],
    ))
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            stack_name: default_stack_name(),
            region: default_region(),
            qualifier: default_qualifier(),
            out_dir: default_out_dir(),
            steps: default_steps(),
            outputs: default_outputs(),
            events: default_events(),
        }
    }
}

/// Environment-specific configuration overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Stack name override.
    #[serde(default)]
    pub stack_name: Option<String>,

    /// Function config override.
    #[serde(default)]
    pub function: Option<FunctionConfig>,

    /// Bucket config override.
    #[serde(default)]
    pub bucket: Option<BucketConfig>,

    /// Distribution config override.
    #[serde(default)]
    pub distribution: Option<DistributionConfig>,

    /// Provisioner config override.
    #[serde(default)]
    pub provisioner: Option<ProvisionerConfig>,
}
