//! Config file discovery, generation and key access.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use ssr_stack::{EdgeEventType, RemovalPolicy, StackConfig};

/// Config file names, in lookup order.
pub const CONFIG_NAMES: [&str; 3] = ["ssr.toml", ".ssr.toml", "ssr.json"];

/// Find a config file in `start` or its parents.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        for name in &CONFIG_NAMES {
            let path = current.join(name);
            if path.is_file() {
                return Some(path);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Generate a default ssr.toml config file.
pub fn generate_default_config(name: &str) -> String {
    format!(
        r#"# Serverless SSR stack configuration

[app]
name = "{name}"
root = "."

[build]
command = "yarn"
args = ["build"]
server_dir = ".output/server"
public_dir = ".output/public"

[adapter]
source = "static/wrapper.mjs"
module = "wrapper"
export = "handler"

[function]
runtime = "nodejs16.x"
memory_mb = 128
timeout_secs = 5

[bucket]
# "retain" keeps the bucket and its objects when the stack is deleted
removal_policy = "destroy-empty-first"

[distribution]
# Paths served straight from the bucket; everything else runs the edge function
static_paths = ["_nuxt/*"]
event_type = "origin-request"

[deployment]
invalidation_paths = ["/*"]
prune = true

[provisioner]
stack_name = "{name}"
region = "us-east-1"
qualifier = "hnb659fds"

[[provisioner.steps]]
command = "npx"
args = ["cdk-assets", "publish", "--path", "{{assets}}"]

[[provisioner.steps]]
command = "aws"
args = [
    "cloudformation", "deploy",
    "--template-file", "{{template}}",
    "--stack-name", "{{stack}}",
    "--region", "{{region}}",
    "--capabilities", "CAPABILITY_IAM",
]

[provisioner.outputs]
command = "aws"
args = [
    "cloudformation", "describe-stacks",
    "--stack-name", "{{stack}}",
    "--region", "{{region}}",
    "--query", "Stacks[0].Outputs",
    "--output", "json",
]

[provisioner.events]
command = "aws"
args = [
    "cloudformation", "describe-stack-events",
    "--stack-name", "{{stack}}",
    "--region", "{{region}}",
    "--max-items", "25",
    "--query", "StackEvents[?contains(ResourceStatus, 'FAILED')].[LogicalResourceId,ResourceStatus,ResourceStatusReason]",
    "--output", "text",
]

[environments.staging]
stack_name = "{name}-staging"

[environments.production]
stack_name = "{name}-production"

[environments.production.bucket]
removal_policy = "retain"
"#,
        name = name
    )
}

/// Read a config value by dot-separated key, formatted as JSON.
pub fn get_config_value(config: &StackConfig, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();

    let quoted = |s: &str| format!("\"{}\"", s);
    let path = |p: &Path| quoted(&p.display().to_string());

    match parts.as_slice() {
        ["app", "name"] => Ok(quoted(&config.app.name)),
        ["app", "root"] => Ok(path(&config.app.root)),
        ["build", "command"] => Ok(quoted(&config.build.command)),
        ["build", "args"] => Ok(serde_json::to_string(&config.build.args)?),
        ["build", "server_dir"] => Ok(path(&config.build.server_dir)),
        ["build", "public_dir"] => Ok(path(&config.build.public_dir)),
        ["adapter", "source"] => Ok(path(&config.adapter.source)),
        ["adapter", "module"] => Ok(quoted(&config.adapter.module)),
        ["adapter", "export"] => Ok(quoted(&config.adapter.export)),
        ["function", "runtime"] => Ok(quoted(&config.function.runtime)),
        ["function", "memory_mb"] => Ok(config.function.memory_mb.to_string()),
        ["function", "timeout_secs"] => Ok(config.function.timeout_secs.to_string()),
        ["bucket", "removal_policy"] => Ok(quoted(&config.bucket.removal_policy.to_string())),
        ["distribution", "static_paths"] => {
            Ok(serde_json::to_string(&config.distribution.static_paths)?)
        }
        ["distribution", "event_type"] => Ok(quoted(config.distribution.event_type.as_str())),
        ["distribution", "price_class"] => Ok(quoted(&config.distribution.price_class)),
        ["deployment", "invalidation_paths"] => {
            Ok(serde_json::to_string(&config.deployment.invalidation_paths)?)
        }
        ["deployment", "prune"] => Ok(config.deployment.prune.to_string()),
        ["provisioner", "stack_name"] => Ok(quoted(&config.provisioner.stack_name)),
        ["provisioner", "region"] => Ok(quoted(&config.provisioner.region)),
        ["provisioner", "qualifier"] => Ok(quoted(&config.provisioner.qualifier)),
        ["provisioner", "out_dir"] => Ok(path(&config.provisioner.out_dir)),
        _ => bail!("Unknown config key: {}", key),
    }
}

/// Set a config value by dot-separated key.
///
/// List values are comma-separated.
pub fn set_config_value(config: &mut StackConfig, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let list = || -> Vec<String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    };

    match parts.as_slice() {
        ["app", "name"] => config.app.name = value.to_string(),
        ["app", "root"] => config.app.root = PathBuf::from(value),
        ["build", "command"] => config.build.command = value.to_string(),
        ["build", "args"] => config.build.args = list(),
        ["build", "server_dir"] => config.build.server_dir = PathBuf::from(value),
        ["build", "public_dir"] => config.build.public_dir = PathBuf::from(value),
        ["adapter", "source"] => config.adapter.source = PathBuf::from(value),
        ["adapter", "module"] => config.adapter.module = value.to_string(),
        ["adapter", "export"] => config.adapter.export = value.to_string(),
        ["function", "runtime"] => config.function.runtime = value.to_string(),
        ["function", "memory_mb"] => config.function.memory_mb = value.parse()?,
        ["function", "timeout_secs"] => config.function.timeout_secs = value.parse()?,
        ["bucket", "removal_policy"] => {
            config.bucket.removal_policy = match RemovalPolicy::parse(value) {
                Some(policy) => policy,
                None => bail!("Invalid removal policy '{}' (retain, destroy-empty-first)", value),
            }
        }
        ["distribution", "static_paths"] => config.distribution.static_paths = list(),
        ["distribution", "event_type"] => config.distribution.event_type = parse_event_type(value)?,
        ["distribution", "price_class"] => config.distribution.price_class = value.to_string(),
        ["deployment", "invalidation_paths"] => config.deployment.invalidation_paths = list(),
        ["deployment", "prune"] => config.deployment.prune = value.parse()?,
        ["provisioner", "stack_name"] => config.provisioner.stack_name = value.to_string(),
        ["provisioner", "region"] => config.provisioner.region = value.to_string(),
        ["provisioner", "qualifier"] => config.provisioner.qualifier = value.to_string(),
        ["provisioner", "out_dir"] => config.provisioner.out_dir = PathBuf::from(value),
        _ => bail!("Unknown or read-only config key: {}", key),
    }

    Ok(())
}

fn parse_event_type(value: &str) -> Result<EdgeEventType> {
    let all = [
        EdgeEventType::ViewerRequest,
        EdgeEventType::OriginRequest,
        EdgeEventType::OriginResponse,
        EdgeEventType::ViewerResponse,
    ];
    match all.into_iter().find(|e| e.as_str() == value) {
        Some(event) => Ok(event),
        None => bail!(
            "Invalid event type '{}' (viewer-request, origin-request, origin-response, viewer-response)",
            value
        ),
    }
}
