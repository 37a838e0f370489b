//! Edge function declaration.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::Declaration;
use crate::asset::{Asset, AssetStaging};
use crate::config::{EntryPoint, FunctionConfig};
use crate::routing::FunctionVersionRef;
use crate::template::{get_att, join, reference, Resource};

/// Logical id of the function.
pub const FUNCTION_ID: &str = "EdgeFunction";
/// Logical id of the function's execution role.
pub const FUNCTION_ROLE_ID: &str = "EdgeFunctionServiceRole";
/// Prefix of the version resource's logical id.
pub const FUNCTION_VERSION_PREFIX: &str = "EdgeFunctionCurrentVersion";

/// A function replicated to every edge location.
#[derive(Debug, Clone)]
pub struct EdgeFunction {
    runtime: String,
    entry_point: EntryPoint,
    memory_mb: u32,
    timeout_secs: u32,
    description: Option<String>,
    code: Asset,
    code_location: Value,
    code_path: String,
}

impl EdgeFunction {
    /// Declare a function running `code` through `entry_point`.
    pub fn declare(
        config: &FunctionConfig,
        entry_point: &EntryPoint,
        code: &Asset,
        staging: &AssetStaging,
    ) -> Self {
        Self {
            runtime: config.runtime.clone(),
            entry_point: entry_point.clone(),
            memory_mb: config.memory_mb,
            timeout_secs: config.timeout_secs,
            description: config.description.clone(),
            code: code.clone(),
            code_location: staging.code_location(code),
            code_path: staging.metadata_path(code),
        }
    }

    /// Handler string, e.g. `wrapper.handler`.
    pub fn handler(&self) -> String {
        self.entry_point.handler()
    }

    /// Runtime identifier.
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    /// Code asset.
    pub fn code(&self) -> &Asset {
        &self.code
    }

    /// The version published from the current code and settings.
    ///
    /// The logical id changes whenever the code or function settings
    /// change, which publishes a new version.
    pub fn current_version(&self) -> FunctionVersionRef {
        let mut hasher = Sha256::new();
        hasher.update(self.code.hash.as_bytes());
        hasher.update(self.runtime.as_bytes());
        hasher.update(self.handler().as_bytes());
        hasher.update(self.memory_mb.to_le_bytes());
        hasher.update(self.timeout_secs.to_le_bytes());
        let digest = hex::encode(hasher.finalize());

        FunctionVersionRef {
            logical_id: format!("{}{}", FUNCTION_VERSION_PREFIX, &digest[..8]),
            code_hash: self.code.hash.clone(),
        }
    }

    /// Placeholder version for routing inspection before a build exists.
    pub fn pending_version() -> FunctionVersionRef {
        FunctionVersionRef {
            logical_id: FUNCTION_VERSION_PREFIX.to_string(),
            code_hash: String::new(),
        }
    }

    fn role(&self) -> Resource {
        Resource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": "sts:AssumeRole",
                        "Effect": "Allow",
                        "Principal": {
                            "Service": ["lambda.amazonaws.com", "edgelambda.amazonaws.com"]
                        }
                    }]
                },
                "ManagedPolicyArns": [join(vec![
                    json!("arn:"),
                    reference("AWS::Partition"),
                    json!(":iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"),
                ])]
            }),
        )
    }

    fn function(&self) -> Resource {
        let mut properties = json!({
            "Code": self.code_location,
            "Handler": self.handler(),
            "Runtime": self.runtime,
            "Role": get_att(FUNCTION_ROLE_ID, "Arn"),
            "MemorySize": self.memory_mb,
            "Timeout": self.timeout_secs,
        });
        if let Some(ref description) = self.description {
            properties["Description"] = json!(description);
        }

        Resource::new("AWS::Lambda::Function", properties)
            .depends_on(FUNCTION_ROLE_ID)
            .with_metadata("aws:asset:path", json!(self.code_path))
            .with_metadata("aws:asset:hash", json!(self.code.hash))
            .with_metadata("aws:asset:property", json!("Code"))
    }

    fn version(&self) -> Resource {
        // Edge replicas outlive the stack for a while, so versions are kept.
        Resource::new(
            "AWS::Lambda::Version",
            json!({ "FunctionName": reference(FUNCTION_ID) }),
        )
        .with_policy("Retain")
    }
}

impl Declaration for EdgeFunction {
    fn resources(&self) -> Vec<(String, Resource)> {
        vec![
            (FUNCTION_ROLE_ID.to_string(), self.role()),
            (FUNCTION_ID.to_string(), self.function()),
            (self.current_version().logical_id, self.version()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Packaging;
    use std::path::PathBuf;

    fn asset(hash: &str) -> Asset {
        Asset {
            path: PathBuf::from("/app/.output/server"),
            hash: hash.repeat(64 / hash.len()),
            packaging: Packaging::Zip,
            file_count: 3,
            total_bytes: 1024,
        }
    }

    fn entry() -> EntryPoint {
        EntryPoint {
            module: "wrapper".into(),
            export: "handler".into(),
            extension: "mjs".into(),
        }
    }

    fn declare(hash: &str, config: &FunctionConfig) -> EdgeFunction {
        EdgeFunction::declare(
            config,
            &entry(),
            &asset(hash),
            &AssetStaging::new("hnb659fds", "us-east-1"),
        )
    }

    #[test]
    fn test_handler_follows_entry_point() {
        let function = declare("a", &FunctionConfig::default());
        assert_eq!(function.handler(), "wrapper.handler");

        let resources = function.resources();
        let (_, resource) = resources.iter().find(|(id, _)| id == FUNCTION_ID).unwrap();
        assert_eq!(resource.properties["Handler"], "wrapper.handler");
        assert_eq!(resource.properties["Runtime"], "nodejs16.x");
        assert_eq!(
            resource.properties["Code"]["S3Key"],
            format!("{}.zip", "a".repeat(64))
        );
    }

    #[test]
    fn test_version_changes_with_code() {
        let config = FunctionConfig::default();
        let v1 = declare("a", &config).current_version();
        let v1_again = declare("a", &config).current_version();
        let v2 = declare("b", &config).current_version();

        assert_eq!(v1, v1_again);
        assert_ne!(v1.logical_id, v2.logical_id);
        assert!(v1.logical_id.starts_with(FUNCTION_VERSION_PREFIX));
    }

    #[test]
    fn test_version_changes_with_settings() {
        let mut config = FunctionConfig::default();
        let before = declare("a", &config).current_version();
        config.memory_mb = 256;
        let after = declare("a", &config).current_version();
        assert_ne!(before.logical_id, after.logical_id);
    }

    #[test]
    fn test_version_references_function() {
        let function = declare("a", &FunctionConfig::default());
        let version_id = function.current_version().logical_id;
        let resources = function.resources();
        let (_, version) = resources.iter().find(|(id, _)| *id == version_id).unwrap();
        assert_eq!(version.resource_type, "AWS::Lambda::Version");
        assert!(version.references().contains(FUNCTION_ID));
        assert_eq!(version.deletion_policy.as_deref(), Some("Retain"));
    }

    #[test]
    fn test_role_trusts_edge_lambda() {
        let function = declare("a", &FunctionConfig::default());
        let resources = function.resources();
        let (_, role) = resources.iter().find(|(id, _)| id == FUNCTION_ROLE_ID).unwrap();
        let services = &role.properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"];
        assert!(services
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s == "edgelambda.amazonaws.com"));
    }
}
