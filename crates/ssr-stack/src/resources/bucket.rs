//! Origin storage bucket.

use serde_json::{json, Value};

use super::Declaration;
use crate::config::{BucketConfig, RemovalPolicy};
use crate::template::{get_att, import_value, reference, Resource};

/// Logical id of the bucket.
pub const BUCKET_ID: &str = "Bucket";
/// Logical id of the custom resource that empties the bucket on delete.
pub const AUTO_DELETE_ID: &str = "BucketAutoDeleteObjects";

/// Private bucket holding the public bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageBucket {
    removal_policy: RemovalPolicy,
    auto_delete_provider: String,
}

impl StorageBucket {
    /// Declare the bucket.
    pub fn declare(config: &BucketConfig) -> Self {
        Self {
            removal_policy: config.removal_policy,
            auto_delete_provider: config.auto_delete_provider.clone(),
        }
    }

    /// Removal policy.
    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    /// `Ref` to the bucket name.
    pub fn name(&self) -> Value {
        reference(BUCKET_ID)
    }

    /// Bucket ARN.
    pub fn arn(&self) -> Value {
        get_att(BUCKET_ID, "Arn")
    }

    /// Regional domain name, used as the origin domain.
    pub fn regional_domain_name(&self) -> Value {
        get_att(BUCKET_ID, "RegionalDomainName")
    }

    fn bucket(&self) -> Resource {
        let mut properties = json!({
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true
            }
        });
        if self.removal_policy == RemovalPolicy::DestroyEmptyFirst {
            properties["Tags"] = json!([{ "Key": "ssr:auto-delete-objects", "Value": "true" }]);
        }

        Resource::new("AWS::S3::Bucket", properties)
            .with_policy(self.removal_policy.deletion_policy())
    }

    fn auto_delete(&self) -> Resource {
        Resource::new(
            "Custom::S3AutoDeleteObjects",
            json!({
                "ServiceToken": import_value(&self.auto_delete_provider),
                "BucketName": self.name(),
            }),
        )
        .with_policy("Delete")
    }
}

impl Declaration for StorageBucket {
    fn resources(&self) -> Vec<(String, Resource)> {
        let mut resources = vec![(BUCKET_ID.to_string(), self.bucket())];
        if self.removal_policy == RemovalPolicy::DestroyEmptyFirst {
            resources.push((AUTO_DELETE_ID.to_string(), self.auto_delete()));
        }
        resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(policy: RemovalPolicy) -> Vec<(String, Resource)> {
        let config = BucketConfig {
            removal_policy: policy,
            ..BucketConfig::default()
        };
        StorageBucket::declare(&config).resources()
    }

    #[test]
    fn test_destroy_policy_empties_bucket_first() {
        let resources = declare(RemovalPolicy::DestroyEmptyFirst);
        assert_eq!(resources.len(), 2);

        let (_, bucket) = &resources[0];
        assert_eq!(bucket.deletion_policy.as_deref(), Some("Delete"));

        let (id, auto_delete) = &resources[1];
        assert_eq!(id, AUTO_DELETE_ID);
        assert_eq!(auto_delete.resource_type, "Custom::S3AutoDeleteObjects");
        assert!(auto_delete.references().contains(BUCKET_ID));
        assert_eq!(
            auto_delete.properties["ServiceToken"]["Fn::ImportValue"],
            "SsrAutoDeleteObjectsProvider"
        );
    }

    #[test]
    fn test_retain_policy_keeps_bucket() {
        let resources = declare(RemovalPolicy::Retain);
        assert_eq!(resources.len(), 1);
        let (_, bucket) = &resources[0];
        assert_eq!(bucket.deletion_policy.as_deref(), Some("Retain"));
        assert!(bucket.properties.get("Tags").is_none());
    }

    #[test]
    fn test_bucket_is_private() {
        let resources = declare(RemovalPolicy::Retain);
        let block = &resources[0].1.properties["PublicAccessBlockConfiguration"];
        assert_eq!(block["BlockPublicPolicy"], true);
        assert_eq!(block["RestrictPublicBuckets"], true);
    }
}
