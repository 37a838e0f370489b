//! Upload of the public bundle into the bucket.

use serde_json::json;

use super::{Declaration, BUCKET_ID, DISTRIBUTION_ID};
use crate::asset::{Asset, AssetStaging};
use crate::config::DeploymentConfig;
use crate::template::{import_value, reference, Resource};

/// Logical id of the deployment.
pub const DEPLOYMENT_ID: &str = "Deployment";

/// Copies the staged public bundle into the bucket and invalidates the
/// distribution cache.
///
/// The run id makes the resource change on every deployment so uploads
/// and invalidation are reconciled even when nothing else changed.
#[derive(Debug, Clone)]
pub struct BucketDeployment {
    source: Asset,
    staging: AssetStaging,
    invalidation_paths: Vec<String>,
    prune: bool,
    provider: String,
    run_id: String,
}

impl BucketDeployment {
    /// Declare the deployment of `source`.
    pub fn declare(
        config: &DeploymentConfig,
        source: &Asset,
        staging: &AssetStaging,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            source: source.clone(),
            staging: staging.clone(),
            invalidation_paths: config.invalidation_paths.clone(),
            prune: config.prune,
            provider: config.provider.clone(),
            run_id: run_id.into(),
        }
    }

    /// Source asset.
    pub fn source(&self) -> &Asset {
        &self.source
    }

    /// Run id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn deployment(&self) -> Resource {
        Resource::new(
            "Custom::CDKBucketDeployment",
            json!({
                "ServiceToken": import_value(&self.provider),
                "SourceBucketNames": [self.staging.bucket_expr()],
                "SourceObjectKeys": [self.source.object_key()],
                "DestinationBucketName": reference(BUCKET_ID),
                "DistributionId": reference(DISTRIBUTION_ID),
                "DistributionPaths": self.invalidation_paths,
                "Prune": self.prune,
                "RunId": self.run_id,
            }),
        )
        .with_metadata("aws:asset:path", json!(self.staging.metadata_path(&self.source)))
        .with_metadata("aws:asset:hash", json!(self.source.hash))
    }
}

impl Declaration for BucketDeployment {
    fn resources(&self) -> Vec<(String, Resource)> {
        vec![(DEPLOYMENT_ID.to_string(), self.deployment())]
    }
}
