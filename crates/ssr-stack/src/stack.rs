//! Phase 2: declare the stack and synthesize the cloud assembly.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::asset::{AssetManifest, AssetStaging};
use crate::build::PreparedArtifact;
use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::resources::{
    declare_outputs, BucketDeployment, Declaration, Distribution, EdgeFunction, S3Origin,
    StorageBucket,
};
use crate::routing::RoutingTable;
use crate::template::Template;

/// Template file name inside the output directory.
pub const TEMPLATE_FILE: &str = "template.json";
/// Asset manifest file name inside the output directory.
pub const ASSETS_FILE: &str = "assets.json";

/// All declarations of one stack.
#[derive(Debug, Clone)]
pub struct SsrStack {
    name: String,
    description: String,
    staging: AssetStaging,
    function: EdgeFunction,
    bucket: StorageBucket,
    distribution: Distribution,
    deployment: BucketDeployment,
}

impl SsrStack {
    /// Declare every resource for a prepared artifact.
    ///
    /// Pure: reads nothing from disk. `run_id` identifies this deployment
    /// and is the only input that differs between runs over the same build.
    pub fn declare(config: &StackConfig, prepared: &PreparedArtifact, run_id: &str) -> Result<Self> {
        if run_id.is_empty() {
            return Err(StackError::Config("run id must not be empty".to_string()));
        }

        let staging = AssetStaging::new(&config.provisioner.qualifier, &config.provisioner.region)
            .with_out_dir(config.out_dir());

        let function = EdgeFunction::declare(
            &config.function,
            &prepared.entry_point,
            &prepared.server,
            &staging,
        );
        let bucket = StorageBucket::declare(&config.bucket);
        let origin = S3Origin::new(bucket.clone());
        let distribution =
            Distribution::declare(&config.distribution, origin, function.current_version())?;
        let deployment =
            BucketDeployment::declare(&config.deployment, &prepared.public, &staging, run_id);

        debug!(
            stack = %config.provisioner.stack_name,
            version = %function.current_version(),
            overrides = distribution.routing().overrides().len(),
            "stack declared"
        );

        Ok(Self {
            name: config.provisioner.stack_name.clone(),
            description: format!("Serverless SSR stack for {}", config.app.name),
            staging,
            function,
            bucket,
            distribution,
            deployment,
        })
    }

    /// Stack name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routing table of the distribution.
    pub fn routing(&self) -> &RoutingTable {
        self.distribution.routing()
    }

    /// Edge function declaration.
    pub fn function(&self) -> &EdgeFunction {
        &self.function
    }

    /// Bucket declaration.
    pub fn bucket(&self) -> &StorageBucket {
        &self.bucket
    }

    /// Distribution declaration.
    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Deployment declaration.
    pub fn deployment(&self) -> &BucketDeployment {
        &self.deployment
    }

    /// Assemble the template and check its dependency graph.
    pub fn template(&self) -> Result<Template> {
        let mut template = Template::new();
        template.description = Some(self.description.clone());

        let declarations: [&dyn Declaration; 5] = [
            &self.function,
            &self.bucket,
            self.distribution.origin(),
            &self.distribution,
            &self.deployment,
        ];
        for declaration in declarations {
            template.extend(declaration.resources())?;
        }
        declare_outputs(&mut template, &self.distribution);

        template.dependency_order()?;
        Ok(template)
    }

    /// Asset manifest for the function code and the public bundle.
    pub fn asset_manifest(&self) -> AssetManifest {
        self.staging
            .manifest([self.function.code(), self.deployment.source()])
    }

    /// Produce the cloud assembly.
    pub fn synth(&self) -> Result<CloudAssembly> {
        Ok(CloudAssembly {
            stack_name: self.name.clone(),
            template: self.template()?,
            assets: self.asset_manifest(),
        })
    }
}

/// Synthesized template and asset manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudAssembly {
    /// Stack name.
    pub stack_name: String,
    /// Template.
    pub template: Template,
    /// Asset manifest.
    pub assets: AssetManifest,
}

impl CloudAssembly {
    /// Write the assembly into `out_dir`, replacing earlier files.
    pub fn write(self, out_dir: &Path) -> Result<WrittenAssembly> {
        std::fs::create_dir_all(out_dir).map_err(|e| StackError::io(out_dir, e))?;

        let template_path = out_dir.join(TEMPLATE_FILE);
        let assets_path = out_dir.join(ASSETS_FILE);

        std::fs::write(&template_path, self.template.to_json()?)
            .map_err(|e| StackError::io(&template_path, e))?;
        std::fs::write(&assets_path, serde_json::to_string_pretty(&self.assets)?)
            .map_err(|e| StackError::io(&assets_path, e))?;

        info!(
            template = %template_path.display(),
            resources = self.template.resources.len(),
            "assembly written"
        );

        Ok(WrittenAssembly {
            assembly: self,
            out_dir: out_dir.to_path_buf(),
            template_path,
            assets_path,
        })
    }
}

/// An assembly on disk, ready for the provisioning engine.
#[derive(Debug, Clone)]
pub struct WrittenAssembly {
    /// The assembly.
    pub assembly: CloudAssembly,
    /// Output directory.
    pub out_dir: PathBuf,
    /// Template path.
    pub template_path: PathBuf,
    /// Asset manifest path.
    pub assets_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Asset, Packaging};
    use crate::build::BuildArtifact;
    use crate::config::RemovalPolicy;
    use crate::resources::{
        AUTO_DELETE_ID, BUCKET_ID, BUCKET_POLICY_ID, DEPLOYMENT_ID, DISTRIBUTION_ID, FUNCTION_ID,
        FUNCTION_ROLE_ID, ORIGIN_ACCESS_ID, URL_OUTPUT,
    };
    use crate::template::TemplateDiff;

    fn asset(dir: &str, hash: char) -> Asset {
        Asset {
            path: PathBuf::from(dir),
            hash: hash.to_string().repeat(64),
            packaging: Packaging::Zip,
            file_count: 1,
            total_bytes: 1,
        }
    }

    fn prepared(server_hash: char) -> PreparedArtifact {
        let config = StackConfig::default();
        PreparedArtifact {
            artifact: BuildArtifact::locate(&config),
            adapter_path: PathBuf::from(".output/server/wrapper.mjs"),
            entry_point: config.entry_point(),
            server: asset("/app/.output/server", server_hash),
            public: asset("/app/.output/public", 'p'),
        }
    }

    fn template(config: &StackConfig, run_id: &str) -> Template {
        SsrStack::declare(config, &prepared('s'), run_id)
            .unwrap()
            .template()
            .unwrap()
    }

    #[test]
    fn test_template_declares_all_components() {
        let config = StackConfig::default();
        let stack = SsrStack::declare(&config, &prepared('s'), "run-1").unwrap();
        let template = stack.template().unwrap();

        for id in [
            FUNCTION_ROLE_ID,
            FUNCTION_ID,
            BUCKET_ID,
            AUTO_DELETE_ID,
            ORIGIN_ACCESS_ID,
            BUCKET_POLICY_ID,
            DISTRIBUTION_ID,
            DEPLOYMENT_ID,
        ] {
            assert!(template.get(id).is_some(), "missing {}", id);
        }
        assert_eq!(template.ids_of_type("AWS::Lambda::Version").len(), 1);
        assert!(template.outputs.contains_key(URL_OUTPUT));
    }

    #[test]
    fn test_dependency_edges() {
        let config = StackConfig::default();
        let stack = SsrStack::declare(&config, &prepared('s'), "run-1").unwrap();
        let template = stack.template().unwrap();
        let version = stack.function().current_version().logical_id;

        assert!(template.depends_on(&version, FUNCTION_ID));
        assert!(template.depends_on(DISTRIBUTION_ID, &version));
        assert!(template.depends_on(DISTRIBUTION_ID, BUCKET_ID));
        assert!(template.depends_on(DEPLOYMENT_ID, BUCKET_ID));
        assert!(template.depends_on(DEPLOYMENT_ID, DISTRIBUTION_ID));
        assert!(!template.depends_on(BUCKET_ID, DEPLOYMENT_ID));

        let order = template.dependency_order().unwrap();
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(pos(FUNCTION_ID) < pos(DISTRIBUTION_ID));
        assert!(pos(DISTRIBUTION_ID) < pos(DEPLOYMENT_ID));
    }

    #[test]
    fn test_resynthesis_changes_only_deployment() {
        let config = StackConfig::default();
        let first = template(&config, "run-1");
        let second = template(&config, "run-2");

        let diff = TemplateDiff::between(&first, &second);
        assert!(diff.added.is_empty() && diff.removed.is_empty());
        assert_eq!(diff.modified, vec![DEPLOYMENT_ID.to_string()]);

        assert!(TemplateDiff::between(&first, &template(&config, "run-1")).is_empty());
    }

    #[test]
    fn test_code_change_publishes_new_version() {
        let config = StackConfig::default();
        let old = SsrStack::declare(&config, &prepared('a'), "run").unwrap().template().unwrap();
        let new = SsrStack::declare(&config, &prepared('b'), "run").unwrap().template().unwrap();

        let diff = TemplateDiff::between(&old, &new);
        assert_eq!(diff.added.len(), 1);
        assert!(diff.added[0].starts_with("EdgeFunctionCurrentVersion"));
        assert!(diff.modified.contains(&FUNCTION_ID.to_string()));
        assert!(diff.modified.contains(&DISTRIBUTION_ID.to_string()));
    }

    #[test]
    fn test_retain_policy_omits_auto_delete() {
        let mut config = StackConfig::default();
        config.bucket.removal_policy = RemovalPolicy::Retain;
        let template = template(&config, "run-1");
        assert!(template.get(AUTO_DELETE_ID).is_none());
        assert_eq!(
            template.get(BUCKET_ID).unwrap().deletion_policy.as_deref(),
            Some("Retain")
        );
    }

    #[test]
    fn test_empty_run_id_rejected() {
        let config = StackConfig::default();
        assert!(matches!(
            SsrStack::declare(&config, &prepared('s'), ""),
            Err(StackError::Config(_))
        ));
    }

    #[test]
    fn test_write_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let config = StackConfig::default();
        let stack = SsrStack::declare(&config, &prepared('s'), "run-1").unwrap();
        let written = stack.synth().unwrap().write(&dir.path().join("out")).unwrap();

        let read_back = Template::read(&written.template_path).unwrap();
        assert_eq!(read_back, written.assembly.template);

        let assets: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written.assets_path).unwrap()).unwrap();
        assert_eq!(assets["files"].as_object().unwrap().len(), 2);
        assert!(assets["files"][&"s".repeat(64)]["destinations"]["current_account-us-east-1"].is_object());
    }

    #[test]
    fn test_same_build_in_two_checkouts_declares_same_template() {
        let declare_in = |root: &str| {
            let config = StackConfig {
                base_dir: PathBuf::from(root),
                ..StackConfig::default()
            };
            let mut prepared = prepared('s');
            prepared.server = asset(&format!("{}/.output/server", root), 's');
            prepared.public = asset(&format!("{}/.output/public", root), 'p');
            SsrStack::declare(&config, &prepared, "run-1")
                .unwrap()
                .template()
                .unwrap()
        };

        let a = declare_in("/checkout-a");
        let b = declare_in("/srv/ci/checkout-b");
        assert!(TemplateDiff::between(&a, &b).is_empty());
        assert_eq!(
            a.get(FUNCTION_ID).unwrap().metadata["aws:asset:path"],
            "../../.output/server"
        );
    }
}
