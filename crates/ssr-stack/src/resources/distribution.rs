//! CDN distribution fronting the bucket and the edge function.

use serde_json::{json, Value};

use super::{Declaration, S3Origin};
use crate::config::DistributionConfig;
use crate::error::Result;
use crate::routing::{Behavior, FunctionVersionRef, PathPattern, RoutingTable};
use crate::template::{get_att, reference, Resource};

/// Logical id of the distribution.
pub const DISTRIBUTION_ID: &str = "Distribution";
/// Managed `CachingOptimized` cache policy.
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

/// Build the routing table for a distribution config.
///
/// The default behavior runs the function; each static path is served
/// straight from the origin.
pub fn build_routing(
    config: &DistributionConfig,
    origin_id: &str,
    version: FunctionVersionRef,
) -> Result<RoutingTable> {
    let mut table =
        RoutingTable::new(Behavior::origin(origin_id).with_function(config.event_type, version));
    for path in &config.static_paths {
        table.add_override(PathPattern::parse(path)?, Behavior::origin(origin_id))?;
    }
    Ok(table)
}

/// The distribution.
#[derive(Debug, Clone)]
pub struct Distribution {
    origin: S3Origin,
    routing: RoutingTable,
    price_class: String,
    comment: Option<String>,
}

impl Distribution {
    /// Declare a distribution whose default behavior runs `version`.
    pub fn declare(
        config: &DistributionConfig,
        origin: S3Origin,
        version: FunctionVersionRef,
    ) -> Result<Self> {
        let routing = build_routing(config, origin.id(), version)?;
        Ok(Self {
            origin,
            routing,
            price_class: config.price_class.clone(),
            comment: config.comment.clone(),
        })
    }

    /// Routing table.
    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    /// The origin.
    pub fn origin(&self) -> &S3Origin {
        &self.origin
    }

    /// Generated domain name, resolved at provisioning time.
    pub fn domain_name(&self) -> Value {
        get_att(DISTRIBUTION_ID, "DomainName")
    }

    /// `Ref` to the distribution id.
    pub fn id(&self) -> Value {
        reference(DISTRIBUTION_ID)
    }

    fn distribution(&self) -> Resource {
        let cache_behaviors: Vec<Value> = self
            .routing
            .overrides()
            .iter()
            .map(|(pattern, behavior)| behavior_config(behavior, Some(pattern)))
            .collect();

        let mut config = json!({
            "Enabled": true,
            "HttpVersion": "http2",
            "IPV6Enabled": true,
            "PriceClass": self.price_class,
            "Origins": [self.origin.origin_config()],
            "DefaultCacheBehavior": behavior_config(self.routing.default_behavior(), None),
        });
        if !cache_behaviors.is_empty() {
            config["CacheBehaviors"] = json!(cache_behaviors);
        }
        if let Some(ref comment) = self.comment {
            config["Comment"] = json!(comment);
        }

        Resource::new(
            "AWS::CloudFront::Distribution",
            json!({ "DistributionConfig": config }),
        )
    }
}

fn behavior_config(behavior: &Behavior, pattern: Option<&PathPattern>) -> Value {
    let mut config = json!({
        "TargetOriginId": behavior.origin,
        "ViewerProtocolPolicy": "allow-all",
        "CachePolicyId": CACHING_OPTIMIZED_POLICY_ID,
        "Compress": true,
    });
    if let Some(pattern) = pattern {
        config["PathPattern"] = json!(pattern.as_str());
    }
    if behavior.invokes_function() {
        let associations: Vec<Value> = behavior
            .edge_functions
            .iter()
            .map(|assoc| {
                json!({
                    "EventType": assoc.event_type.as_str(),
                    "LambdaFunctionARN": reference(&assoc.version.logical_id),
                })
            })
            .collect();
        config["LambdaFunctionAssociations"] = json!(associations);
    }
    config
}

impl Declaration for Distribution {
    fn resources(&self) -> Vec<(String, Resource)> {
        vec![(DISTRIBUTION_ID.to_string(), self.distribution())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BucketConfig, EdgeEventType};
    use crate::resources::{StorageBucket, ORIGIN_ACCESS_ID, ORIGIN_ID};

    fn version() -> FunctionVersionRef {
        FunctionVersionRef {
            logical_id: "EdgeFunctionCurrentVersion1234abcd".into(),
            code_hash: "1234abcd".into(),
        }
    }

    fn declare(config: &DistributionConfig) -> Distribution {
        let origin = S3Origin::new(StorageBucket::declare(&BucketConfig::default()));
        Distribution::declare(config, origin, version()).unwrap()
    }

    #[test]
    fn test_default_behavior_runs_function() {
        let distribution = declare(&DistributionConfig::default());
        let resources = distribution.resources();
        let (_, resource) = &resources[0];
        let default = &resource.properties["DistributionConfig"]["DefaultCacheBehavior"];

        assert_eq!(default["TargetOriginId"], ORIGIN_ID);
        assert_eq!(default["CachePolicyId"], CACHING_OPTIMIZED_POLICY_ID);
        let assoc = &default["LambdaFunctionAssociations"][0];
        assert_eq!(assoc["EventType"], "origin-request");
        assert_eq!(assoc["LambdaFunctionARN"]["Ref"], version().logical_id);
    }

    #[test]
    fn test_static_paths_bypass_function() {
        let distribution = declare(&DistributionConfig::default());
        let resources = distribution.resources();
        let behaviors = &resources[0].1.properties["DistributionConfig"]["CacheBehaviors"];

        assert_eq!(behaviors[0]["PathPattern"], "_nuxt/*");
        assert!(behaviors[0].get("LambdaFunctionAssociations").is_none());
        assert!(!distribution.routing().resolve("/_nuxt/app.js").behavior.invokes_function());
        assert!(distribution.routing().resolve("/assets/logo.png").behavior.invokes_function());
    }

    #[test]
    fn test_behaviors_emitted_in_precedence_order() {
        let config = DistributionConfig {
            static_paths: vec!["static/*".into(), "static/img/*".into()],
            ..DistributionConfig::default()
        };
        let distribution = declare(&config);
        let resources = distribution.resources();
        let behaviors = &resources[0].1.properties["DistributionConfig"]["CacheBehaviors"];
        assert_eq!(behaviors[0]["PathPattern"], "static/img/*");
        assert_eq!(behaviors[1]["PathPattern"], "static/*");
    }

    #[test]
    fn test_no_static_paths_omits_cache_behaviors() {
        let config = DistributionConfig {
            static_paths: vec![],
            event_type: EdgeEventType::ViewerRequest,
            ..DistributionConfig::default()
        };
        let distribution = declare(&config);
        let resources = distribution.resources();
        let dist = &resources[0].1.properties["DistributionConfig"];
        assert!(dist.get("CacheBehaviors").is_none());
        assert_eq!(
            dist["DefaultCacheBehavior"]["LambdaFunctionAssociations"][0]["EventType"],
            "viewer-request"
        );
    }

    #[test]
    fn test_invalid_static_path_rejected() {
        let origin = S3Origin::new(StorageBucket::declare(&BucketConfig::default()));
        let config = DistributionConfig {
            static_paths: vec!["/*".into()],
            ..DistributionConfig::default()
        };
        assert!(Distribution::declare(&config, origin, version()).is_err());
    }

    #[test]
    fn test_references_origin_identity_and_version() {
        let distribution = declare(&DistributionConfig::default());
        let refs = distribution.resources()[0].1.references();
        assert!(refs.contains(ORIGIN_ACCESS_ID));
        assert!(refs.contains(&version().logical_id));
    }
}
