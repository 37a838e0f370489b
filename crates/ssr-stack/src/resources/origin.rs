//! Bucket origin reachable only through the distribution.

use serde_json::{json, Value};

use super::{Declaration, StorageBucket};
use crate::template::{get_att, join, reference, Resource};

/// Logical id of the origin access identity.
pub const ORIGIN_ACCESS_ID: &str = "OriginAccessIdentity";
/// Logical id of the bucket policy granting the identity read access.
pub const BUCKET_POLICY_ID: &str = "BucketPolicy";
/// Origin id used inside the distribution.
pub const ORIGIN_ID: &str = "BucketOrigin";

/// The bucket exposed as a distribution origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Origin {
    bucket: StorageBucket,
}

impl S3Origin {
    /// Expose a bucket through an origin access identity.
    pub fn new(bucket: StorageBucket) -> Self {
        Self { bucket }
    }

    /// Origin id used by cache behaviors.
    pub fn id(&self) -> &'static str {
        ORIGIN_ID
    }

    /// The underlying bucket.
    pub fn bucket(&self) -> &StorageBucket {
        &self.bucket
    }

    /// Origin entry for the distribution config.
    pub fn origin_config(&self) -> Value {
        json!({
            "Id": ORIGIN_ID,
            "DomainName": self.bucket.regional_domain_name(),
            "S3OriginConfig": {
                "OriginAccessIdentity": join(vec![
                    json!("origin-access-identity/cloudfront/"),
                    reference(ORIGIN_ACCESS_ID),
                ])
            }
        })
    }

    fn identity(&self) -> Resource {
        Resource::new(
            "AWS::CloudFront::CloudFrontOriginAccessIdentity",
            json!({
                "CloudFrontOriginAccessIdentityConfig": {
                    "Comment": "Identity for the SSR bucket origin"
                }
            }),
        )
    }

    fn bucket_policy(&self) -> Resource {
        Resource::new(
            "AWS::S3::BucketPolicy",
            json!({
                "Bucket": self.bucket.name(),
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": "s3:GetObject",
                        "Effect": "Allow",
                        "Principal": {
                            "CanonicalUser": get_att(ORIGIN_ACCESS_ID, "S3CanonicalUserId")
                        },
                        "Resource": join(vec![self.bucket.arn(), json!("/*")])
                    }]
                }
            }),
        )
    }
}

impl Declaration for S3Origin {
    fn resources(&self) -> Vec<(String, Resource)> {
        vec![
            (ORIGIN_ACCESS_ID.to_string(), self.identity()),
            (BUCKET_POLICY_ID.to_string(), self.bucket_policy()),
        ]
    }
}
