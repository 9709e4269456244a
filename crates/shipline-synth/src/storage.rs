//! Asset bucket with website hosting and its public-read policy.

use serde_json::{Value, json};

use shipline_core::LogicalId;
use shipline_core::storage::{Bucket, Effect, PolicyDocument, Principal};

use crate::template::{Resource, Template, reference};
use crate::{Result, Scope, Synthesizer};

const SCOPE: &str = "AssetBucket";

pub fn bucket_id(bucket: &Bucket) -> LogicalId {
    LogicalId::from_path(&[SCOPE, bucket.name(), "Resource"])
}

pub fn policy_id(bucket: &Bucket) -> LogicalId {
    LogicalId::from_path(&[SCOPE, bucket.name(), "Policy"])
}

/// Render a resource policy in the engine's document format.
pub fn policy_document(policy: &PolicyDocument) -> Value {
    let statements: Vec<Value> = policy
        .statements
        .iter()
        .map(|s| {
            let principals: Vec<&str> = s
                .principals
                .iter()
                .map(|p| match p {
                    Principal::Any => "*",
                    Principal::Arn(arn) => arn.as_str(),
                })
                .collect();
            let principal = match principals.as_slice() {
                [single] => json!({ "AWS": single }),
                many => json!({ "AWS": many }),
            };
            json!({
                "Sid": s.sid,
                "Effect": match s.effect {
                    Effect::Allow => "Allow",
                    Effect::Deny => "Deny",
                },
                "Principal": principal,
                "Action": s.actions,
                "Resource": s.resources,
            })
        })
        .collect();
    json!({ "Version": "2012-10-17", "Statement": statements })
}

impl Synthesizer for Bucket {
    fn kind(&self) -> &'static str {
        "bucket"
    }

    fn synthesize(&self, _scope: &Scope<'_>, template: &mut Template) -> Result<()> {
        let bucket = bucket_id(self);
        template.add(
            bucket.clone(),
            Resource::new(
                "AWS::S3::Bucket",
                json!({
                    "BucketName": self.name(),
                    // All four flags stay off so the public-read policy applies.
                    "PublicAccessBlockConfiguration": {
                        "BlockPublicAcls": false,
                        "BlockPublicPolicy": false,
                        "IgnorePublicAcls": false,
                        "RestrictPublicBuckets": false,
                    },
                    "WebsiteConfiguration": {
                        "IndexDocument": self.index_document(),
                        "ErrorDocument": self.error_document(),
                    },
                }),
            ),
        )?;
        template.add(
            policy_id(self),
            Resource::new(
                "AWS::S3::BucketPolicy",
                json!({
                    "Bucket": reference(&bucket),
                    "PolicyDocument": policy_document(self.policy()),
                }),
            ),
        )
    }
}
