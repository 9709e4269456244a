//! Template synthesis for Shipline release stacks.
//!
//! Converts a composed [`ReleaseStack`] into the provisioning engine's
//! template format. Every provider contributes its resources through a
//! [`Synthesizer`] implementation:
//! - Network (VPC, subnets, gateways, routes)
//! - Image registry
//! - Asset bucket and its policy
//! - Build project and role
//! - Load-balanced container service
//! - Release pipeline

pub mod buildspec;
pub mod codebuild;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod registry;
pub mod service;
pub mod storage;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

pub use buildspec::{render_buildspec_json, render_buildspec_yaml};
pub use error::{Result, SynthError};
pub use template::{Output, Resource, Template};

use serde_json::json;
use shipline_core::ReleaseStack;
use tracing::{debug, info};

use crate::template::get_att;

/// Read-only view of the stack being synthesized.
pub struct Scope<'a> {
    stack: &'a ReleaseStack,
}

impl<'a> Scope<'a> {
    pub fn new(stack: &'a ReleaseStack) -> Self {
        Self { stack }
    }

    pub fn stack(&self) -> &'a ReleaseStack {
        self.stack
    }
}

/// A declared resource that knows how to render itself into a template.
pub trait Synthesizer {
    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    /// Add this provider's resources. Referenced resources must already be in
    /// the template.
    fn synthesize(&self, scope: &Scope<'_>, template: &mut Template) -> Result<()>;
}

/// Synthesize the whole stack.
///
/// Providers are rendered in dependency order: network, registry, bucket,
/// build project, service, then the pipeline that references them.
pub fn synthesize(stack: &ReleaseStack) -> Result<Template> {
    let scope = Scope::new(stack);
    let env = stack.environment();
    let mut template = Template::new(format!(
        "Release stack {} ({} in {})",
        stack.name(),
        env.account,
        env.region
    ));

    let release = stack.pipeline();
    let mut providers: Vec<&dyn Synthesizer> = vec![
        stack.network() as &dyn Synthesizer,
        stack.registry(),
        stack.bucket(),
    ];
    if let Some(build) = release.build() {
        providers.push(&build.project);
    }
    if let Some(deploy) = release.deploy() {
        providers.push(&deploy.service);
    }
    providers.push(release);

    for provider in providers {
        let before = template.resources.len();
        provider.synthesize(&scope, &mut template)?;
        debug!(
            provider = provider.kind(),
            resources = template.resources.len() - before,
            "Provider synthesized"
        );
    }

    if let Some(deploy) = release.deploy() {
        template.add_output(
            "LoadBalancerDNS",
            "Public DNS name of the service load balancer",
            get_att(&service::load_balancer_id(&deploy.service), "DNSName"),
        )?;
    }
    template.add_output(
        "BucketWebsiteURL",
        "Website endpoint of the asset bucket",
        json!(stack.bucket().website_url(&env.region)),
    )?;
    template.add_output(
        "RegistryURI",
        "Image repository URI",
        json!(stack.registry().uri()),
    )?;

    info!(
        stack = %stack.name(),
        resources = template.resources.len(),
        outputs = template.outputs.len(),
        "Template synthesized"
    );

    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesis_is_deterministic() {
        let first = synthesize(&testing::stack()).unwrap().to_json().unwrap();
        let second = synthesize(&testing::stack()).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_outputs() {
        let template = synthesize(&testing::stack()).unwrap();
        assert_eq!(
            template.outputs["RegistryURI"].value,
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/grocery-repo"
        );
        assert_eq!(
            template.outputs["BucketWebsiteURL"].value,
            "http://grocery-assets.s3-website-us-east-1.amazonaws.com"
        );
        assert!(template.outputs.contains_key("LoadBalancerDNS"));
    }

    #[test]
    fn test_resource_inventory() {
        let template = synthesize(&testing::stack()).unwrap();
        for resource_type in [
            "AWS::EC2::VPC",
            "AWS::ECR::Repository",
            "AWS::S3::BucketPolicy",
            "AWS::CodeBuild::Project",
            "AWS::ECS::Service",
            "AWS::CodePipeline::Pipeline",
            "AWS::CodePipeline::Webhook",
        ] {
            assert_eq!(
                template.resources_of_type(resource_type).count(),
                1,
                "{}",
                resource_type
            );
        }
        // The asset bucket and the pipeline's artifact store.
        assert_eq!(template.resources_of_type("AWS::S3::Bucket").count(), 2);
    }

    #[test]
    fn test_shared_names_across_providers() {
        let mut definition = testing::stack_definition();
        definition.registry_name = "grocery".to_string();
        definition.bucket.name = "grocery".to_string();
        definition.pipeline.build.project_name = "grocery".to_string();
        definition.pipeline.name = "grocery".to_string();
        definition.pipeline.service.name = "grocery".to_string();
        definition.network.name = "grocery".to_string();
        let stack = ReleaseStack::compose(definition).unwrap();

        let template = synthesize(&stack).unwrap();
        assert_eq!(template.resources_of_type("AWS::ECR::Repository").count(), 1);
        assert_eq!(template.resources_of_type("AWS::S3::Bucket").count(), 2);
        assert_eq!(template.resources_of_type("AWS::IAM::Role").count(), 4);
    }

    #[test]
    fn test_every_ref_resolves() {
        let template = synthesize(&testing::stack()).unwrap();
        let json = template.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        fn collect<'a>(value: &'a serde_json::Value, refs: &mut Vec<&'a str>) {
            match value {
                serde_json::Value::Object(map) => {
                    if let Some(serde_json::Value::String(id)) = map.get("Ref") {
                        refs.push(id);
                    }
                    if let Some(serde_json::Value::Array(att)) = map.get("Fn::GetAtt") {
                        if let Some(serde_json::Value::String(id)) = att.first() {
                            refs.push(id);
                        }
                    }
                    map.values().for_each(|v| collect(v, refs));
                }
                serde_json::Value::Array(items) => items.iter().for_each(|v| collect(v, refs)),
                _ => {}
            }
        }

        let mut refs = Vec::new();
        collect(&value["Resources"], &mut refs);
        collect(&value["Outputs"], &mut refs);
        assert!(!refs.is_empty());
        for id in refs {
            if id.starts_with("AWS::") {
                continue;
            }
            assert!(
                value["Resources"].get(id).is_some(),
                "dangling reference to {}",
                id
            );
        }
    }
}
