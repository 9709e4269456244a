//! Shared fixtures for unit tests.

use crate::buildspec::ReleaseSettings;
use crate::deployer::{HealthCheck, ServiceSpec};
use crate::network::{Network, NetworkSpec};
use crate::pipeline::{
    BuildSettings, DEFAULT_BUILD_IMAGE, PipelineProps, PipelineSettings, SourceSettings,
};
use crate::registry::Registry;
use crate::secret::SecretRef;
use crate::stack::{Environment, StackDefinition};
use crate::storage::{Bucket, BucketSpec};

pub const TOKEN_ARN: &str = "arn:aws:secretsmanager:us-east-1:123456789012:secret:gh/oauth/token-AbCdEf";

pub fn environment() -> Environment {
    Environment::new("123456789012", "us-east-1").unwrap()
}

pub fn secret() -> SecretRef {
    SecretRef::from_complete_arn(TOKEN_ARN).unwrap()
}

pub fn network_spec() -> NetworkSpec {
    NetworkSpec {
        name: "grocery-vpc".to_string(),
        cidr: "10.0.0.0/16".parse().unwrap(),
        max_azs: 2,
    }
}

pub fn bucket_spec() -> BucketSpec {
    BucketSpec {
        name: "grocery-assets".to_string(),
        index_document: "index.html".to_string(),
        error_document: "index.html".to_string(),
    }
}

pub fn props() -> PipelineProps {
    PipelineProps {
        github_token: secret(),
        registry: Registry::new("grocery-repo", &environment()).unwrap(),
        network: Network::new(network_spec()).unwrap(),
        bucket: Bucket::new(bucket_spec()).unwrap(),
    }
}

pub fn pipeline_settings() -> PipelineSettings {
    PipelineSettings {
        name: "grocery-pipeline".to_string(),
        source: SourceSettings {
            action_name: "grocery-source".to_string(),
            owner: "octo".to_string(),
            repo: "grocery-app".to_string(),
            branch: "master".to_string(),
        },
        build: BuildSettings {
            action_name: "grocery-codebuild-action".to_string(),
            project_name: "grocery-codebuild".to_string(),
            build_image: DEFAULT_BUILD_IMAGE.to_string(),
            privileged: true,
            release: ReleaseSettings {
                container_name: "grocery-repo".to_string(),
                compile_commands: vec!["mvn clean install".to_string()],
                assets_dir: "dist/ui-test/browser/".to_string(),
            },
        },
        deploy_action_name: "Deploy".to_string(),
        service: ServiceSpec {
            name: "grocery-fargate-service".to_string(),
            container_name: "grocery-repo".to_string(),
            container_port: 8080,
            desired_count: 1,
            memory_mib: 512,
            cpu: 256,
            assign_public_ip: true,
            health_check: HealthCheck::default(),
        },
        approval_gate: false,
    }
}

pub fn stack_definition() -> StackDefinition {
    StackDefinition {
        name: "GroceryStack".to_string(),
        environment: environment(),
        network: network_spec(),
        registry_name: "grocery-repo".to_string(),
        bucket: bucket_spec(),
        github_token_arn: TOKEN_ARN.to_string(),
        pipeline: pipeline_settings(),
    }
}
