//! Shared fixtures for unit tests.

use shipline_core::buildspec::ReleaseSettings;
use shipline_core::deployer::{HealthCheck, ServiceSpec};
use shipline_core::network::NetworkSpec;
use shipline_core::pipeline::{BuildSettings, DEFAULT_BUILD_IMAGE, PipelineSettings, SourceSettings};
use shipline_core::storage::BucketSpec;
use shipline_core::{Environment, ReleaseStack, StackDefinition};

pub const TOKEN_ARN: &str = "arn:aws:secretsmanager:us-east-1:123456789012:secret:gh/oauth/token-AbCdEf";

pub fn stack_definition() -> StackDefinition {
    StackDefinition {
        name: "GroceryStack".to_string(),
        environment: Environment::new("123456789012", "us-east-1").unwrap(),
        network: NetworkSpec {
            name: "grocery-vpc".to_string(),
            cidr: "10.0.0.0/16".parse().unwrap(),
            max_azs: 2,
        },
        registry_name: "grocery-repo".to_string(),
        bucket: BucketSpec {
            name: "grocery-assets".to_string(),
            index_document: "index.html".to_string(),
            error_document: "index.html".to_string(),
        },
        github_token_arn: TOKEN_ARN.to_string(),
        pipeline: PipelineSettings {
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
        },
    }
}

pub fn stack() -> ReleaseStack {
    ReleaseStack::compose(stack_definition()).unwrap()
}
