//! Stack definition parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use shipline_core::buildspec::ReleaseSettings;
use shipline_core::deployer::{HealthCheck, ServiceSpec};
use shipline_core::network::{Cidr, NetworkSpec};
use shipline_core::pipeline::{BuildSettings, DEFAULT_BUILD_IMAGE, PipelineSettings, SourceSettings};
use shipline_core::storage::BucketSpec;
use shipline_core::{Environment, StackDefinition};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const DEFAULT_CIDR: &str = "10.0.0.0/16";
const DEFAULT_MAX_AZS: i128 = 2;
const DEFAULT_DOCUMENT: &str = "index.html";
const DEFAULT_CONTAINER_PORT: i128 = 8080;
const DEFAULT_MEMORY_MIB: i128 = 512;
const DEFAULT_CPU: i128 = 256;

/// Read and parse a stack definition file.
pub fn load_stack(path: impl AsRef<Path>) -> ConfigResult<StackDefinition> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading stack definition");
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_stack(&content)
}

/// Parse a stack definition from KDL text.
pub fn parse_stack(kdl: &str) -> ConfigResult<StackDefinition> {
    let doc: KdlDocument = kdl.parse()?;

    let mut seen = HashSet::new();
    for node in doc.nodes() {
        let name = node.name().value();
        if !seen.insert(name) {
            return Err(ConfigError::Duplicate(format!("'{}' node", name)));
        }
    }

    let stack = require_node(&doc, "stack")?;
    let stack_name = require_first_arg(stack, "stack name")?;
    let environment = Environment::new(
        require_string_prop(stack, "account", "stack account")?,
        require_string_prop(stack, "region", "stack region")?,
    )?;

    let network = parse_network(require_node(&doc, "network")?)?;

    let registry_name = require_first_arg(require_node(&doc, "registry")?, "registry name")?;

    let bucket = parse_bucket(require_node(&doc, "bucket")?)?;

    let source_node = require_node(&doc, "source")?;
    let source = parse_source(source_node)?;
    let github_token_arn = child_string(source_node, "token-secret")
        .ok_or_else(|| ConfigError::MissingField("source token-secret".to_string()))?;

    let service = parse_service(require_node(&doc, "service")?, &registry_name)?;
    // The image-definitions entry must name the task's container.
    let build = parse_build(require_node(&doc, "build")?, &service.container_name)?;

    let pipeline_node = require_node(&doc, "pipeline")?;
    let pipeline = PipelineSettings {
        name: require_first_arg(pipeline_node, "pipeline name")?,
        source,
        build,
        deploy_action_name: child_string(pipeline_node, "deploy-action")
            .unwrap_or_else(|| "Deploy".to_string()),
        service,
        approval_gate: get_bool_prop(pipeline_node, "approval").unwrap_or(false),
    };

    Ok(StackDefinition {
        name: stack_name,
        environment,
        network,
        registry_name,
        bucket,
        github_token_arn,
        pipeline,
    })
}

fn parse_network(node: &KdlNode) -> ConfigResult<NetworkSpec> {
    let name = require_first_arg(node, "network name")?;
    let cidr = get_string_prop(node, "cidr").unwrap_or_else(|| DEFAULT_CIDR.to_string());
    let cidr = cidr.parse::<Cidr>().map_err(|e| ConfigError::InvalidValue {
        field: "network cidr".to_string(),
        message: e.to_string(),
    })?;
    let max_azs = get_integer_prop(node, "max-azs").unwrap_or(DEFAULT_MAX_AZS);

    Ok(NetworkSpec {
        name,
        cidr,
        max_azs: to_unsigned("network max-azs", max_azs)?,
    })
}

fn parse_bucket(node: &KdlNode) -> ConfigResult<BucketSpec> {
    Ok(BucketSpec {
        name: require_first_arg(node, "bucket name")?,
        index_document: child_string(node, "index").unwrap_or_else(|| DEFAULT_DOCUMENT.to_string()),
        error_document: child_string(node, "error").unwrap_or_else(|| DEFAULT_DOCUMENT.to_string()),
    })
}

fn parse_source(node: &KdlNode) -> ConfigResult<SourceSettings> {
    Ok(SourceSettings {
        action_name: require_first_arg(node, "source action name")?,
        owner: require_string_prop(node, "owner", "source owner")?,
        repo: require_string_prop(node, "repo", "source repo")?,
        branch: require_string_prop(node, "branch", "source branch")?,
    })
}

fn parse_build(node: &KdlNode, container_name: &str) -> ConfigResult<BuildSettings> {
    let action_name = require_first_arg(node, "build action name")?;
    let project_name = require_string_prop(node, "project", "build project")?;

    let mut compile_commands = Vec::new();
    let mut build_image = DEFAULT_BUILD_IMAGE.to_string();
    let mut privileged = true;
    let mut assets_dir = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "run" => {
                    if let Some(cmd) = get_first_string_arg(child) {
                        compile_commands.push(cmd);
                    }
                }
                "image" => {
                    build_image = get_first_string_arg(child).unwrap_or(build_image);
                }
                "privileged" => {
                    privileged = get_first_bool_arg(child).unwrap_or(privileged);
                }
                "assets" => {
                    assets_dir = get_first_string_arg(child);
                }
                _ => {}
            }
        }
    }

    if compile_commands.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "run command for build '{}'",
            action_name
        )));
    }

    Ok(BuildSettings {
        action_name,
        project_name,
        build_image,
        privileged,
        release: ReleaseSettings {
            container_name: container_name.to_string(),
            compile_commands,
            assets_dir: assets_dir
                .ok_or_else(|| ConfigError::MissingField("build assets".to_string()))?,
        },
    })
}

fn parse_service(node: &KdlNode, registry_name: &str) -> ConfigResult<ServiceSpec> {
    let name = require_first_arg(node, "service name")?;

    let mut spec = ServiceSpec {
        name,
        container_name: registry_name.to_string(),
        container_port: 0,
        desired_count: 1,
        memory_mib: 0,
        cpu: 0,
        assign_public_ip: true,
        health_check: HealthCheck::default(),
    };
    let mut port = DEFAULT_CONTAINER_PORT;
    let mut memory = DEFAULT_MEMORY_MIB;
    let mut cpu = DEFAULT_CPU;
    let mut desired = 1;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "container" => {
                    if let Some(container) = get_first_string_arg(child) {
                        spec.container_name = container;
                    }
                }
                "port" => port = get_first_integer_arg(child).unwrap_or(port),
                "memory" => memory = get_first_integer_arg(child).unwrap_or(memory),
                "cpu" => cpu = get_first_integer_arg(child).unwrap_or(cpu),
                "desired-count" => desired = get_first_integer_arg(child).unwrap_or(desired),
                "public-ip" => {
                    spec.assign_public_ip = get_first_bool_arg(child).unwrap_or(true);
                }
                "health-check" => spec.health_check = parse_health_check(child)?,
                _ => {}
            }
        }
    }

    spec.container_port = u16::try_from(port).map_err(|_| ConfigError::InvalidValue {
        field: "service port".to_string(),
        message: format!("{} is not a valid port", port),
    })?;
    spec.memory_mib = to_unsigned("service memory", memory)?;
    spec.cpu = to_unsigned("service cpu", cpu)?;
    spec.desired_count = to_unsigned("service desired-count", desired)?;

    Ok(spec)
}

fn parse_health_check(node: &KdlNode) -> ConfigResult<HealthCheck> {
    let defaults = HealthCheck::default();
    let prop = |name: &str, default: u32| -> ConfigResult<u32> {
        match get_integer_prop(node, name) {
            Some(v) => to_unsigned(&format!("health-check {}", name), v),
            None => Ok(default),
        }
    };

    Ok(HealthCheck {
        interval_seconds: prop("interval", defaults.interval_seconds)?,
        timeout_seconds: prop("timeout", defaults.timeout_seconds)?,
        healthy_threshold: prop("healthy", defaults.healthy_threshold)?,
        unhealthy_threshold: prop("unhealthy", defaults.unhealthy_threshold)?,
    })
}

// Helper functions for extracting values from KDL nodes

fn require_node<'a>(doc: &'a KdlDocument, name: &str) -> ConfigResult<&'a KdlNode> {
    doc.nodes()
        .iter()
        .find(|n| n.name().value() == name)
        .ok_or_else(|| ConfigError::MissingField(format!("'{}' node", name)))
}

fn require_first_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn require_string_prop(node: &KdlNode, name: &str, field: &str) -> ConfigResult<String> {
    get_string_prop(node, name).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

fn get_integer_prop(node: &KdlNode, name: &str) -> Option<i128> {
    node.get(name).and_then(|v| v.as_integer())
}

/// First string argument of the first child called `name`.
fn child_string(node: &KdlNode, name: &str) -> Option<String> {
    node.children()?
        .nodes()
        .iter()
        .find(|c| c.name().value() == name)
        .and_then(get_first_string_arg)
}

fn to_unsigned<T: TryFrom<i128>>(field: &str, value: i128) -> ConfigResult<T> {
    T::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{} is out of range", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipline_core::ReleaseStack;

    const GROCERY: &str = r#"
        stack "GroceryStack" account="123456789012" region="us-east-1"

        network "grocery-vpc" cidr="10.0.0.0/16" max-azs=2

        registry "grocery-repo"

        bucket "grocery-assets" {
            index "index.html"
            error "index.html"
        }

        source "grocery-source" owner="octo" repo="grocery-app" branch="master" {
            token-secret "arn:aws:secretsmanager:us-east-1:123456789012:secret:gh/oauth/token-AbCdEf"
        }

        build "grocery-codebuild-action" project="grocery-codebuild" {
            run "mvn clean install"
            assets "dist/ui-test/browser/"
        }

        service "grocery-fargate-service" {
            port 8080
            memory 512
            cpu 256
            health-check interval=120 timeout=119 healthy=2 unhealthy=2
        }

        pipeline "grocery-pipeline"
    "#;

    #[test]
    fn test_parse_full_stack() {
        let def = parse_stack(GROCERY).unwrap();
        assert_eq!(def.name, "GroceryStack");
        assert_eq!(def.environment.account, "123456789012");
        assert_eq!(def.network.max_azs, 2);
        assert_eq!(def.registry_name, "grocery-repo");
        assert_eq!(def.bucket.index_document, "index.html");
        assert_eq!(def.pipeline.source.branch, "master");
        assert_eq!(def.pipeline.build.release.compile_commands, vec!["mvn clean install"]);
        assert_eq!(def.pipeline.build.build_image, DEFAULT_BUILD_IMAGE);
        assert!(def.pipeline.build.privileged);
        assert_eq!(def.pipeline.service.container_name, "grocery-repo");
        assert_eq!(def.pipeline.build.release.container_name, "grocery-repo");
        assert_eq!(def.pipeline.service.health_check, HealthCheck::default());
        assert_eq!(def.pipeline.deploy_action_name, "Deploy");
        assert!(!def.pipeline.approval_gate);
    }

    #[test]
    fn test_parsed_stack_composes() {
        let stack = ReleaseStack::compose(parse_stack(GROCERY).unwrap()).unwrap();
        assert_eq!(stack.pipeline().pipeline().stages().len(), 3);
    }

    #[test]
    fn test_defaults_apply() {
        let kdl = GROCERY
            .replace(r#" cidr="10.0.0.0/16" max-azs=2"#, "")
            .replace("pipeline \"grocery-pipeline\"", "pipeline \"grocery-pipeline\" approval=#true");
        let def = parse_stack(&kdl).unwrap();
        assert_eq!(def.network.cidr.to_string(), "10.0.0.0/16");
        assert_eq!(def.network.max_azs, 2);
        assert!(def.pipeline.approval_gate);
    }

    #[test]
    fn test_missing_token_secret() {
        let kdl = GROCERY.replace(
            r#"token-secret "arn:aws:secretsmanager:us-east-1:123456789012:secret:gh/oauth/token-AbCdEf""#,
            "",
        );
        let result = parse_stack(&kdl);
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_missing_node() {
        let kdl = GROCERY.replace("registry \"grocery-repo\"", "");
        let result = parse_stack(&kdl);
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_duplicate_node() {
        let kdl = format!("{}\nregistry \"other\"\n", GROCERY);
        let result = parse_stack(&kdl);
        assert!(matches!(result, Err(ConfigError::Duplicate(_))));
    }

    #[test]
    fn test_invalid_environment() {
        let kdl = GROCERY.replace("123456789012\" region", "12\" region");
        let result = parse_stack(&kdl);
        assert!(matches!(result, Err(ConfigError::Stack(_))));
    }

    #[test]
    fn test_build_without_commands() {
        let kdl = GROCERY.replace("run \"mvn clean install\"", "");
        let result = parse_stack(&kdl);
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_container_override_reaches_build() {
        let kdl = GROCERY.replace("port 8080", "port 8080\n            container \"web\"");
        let def = parse_stack(&kdl).unwrap();
        assert_eq!(def.pipeline.service.container_name, "web");
        assert_eq!(def.pipeline.build.release.container_name, "web");
    }

    #[test]
    fn test_bad_port() {
        let kdl = GROCERY.replace("port 8080", "port 70000");
        let result = parse_stack(&kdl);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_oversized_zone_count_fails_to_compose() {
        let kdl = GROCERY.replace("max-azs=2", "max-azs=9223372036854775808");
        let def = parse_stack(&kdl).unwrap();
        assert!(ReleaseStack::compose(def).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_stack("/nonexistent/shipline.kdl");
        match result {
            Err(ConfigError::Read { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent/shipline.kdl"))
            }
            other => panic!("expected read error, got {:?}", other),
        }
    }
}
