//! Variable expansion for dry-run rendering of build commands.
//!
//! Supports the shell forms the build specification uses:
//! - `$NAME` - variable value
//! - `${NAME}` - variable value
//! - `${NAME:=default}` - value, or `default` when unset or empty
//!
//! Known variables are the build environment (`ECR_REPO`, `REGION`, `ID`,
//! `BUCKET`) plus, once a source version is given,
//! `CODEBUILD_RESOLVED_SOURCE_VERSION`, `COMMIT_HASH` and `IMAGE_TAG`.
//! Anything else is left as written. Commands are only rendered, never run.

use regex::Regex;
use shipline_core::buildspec::{
    BuildEnvironment, BuildSpec, COMMIT_TAG_LEN, Phase, SOURCE_VERSION_VAR, image_tag_for,
};
use std::collections::HashMap;
use std::sync::LazyLock;

// Regex for matching $NAME, ${NAME} and ${NAME:=default}
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)(?::=([^}]*))?\}|([A-Za-z_][A-Za-z0-9_]*))")
        .unwrap()
});

/// Variables available to build commands.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    vars: HashMap<String, String>,
}

/// One phase after expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPhase {
    pub phase: Phase,
    pub commands: Vec<String>,
    pub finally: Vec<String>,
}

impl VariableContext {
    /// Create a new empty variable context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.to_string(), value.into());
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|s| s.as_str())
    }

    /// Expand every variable reference in a command.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                if let Some(name) = caps.get(1) {
                    let value = self.resolve(name.as_str());
                    match (value, caps.get(2)) {
                        (Some(""), Some(default)) => default.as_str().to_string(),
                        (Some(v), _) => v.to_string(),
                        // Unknown is not the same as unset; leave it for the shell.
                        (None, _) => caps[0].to_string(),
                    }
                } else {
                    let name = &caps[3];
                    self.resolve(name)
                        .map(str::to_string)
                        .unwrap_or_else(|| caps[0].to_string())
                }
            })
            .to_string()
    }

    /// Interpolate variables in a list of strings.
    pub fn interpolate_vec(&self, inputs: &[String]) -> Vec<String> {
        inputs.iter().map(|s| self.interpolate(s)).collect()
    }

    /// Expand every phase of a build specification, in execution order.
    pub fn render(&self, spec: &BuildSpec) -> Vec<RenderedPhase> {
        spec.ordered_phases()
            .map(|(phase, commands)| RenderedPhase {
                phase,
                commands: self.interpolate_vec(&commands.commands),
                finally: self.interpolate_vec(&commands.finally),
            })
            .collect()
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_environment(mut self, env: &BuildEnvironment) -> Self {
        for var in env.variables() {
            self.ctx.set(&var.name, var.value);
        }
        self
    }

    /// Set the resolved source version and the values the pre-build phase derives from it.
    pub fn with_source_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        let commit_hash: String = version.chars().take(COMMIT_TAG_LEN).collect();
        self.ctx.set("IMAGE_TAG", image_tag_for(&version));
        self.ctx.set("COMMIT_HASH", commit_hash);
        self.ctx.set(SOURCE_VERSION_VAR, version);
        self
    }

    pub fn with_var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.ctx.set(key, value);
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipline_core::ReleaseStack;

    fn stack() -> ReleaseStack {
        let def = crate::parse_stack(
            r#"
            stack "GroceryStack" account="123456789012" region="us-east-1"
            network "grocery-vpc"
            registry "grocery-repo"
            bucket "grocery-assets"
            source "src" owner="octo" repo="grocery-app" branch="master" {
                token-secret "arn:aws:secretsmanager:us-east-1:123456789012:secret:gh-token-AbCdEf"
            }
            build "build" project="grocery-codebuild" {
                run "mvn clean install"
                assets "dist/"
            }
            service "grocery-service"
            pipeline "grocery-pipeline"
            "#,
        )
        .unwrap();
        ReleaseStack::compose(def).unwrap()
    }

    fn render(version: &str) -> Vec<RenderedPhase> {
        let stack = stack();
        let project = &stack.pipeline().build().unwrap().project;
        VariableContextBuilder::new()
            .with_environment(&project.environment)
            .with_source_version(version)
            .build()
            .render(&project.spec)
    }

    fn find<'a>(phases: &'a [RenderedPhase], phase: Phase, prefix: &str) -> &'a str {
        phases
            .iter()
            .find(|p| p.phase == phase)
            .and_then(|p| p.commands.iter().find(|c| c.starts_with(prefix)))
            .map(|s| s.as_str())
            .unwrap()
    }

    #[test]
    fn test_basic_forms() {
        let ctx = VariableContextBuilder::new()
            .with_var("A", "one")
            .with_var("EMPTY", "")
            .build();
        assert_eq!(ctx.interpolate("$A ${A} x$A"), "one one xone");
        assert_eq!(ctx.interpolate("${EMPTY:=fallback}"), "fallback");
        assert_eq!(ctx.interpolate("${A:=fallback}"), "one");
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let ctx = VariableContext::new();
        assert_eq!(ctx.interpolate("echo $HOME ${PATH}"), "echo $HOME ${PATH}");
        assert_eq!(ctx.interpolate("${UNSET:=x}"), "${UNSET:=x}");
        assert_eq!(ctx.interpolate("echo `date`"), "echo `date`");
    }

    #[test]
    fn test_render_with_commit() {
        let phases = render("3f2a9c1d4e5b6a7f8091");
        assert_eq!(phases.len(), 4);
        assert_eq!(
            find(&phases, Phase::Build, "docker tag"),
            "docker tag 123456789012.dkr.ecr.us-east-1.amazonaws.com/grocery-repo:latest \
             123456789012.dkr.ecr.us-east-1.amazonaws.com/grocery-repo:3f2a9c1"
        );
        assert_eq!(find(&phases, Phase::PreBuild, "IMAGE_TAG="), "IMAGE_TAG=3f2a9c1");
        assert_eq!(
            find(&phases, Phase::Build, "aws s3 sync"),
            "aws s3 sync dist/ s3://grocery-assets/"
        );
    }

    #[test]
    fn test_render_without_commit_duplicates_latest() {
        let phases = render("");
        assert_eq!(find(&phases, Phase::PreBuild, "IMAGE_TAG="), "IMAGE_TAG=latest");
        let pushes: Vec<&String> = phases
            .iter()
            .find(|p| p.phase == Phase::Build)
            .unwrap()
            .commands
            .iter()
            .filter(|c| c.starts_with("docker push"))
            .collect();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[0], pushes[1]);
    }

    #[test]
    fn test_image_definitions_ignore_commit() {
        let phases = render("3f2a9c1d4e5b6a7f8091");
        let printf = find(&phases, Phase::PostBuild, "printf");
        assert!(printf.contains("grocery-repo:latest"));
        assert!(!printf.contains("3f2a9c1"));
    }
}
