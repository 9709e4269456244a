//! CLI command implementations.

pub mod describe;
pub mod render;
pub mod synth;

use anyhow::{Context, Result};
use clap::ValueEnum;
use shipline_core::ReleaseStack;
use std::path::Path;

/// Output format for the build specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BuildspecFormat {
    Yaml,
    Json,
}

/// Parse the definition and compose the stack.
pub fn load(path: &Path) -> Result<ReleaseStack> {
    let definition = shipline_config::load_stack(path)
        .with_context(|| format!("Failed to load stack definition: {}", path.display()))?;
    ReleaseStack::compose(definition)
        .with_context(|| format!("Invalid stack definition: {}", path.display()))
}

pub fn validate(path: &Path) -> Result<()> {
    match load(path) {
        Ok(_stack) => {
            println!("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

pub fn buildspec(path: &Path, format: BuildspecFormat) -> Result<String> {
    let stack = load(path)?;
    let build = stack
        .pipeline()
        .build()
        .context("Pipeline has no build action")?;
    let rendered = match format {
        BuildspecFormat::Yaml => shipline_synth::render_buildspec_yaml(&build.project.spec)?,
        BuildspecFormat::Json => {
            let mut json = shipline_synth::render_buildspec_json(&build.project.spec)?;
            json.push('\n');
            json
        }
    };
    Ok(rendered)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;
    use tempfile::TempDir;

    pub const GROCERY: &str = r#"
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
}
pipeline "grocery-pipeline" {
    deploy-action "Deploy"
}
"#;

    pub fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipline.kdl");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }
}
