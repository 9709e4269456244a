//! Human-readable pipeline summary.

use anyhow::Result;
use std::fmt::Write;
use std::path::Path;

use shipline_core::ReleaseStack;
use shipline_core::pipeline::Action;

pub fn run(config: &Path) -> Result<String> {
    let stack = super::load(config)?;
    describe(&stack)
}

fn describe(stack: &ReleaseStack) -> Result<String> {
    let mut out = String::new();
    let env = stack.environment();
    let release = stack.pipeline();
    let pipeline = release.pipeline();

    writeln!(out, "Stack: {} ({} / {})", stack.name(), env.account, env.region)?;
    writeln!(out, "Pipeline: {}", pipeline.name())?;
    for (i, stage) in pipeline.stages().iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, stage.name)?;
        for action in &stage.actions {
            let inputs: Vec<&str> = action.inputs().into_iter().map(|a| a.name()).collect();
            let outputs: Vec<&str> = action.outputs().into_iter().map(|a| a.name()).collect();
            write!(out, "       {} [{}]", action.name(), action.kind())?;
            if !inputs.is_empty() {
                write!(out, " in: {}", inputs.join(", "))?;
            }
            if !outputs.is_empty() {
                write!(out, " out: {}", outputs.join(", "))?;
            }
            writeln!(out)?;
            match action {
                Action::Source(source) => {
                    writeln!(
                        out,
                        "         {} ({})",
                        source.repository_url()?,
                        source.branch
                    )?;
                }
                Action::Deploy(deploy) => {
                    writeln!(out, "         image: {}", deploy.service.image())?;
                }
                Action::Build(build) => {
                    writeln!(out, "         project: {}", build.project.name)?;
                }
                Action::Approval(_) => {}
            }
        }
    }

    if release.is_approval_gated() {
        writeln!(out, "Approval: '{}' gates Deploy", release.approval().name)?;
    } else {
        writeln!(
            out,
            "Approval: '{}' declared, not wired into any stage",
            release.approval().name
        )?;
    }

    writeln!(out, "Artifacts:")?;
    for flow in pipeline.artifact_flow() {
        let consumers: Vec<String> = flow
            .consumers
            .iter()
            .map(|(stage, action)| format!("{}/{}", stage, action))
            .collect();
        writeln!(
            out,
            "  {}: {}/{} -> {}",
            flow.artifact,
            flow.producer.0,
            flow.producer.1,
            if consumers.is_empty() {
                "(unused)".to_string()
            } else {
                consumers.join(", ")
            }
        )?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;

    #[test]
    fn test_describe_grocery_stack() {
        let (_dir, config) = testing::write_config(testing::GROCERY);
        let out = run(&config).unwrap();
        assert!(out.contains("Pipeline: grocery-pipeline"));
        assert!(out.contains("  1. Source\n"));
        assert!(out.contains("  3. Deploy\n"));
        assert!(out.contains("not wired into any stage"));
        assert!(out.contains("https://github.com/octo/grocery-app (master)"));
        assert!(out.contains(
            "SourceOutput: Source/grocery-source -> Build/grocery-codebuild-action"
        ));
        assert!(out.contains("BuildOutput: Build/grocery-codebuild-action -> Deploy/Deploy"));
    }

    #[test]
    fn test_describe_gated() {
        let gated = testing::GROCERY.replace(
            "pipeline \"grocery-pipeline\"",
            "pipeline \"grocery-pipeline\" approval=#true",
        );
        let (_dir, config) = testing::write_config(&gated);
        let out = run(&config).unwrap();
        assert!(out.contains("  3. Approve\n"));
        assert!(out.contains("Approval: 'Approve' gates Deploy"));
    }
}
