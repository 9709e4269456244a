//! Dry-run expansion of the build commands.

use anyhow::{Context, Result};
use std::fmt::Write;
use std::path::Path;

use shipline_config::VariableContextBuilder;

pub fn run(config: &Path, source_version: &str) -> Result<String> {
    let stack = super::load(config)?;
    let build = stack
        .pipeline()
        .build()
        .context("Pipeline has no build action")?;

    let ctx = VariableContextBuilder::new()
        .with_environment(&build.project.environment)
        .with_source_version(source_version)
        .build();

    let mut out = String::new();
    for phase in ctx.render(&build.project.spec) {
        writeln!(out, "{}:", phase.phase)?;
        for command in &phase.commands {
            writeln!(out, "  $ {}", command)?;
        }
        for command in &phase.finally {
            writeln!(out, "  finally $ {}", command)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;

    #[test]
    fn test_render_expands_tag() {
        let (_dir, config) = testing::write_config(testing::GROCERY);
        let out = run(&config, "3f2a9c1d4e5b6a7f").unwrap();
        assert!(out.starts_with("install:\n  $ yum update -y\n"));
        assert!(out.contains(
            "  $ docker push 123456789012.dkr.ecr.us-east-1.amazonaws.com/grocery-repo:3f2a9c1\n"
        ));
        assert!(out.contains("  finally $ echo Done building code\n"));
    }
}
