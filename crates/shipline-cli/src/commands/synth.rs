//! Template synthesis command.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use shipline_core::buildspec::IMAGE_DEFINITIONS_FILE;

pub const BUILDSPEC_FILE: &str = "buildspec.yml";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Describes one synthesis run.
#[derive(Debug, Serialize)]
pub struct Manifest {
    pub version: String,
    pub stack: String,
    pub account: String,
    pub region: String,
    pub template: String,
    pub buildspec: String,
    pub image_definitions: String,
    pub resources: usize,
    pub synthesized_at: DateTime<Utc>,
}

/// Synthesize the stack into `out_dir` and return the files written.
pub fn run(config: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let stack = super::load(config)?;
    let template = shipline_synth::synthesize(&stack)?;
    let build = stack
        .pipeline()
        .build()
        .context("Pipeline has no build action")?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let template_file = format!("{}.template.json", stack.name());
    let manifest = Manifest {
        version: env!("CARGO_PKG_VERSION").to_string(),
        stack: stack.name().to_string(),
        account: stack.environment().account.clone(),
        region: stack.environment().region.clone(),
        template: template_file.clone(),
        buildspec: BUILDSPEC_FILE.to_string(),
        image_definitions: IMAGE_DEFINITIONS_FILE.to_string(),
        resources: template.resources.len(),
        synthesized_at: Utc::now(),
    };

    let files = [
        (template_file, template.to_json()?),
        (
            BUILDSPEC_FILE.to_string(),
            shipline_synth::render_buildspec_yaml(&build.project.spec)?,
        ),
        (MANIFEST_FILE.to_string(), serde_json::to_string_pretty(&manifest)?),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = out_dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    info!(
        stack = %stack.name(),
        out_dir = %out_dir.display(),
        resources = template.resources.len(),
        "Synthesis complete"
    );

    Ok(written)
}
