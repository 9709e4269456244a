//! Build specification rendering.

use shipline_core::buildspec::BuildSpec;

use crate::Result;

/// The form embedded in the build project.
pub fn render_buildspec_json(spec: &BuildSpec) -> Result<String> {
    Ok(serde_json::to_string_pretty(spec)?)
}

/// The form a repository would check in as `buildspec.yml`.
pub fn render_buildspec_yaml(spec: &BuildSpec) -> Result<String> {
    Ok(serde_yaml::to_string(spec)?)
}
