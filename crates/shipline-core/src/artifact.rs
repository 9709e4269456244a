//! Pipeline artifacts.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// An opaque handle for data passed between pipeline stages.
///
/// Artifacts are created once per pipeline and passed by reference: one
/// action declares it as an output, later actions declare it as an input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{name}")]
pub struct Artifact {
    name: String,
}

impl Artifact {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Files a build action publishes into its output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFiles {
    pub files: Vec<String>,
}

impl ArtifactFiles {
    pub fn single(file: impl Into<String>) -> Self {
        Self {
            files: vec![file.into()],
        }
    }
}
