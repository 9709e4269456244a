//! Error types for template synthesis.

use shipline_core::LogicalId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error(transparent)]
    Stack(#[from] shipline_core::Error),

    #[error("logical id '{0}' is declared twice")]
    DuplicateId(LogicalId),

    #[error("output '{0}' is declared twice")]
    DuplicateOutput(String),

    #[error("'{from}' refers to '{to}', which is not in the template")]
    DanglingReference { from: String, to: LogicalId },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SynthError>;
