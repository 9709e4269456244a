//! Stack definition errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stack definition is not valid KDL: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("stack definition is missing {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("stack definition rejected: {0}")]
    Stack(#[from] shipline_core::Error),

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
