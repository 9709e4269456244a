//! Error types for Shipline.

use thiserror::Error;

/// Declaration-time errors. Anything that goes wrong after the declaration
/// is handed to the provisioning engine is reported by that engine, not here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
