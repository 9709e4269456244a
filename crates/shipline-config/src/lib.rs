//! KDL configuration parsing for Shipline.
//!
//! This crate handles:
//! - Stack definitions (shipline.kdl)
//! - Variable expansion for dry-run rendering of build commands

pub mod error;
pub mod stack;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use stack::{load_stack, parse_stack};
pub use variables::{RenderedPhase, VariableContext, VariableContextBuilder};
