//! Core domain types for Shipline release stacks.
//!
//! This crate contains:
//! - Logical resource identifiers and common types
//! - Network, registry and bucket providers
//! - Build specification and build environment
//! - Deployment target (load-balanced container service)
//! - Pipeline, stage, action and artifact definitions
//! - Stack composition

pub mod artifact;
pub mod buildspec;
pub mod deployer;
pub mod error;
pub mod id;
pub mod network;
pub mod pipeline;
pub mod registry;
pub mod secret;
pub mod stack;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use id::LogicalId;
pub use stack::{Environment, ReleaseStack, StackDefinition};
