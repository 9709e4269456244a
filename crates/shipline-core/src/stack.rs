//! Release stack: the providers and the pipeline, composed in dependency order.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::network::{Network, NetworkSpec};
use crate::pipeline::{PipelineProps, PipelineSettings, ReleasePipeline};
use crate::registry::Registry;
use crate::secret::SecretRef;
use crate::storage::{Bucket, BucketSpec};
use crate::{Error, Result};

/// Account and region a stack is deployed into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Result<Self> {
        let account = account.into();
        let region = region.into();
        if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::invalid_value(
                "account",
                format!("'{}' is not a 12-digit account id", account),
            ));
        }
        let parts: Vec<&str> = region.split('-').collect();
        let valid_region = parts.len() >= 3
            && parts.iter().all(|p| !p.is_empty())
            && parts
                .iter()
                .all(|p| p.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
            && parts[parts.len() - 1].chars().all(|c| c.is_ascii_digit());
        if !valid_region {
            return Err(Error::invalid_value(
                "region",
                format!("'{}' is not a region name", region),
            ));
        }
        Ok(Self { account, region })
    }
}

/// Everything a stack declaration consists of, before composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDefinition {
    pub name: String,
    pub environment: Environment,
    pub network: NetworkSpec,
    pub registry_name: String,
    pub bucket: BucketSpec,
    /// Complete ARN of the secret holding the source-control token.
    pub github_token_arn: String,
    pub pipeline: PipelineSettings,
}

/// A composed, immutable release stack.
#[derive(Debug, Clone)]
pub struct ReleaseStack {
    name: String,
    environment: Environment,
    pipeline: ReleasePipeline,
}

impl ReleaseStack {
    /// Declare network, registry and bucket, then compose the pipeline on top of them.
    pub fn compose(definition: StackDefinition) -> Result<Self> {
        if definition.name.is_empty()
            || !definition.name.starts_with(|c: char| c.is_ascii_alphabetic())
            || !definition
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(Error::invalid_value(
                "stack name",
                format!(
                    "'{}' must start with a letter and contain only letters, digits and '-'",
                    definition.name
                ),
            ));
        }

        let network = Network::new(definition.network)?;
        info!(network = %network.name(), cidr = %network.cidr(), zones = network.zone_count(), "Network declared");

        let registry = Registry::new(definition.registry_name, &definition.environment)?;
        info!(registry = %registry.uri(), "Registry declared");

        let bucket = Bucket::new(definition.bucket)?;
        info!(bucket = %bucket.name(), "Bucket declared");

        let github_token = SecretRef::from_complete_arn(definition.github_token_arn)?;

        let props = PipelineProps {
            github_token,
            registry,
            network,
            bucket,
        };
        let pipeline =
            ReleasePipeline::compose(&definition.environment, props, &definition.pipeline)?;

        Ok(Self {
            name: definition.name,
            environment: definition.environment,
            pipeline,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn pipeline(&self) -> &ReleasePipeline {
        &self.pipeline
    }

    pub fn network(&self) -> &Network {
        &self.pipeline.props().network
    }

    pub fn registry(&self) -> &Registry {
        &self.pipeline.props().registry
    }

    pub fn bucket(&self) -> &Bucket {
        &self.pipeline.props().bucket
    }

    pub fn github_token(&self) -> &SecretRef {
        &self.pipeline.props().github_token
    }
}
