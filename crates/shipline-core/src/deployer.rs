//! Deployment target: a load-balanced container service.
//!
//! The service always runs whatever image currently carries the `latest`
//! tag. It never pins the commit tag, so two overlapping releases race on
//! `latest` and the last push wins. That race is accepted, not guarded.

use serde::{Deserialize, Serialize};

use crate::registry::{LATEST_TAG, Registry};
use crate::{Error, Result};

/// Managed policy attached to the task execution role so it can pull images.
pub const REGISTRY_PULL_POLICY: &str = "AmazonEC2ContainerRegistryPowerUser";

/// Target-group health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            interval_seconds: 120,
            timeout_seconds: 119,
            healthy_threshold: 2,
            unhealthy_threshold: 2,
        }
    }
}

impl HealthCheck {
    /// The load balancer rejects a timeout that is not strictly below the interval.
    pub fn validate(&self) -> Result<()> {
        if !(5..=300).contains(&self.interval_seconds) {
            return Err(Error::invalid_value(
                "health check interval",
                format!("{}s is outside 5..=300", self.interval_seconds),
            ));
        }
        if !(2..=120).contains(&self.timeout_seconds) {
            return Err(Error::invalid_value(
                "health check timeout",
                format!("{}s is outside 2..=120", self.timeout_seconds),
            ));
        }
        if self.timeout_seconds >= self.interval_seconds {
            return Err(Error::invalid_value(
                "health check timeout",
                format!(
                    "{}s must be less than the {}s interval",
                    self.timeout_seconds, self.interval_seconds
                ),
            ));
        }
        for (field, value) in [
            ("healthy threshold", self.healthy_threshold),
            ("unhealthy threshold", self.unhealthy_threshold),
        ] {
            if !(2..=10).contains(&value) {
                return Err(Error::invalid_value(
                    field,
                    format!("{} is outside 2..=10", value),
                ));
            }
        }
        Ok(())
    }
}

/// Declared service parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub container_name: String,
    pub container_port: u16,
    pub desired_count: u32,
    /// Task memory in MiB.
    pub memory_mib: u32,
    /// Task CPU in units of 1/1024 vCPU.
    pub cpu: u32,
    pub assign_public_ip: bool,
    pub health_check: HealthCheck,
}

/// A validated container service bound to a registry image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FargateService {
    spec: ServiceSpec,
    image: String,
}

impl FargateService {
    pub fn new(spec: ServiceSpec, registry: &Registry) -> Result<Self> {
        validate_task_size(spec.cpu, spec.memory_mib)?;
        spec.health_check.validate()?;
        if spec.desired_count == 0 {
            return Err(Error::invalid_value(
                "service desired count",
                "at least one task is required",
            ));
        }
        if spec.container_port == 0 {
            return Err(Error::invalid_value("service container port", "must not be 0"));
        }
        if spec.container_name.is_empty() {
            return Err(Error::invalid_value("service container name", "must not be empty"));
        }
        Ok(Self {
            image: registry.uri_for_tag(Some(LATEST_TAG)),
            spec,
        })
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Image reference the task definition pulls.
    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn health_check(&self) -> &HealthCheck {
        &self.spec.health_check
    }
}

/// Valid Fargate CPU/memory combinations.
fn validate_task_size(cpu: u32, memory_mib: u32) -> Result<()> {
    let valid = match cpu {
        256 => matches!(memory_mib, 512 | 1024 | 2048),
        512 => (1024..=4096).contains(&memory_mib) && memory_mib % 1024 == 0,
        1024 => (2048..=8192).contains(&memory_mib) && memory_mib % 1024 == 0,
        2048 => (4096..=16384).contains(&memory_mib) && memory_mib % 1024 == 0,
        4096 => (8192..=30720).contains(&memory_mib) && memory_mib % 1024 == 0,
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_value(
            "service task size",
            format!("{} CPU units with {} MiB is not a supported combination", cpu, memory_mib),
        ))
    }
}
