//! Build specification executed by the Build stage.
//!
//! A build specification is an ordered set of shell-command phases plus the
//! environment injected into the build container and the files it publishes
//! as the stage's output artifact. The build engine runs phases in order and
//! stops at the first non-zero exit; nothing already pushed or synced is
//! rolled back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::artifact::ArtifactFiles;
use crate::registry::{LATEST_TAG, Registry};
use crate::storage::Bucket;
use crate::{Error, Result};

/// Build specification format version understood by the build engine.
pub const BUILDSPEC_VERSION: &str = "0.2";

/// File the post-build phase writes and the Deploy stage reads.
pub const IMAGE_DEFINITIONS_FILE: &str = "imagedefinitions.json";

/// Length of the commit-hash image tag.
pub const COMMIT_TAG_LEN: usize = 7;

/// Variable the build engine sets to the resolved source revision.
pub const SOURCE_VERSION_VAR: &str = "CODEBUILD_RESOLVED_SOURCE_VERSION";

/// Build phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Install,
    PreBuild,
    Build,
    PostBuild,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Install, Phase::PreBuild, Phase::Build, Phase::PostBuild];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Install => "install",
            Phase::PreBuild => "pre_build",
            Phase::Build => "build",
            Phase::PostBuild => "post_build",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands of one phase. `finally` runs even when a command fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCommands {
    pub commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finally: Vec<String>,
}

impl PhaseCommands {
    fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            finally: Vec::new(),
        }
    }

    fn finally(mut self, command: impl Into<String>) -> Self {
        self.finally.push(command.into());
        self
    }
}

/// One variable injected into the build container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

/// The environment a build runs with.
///
/// Passed explicitly into the build project rather than living as ambient
/// process state; it is fixed once the stack is composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEnvironment {
    /// Registry URI without a tag (`ECR_REPO`).
    pub ecr_repo: String,
    /// Region string (`REGION`).
    pub region: String,
    /// Account-scoped registry host (`ID`).
    pub registry_host: String,
    /// Asset bucket name (`BUCKET`).
    pub bucket: String,
}

impl BuildEnvironment {
    pub fn new(registry: &Registry, bucket: &Bucket, region: impl Into<String>) -> Self {
        Self {
            ecr_repo: registry.uri(),
            region: region.into(),
            registry_host: registry.host().to_string(),
            bucket: bucket.name().to_string(),
        }
    }

    /// Variables in injection order.
    pub fn variables(&self) -> Vec<EnvironmentVariable> {
        [
            ("ECR_REPO", &self.ecr_repo),
            ("REGION", &self.region),
            ("ID", &self.registry_host),
            ("BUCKET", &self.bucket),
        ]
        .into_iter()
        .map(|(name, value)| EnvironmentVariable {
            name: name.to_string(),
            value: value.clone(),
        })
        .collect()
    }
}

/// What the build stage compiles and publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSettings {
    /// Container name in the image-definitions file and the task definition.
    pub container_name: String,
    /// Commands that compile and package the application.
    pub compile_commands: Vec<String>,
    /// Local build-output directory synced to the asset bucket.
    pub assets_dir: String,
}

/// One entry of the image-definitions file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDefinition {
    pub name: String,
    #[serde(rename = "imageUri")]
    pub image_uri: String,
}

/// The image-definitions document: always exactly one container on `:latest`.
pub fn image_definitions(container_name: &str, registry: &Registry) -> Vec<ImageDefinition> {
    vec![ImageDefinition {
        name: container_name.to_string(),
        image_uri: registry.latest_uri(),
    }]
}

/// Derive the image tag for a resolved source version.
///
/// The tag is the first seven characters of the version; an empty version
/// falls back to `latest`, which then duplicates the floating tag.
pub fn image_tag_for(source_version: &str) -> String {
    let tag: String = source_version.chars().take(COMMIT_TAG_LEN).collect();
    if tag.is_empty() {
        LATEST_TAG.to_string()
    } else {
        tag
    }
}

/// A complete build specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub version: String,
    pub phases: BTreeMap<Phase, PhaseCommands>,
    pub artifacts: ArtifactFiles,
}

impl BuildSpec {
    /// The container release build: compile, build and push the image under
    /// both tags, sync static assets, then write the image-definitions file.
    pub fn container_release(registry: &Registry, settings: &ReleaseSettings) -> Result<Self> {
        if settings.compile_commands.is_empty() {
            return Err(Error::InvalidInput(
                "at least one compile command is required".to_string(),
            ));
        }
        if settings.assets_dir.trim().is_empty() {
            return Err(Error::invalid_value("assets dir", "must not be empty"));
        }
        // The definitions JSON is passed to printf as a single-quoted argument.
        if settings.container_name.contains('\'') {
            return Err(Error::invalid_value(
                "container name",
                "must not contain a single quote",
            ));
        }

        let definitions = serde_json::to_string(&image_definitions(&settings.container_name, registry))
            .map_err(|e| Error::Internal(e.to_string()))?;
        let assets_dir = if settings.assets_dir.ends_with('/') {
            settings.assets_dir.clone()
        } else {
            format!("{}/", settings.assets_dir)
        };

        let mut phases = BTreeMap::new();
        phases.insert(
            Phase::Install,
            PhaseCommands::new(["yum update -y"]).finally("echo Done installing deps"),
        );
        phases.insert(
            Phase::PreBuild,
            PhaseCommands::new([
                "echo Logging in to Amazon ECR...".to_string(),
                "aws ecr get-login-password --region $REGION | docker login --username AWS --password-stdin $ID".to_string(),
                format!(
                    "COMMIT_HASH=$(echo ${} | cut -c 1-{})",
                    SOURCE_VERSION_VAR, COMMIT_TAG_LEN
                ),
                format!("IMAGE_TAG=${{COMMIT_HASH:={}}}", LATEST_TAG),
            ]),
        );

        let mut build = vec!["echo Build started on `date`".to_string()];
        build.extend(settings.compile_commands.iter().cloned());
        build.extend([
            "echo Building Docker Image $ECR_REPO:latest".to_string(),
            "docker build -t $ECR_REPO:latest .".to_string(),
            "echo Tagging Docker Image $ECR_REPO:latest with $ECR_REPO:$IMAGE_TAG".to_string(),
            "docker tag $ECR_REPO:latest $ECR_REPO:$IMAGE_TAG".to_string(),
            "echo Pushing Docker Image to $ECR_REPO:latest and $ECR_REPO:$IMAGE_TAG".to_string(),
            "docker push $ECR_REPO:latest".to_string(),
            "docker push $ECR_REPO:$IMAGE_TAG".to_string(),
            "echo Uploading static assets to s3".to_string(),
            format!("aws s3 sync {} s3://$BUCKET/", assets_dir),
        ]);
        phases.insert(
            Phase::Build,
            PhaseCommands::new(build).finally("echo Done building code"),
        );

        phases.insert(
            Phase::PostBuild,
            PhaseCommands::new([
                format!("echo creating {} dynamically", IMAGE_DEFINITIONS_FILE),
                format!("printf '%s' '{}' > {}", definitions, IMAGE_DEFINITIONS_FILE),
                "echo Build completed on `date`".to_string(),
            ]),
        );

        Ok(Self {
            version: BUILDSPEC_VERSION.to_string(),
            phases,
            artifacts: ArtifactFiles::single(IMAGE_DEFINITIONS_FILE),
        })
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseCommands> {
        self.phases.get(&phase)
    }

    /// Phases in execution order.
    pub fn ordered_phases(&self) -> impl Iterator<Item = (Phase, &PhaseCommands)> {
        self.phases.iter().map(|(phase, commands)| (*phase, commands))
    }
}
