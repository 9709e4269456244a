//! Release pipeline: stages, actions and the artifacts flowing between them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

use crate::artifact::Artifact;
use crate::buildspec::{BuildEnvironment, BuildSpec, ReleaseSettings};
use crate::deployer::{FargateService, ServiceSpec};
use crate::network::Network;
use crate::registry::Registry;
use crate::secret::SecretRef;
use crate::stack::Environment;
use crate::storage::Bucket;
use crate::{Error, Result};

/// Default build image.
pub const DEFAULT_BUILD_IMAGE: &str = "aws/codebuild/amazonlinux2-x86_64-standard:5.0";

/// Managed policies attached to the build role: push images, write assets.
pub const BUILD_ROLE_POLICIES: [&str; 2] = ["AmazonEC2ContainerRegistryPowerUser", "AmazonS3FullAccess"];

/// Fetches a pinned branch of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubSource {
    pub name: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub oauth_token: SecretRef,
    pub output: Artifact,
}

impl GitHubSource {
    pub fn repository_url(&self) -> Result<Url> {
        Url::parse(&format!("https://github.com/{}/{}", self.owner, self.repo))
            .map_err(|e| Error::invalid_value("source repository", e.to_string()))
    }
}

/// The build project a build action runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProject {
    pub name: String,
    pub build_image: String,
    /// Needed to run the Docker daemon inside the build container.
    pub privileged: bool,
    pub environment: BuildEnvironment,
    pub spec: BuildSpec,
    pub managed_policies: Vec<String>,
}

/// Runs a build project over an input artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBuild {
    pub name: String,
    pub project: BuildProject,
    pub input: Artifact,
    pub outputs: Vec<Artifact>,
}

/// Blocks the pipeline until someone approves. No timeout is declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualApproval {
    pub name: String,
}

/// Rolls the container service onto the image named in the input artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcsDeploy {
    pub name: String,
    pub service: FargateService,
    pub input: Artifact,
}

/// Action category, as the pipeline engine classifies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Source,
    Build,
    Approval,
    Deploy,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Source => write!(f, "Source"),
            ActionKind::Build => write!(f, "Build"),
            ActionKind::Approval => write!(f, "Approval"),
            ActionKind::Deploy => write!(f, "Deploy"),
        }
    }
}

/// One unit of work within a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Source(GitHubSource),
    Build(CodeBuild),
    Approval(ManualApproval),
    Deploy(Box<EcsDeploy>),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Source(a) => &a.name,
            Action::Build(a) => &a.name,
            Action::Approval(a) => &a.name,
            Action::Deploy(a) => &a.name,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Source(_) => ActionKind::Source,
            Action::Build(_) => ActionKind::Build,
            Action::Approval(_) => ActionKind::Approval,
            Action::Deploy(_) => ActionKind::Deploy,
        }
    }

    pub fn inputs(&self) -> Vec<&Artifact> {
        match self {
            Action::Source(_) | Action::Approval(_) => vec![],
            Action::Build(a) => vec![&a.input],
            Action::Deploy(a) => vec![&a.input],
        }
    }

    pub fn outputs(&self) -> Vec<&Artifact> {
        match self {
            Action::Source(a) => vec![&a.output],
            Action::Build(a) => a.outputs.iter().collect(),
            Action::Approval(_) | Action::Deploy(_) => vec![],
        }
    }
}

/// A named, ordered group of actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Stage {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            actions,
        }
    }
}

/// A validated pipeline. Stages run strictly in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    name: String,
    stages: Vec<Stage>,
}

/// Where an artifact comes from and who reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFlow<'a> {
    pub artifact: &'a Artifact,
    pub producer: (&'a str, &'a str),
    pub consumers: Vec<(&'a str, &'a str)>,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn actions(&self) -> impl Iterator<Item = (&Stage, &Action)> {
        self.stages
            .iter()
            .flat_map(|stage| stage.actions.iter().map(move |action| (stage, action)))
    }

    /// Producer and consumers of every artifact, in production order.
    pub fn artifact_flow(&self) -> Vec<ArtifactFlow<'_>> {
        let mut flows: Vec<ArtifactFlow<'_>> = Vec::new();
        for (stage, action) in self.actions() {
            for output in action.outputs() {
                flows.push(ArtifactFlow {
                    artifact: output,
                    producer: (stage.name.as_str(), action.name()),
                    consumers: Vec::new(),
                });
            }
        }
        for (stage, action) in self.actions() {
            for input in action.inputs() {
                if let Some(flow) = flows.iter_mut().find(|f| f.artifact == input) {
                    flow.consumers.push((stage.name.as_str(), action.name()));
                }
            }
        }
        flows
    }
}

/// Assembles and validates a [`Pipeline`].
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate the wiring. Every failure here is a declaration error raised
    /// before anything reaches the provisioning engine.
    pub fn build(self) -> Result<Pipeline> {
        validate_name("pipeline", &self.name, 100)?;

        if self.stages.len() < 2 {
            return Err(Error::InvalidInput(format!(
                "pipeline '{}' needs at least two stages, found {}",
                self.name,
                self.stages.len()
            )));
        }

        let mut stage_names = HashSet::new();
        let mut produced: HashSet<&str> = HashSet::new();

        for (index, stage) in self.stages.iter().enumerate() {
            validate_name("stage", &stage.name, 100)?;
            if !stage_names.insert(stage.name.as_str()) {
                return Err(Error::Duplicate(format!("stage '{}'", stage.name)));
            }
            if stage.actions.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "stage '{}' has no actions",
                    stage.name
                )));
            }

            let mut action_names = HashSet::new();
            for action in &stage.actions {
                validate_name("action", action.name(), 100)?;
                if !action_names.insert(action.name()) {
                    return Err(Error::Duplicate(format!(
                        "action '{}' in stage '{}'",
                        action.name(),
                        stage.name
                    )));
                }

                let is_source = action.kind() == ActionKind::Source;
                if index == 0 && !is_source {
                    return Err(Error::InvalidInput(format!(
                        "first stage '{}' may only contain source actions, found '{}'",
                        stage.name,
                        action.name()
                    )));
                }
                if index > 0 && is_source {
                    return Err(Error::InvalidInput(format!(
                        "source action '{}' must be in the first stage, found in '{}'",
                        action.name(),
                        stage.name
                    )));
                }

                // `produced` only holds earlier stages here; outputs of this
                // stage are recorded after all of its inputs are checked.
                for input in action.inputs() {
                    if !produced.contains(input.name()) {
                        return Err(Error::InvalidReference(format!(
                            "action '{}' reads artifact '{}' which no earlier stage produces",
                            action.name(),
                            input
                        )));
                    }
                }
            }

            for action in &stage.actions {
                for output in action.outputs() {
                    if !produced.insert(output.name()) {
                        return Err(Error::Duplicate(format!(
                            "artifact '{}' is produced more than once",
                            output
                        )));
                    }
                }
            }
        }

        debug!(pipeline = %self.name, stages = self.stages.len(), "Pipeline validated");

        Ok(Pipeline {
            name: self.name,
            stages: self.stages,
        })
    }
}

fn validate_name(what: &str, name: &str, max_len: usize) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= max_len
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-@".contains(c));
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_value(
            format!("{} name", what),
            format!(
                "'{}' must be 1-{} characters of letters, digits, '.', '_', '-' or '@'",
                name, max_len
            ),
        ))
    }
}

/// Resources the release pipeline builds on. All of them are declared
/// before the pipeline and handed over explicitly.
#[derive(Debug, Clone)]
pub struct PipelineProps {
    pub github_token: SecretRef,
    pub registry: Registry,
    pub network: Network,
    pub bucket: Bucket,
}

/// Source stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    pub action_name: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

/// Build stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    pub action_name: String,
    pub project_name: String,
    pub build_image: String,
    pub privileged: bool,
    pub release: ReleaseSettings,
}

/// Everything needed to compose the release pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub name: String,
    pub source: SourceSettings,
    pub build: BuildSettings,
    pub deploy_action_name: String,
    pub service: ServiceSpec,
    /// Insert the declared approval action as its own stage before Deploy.
    pub approval_gate: bool,
}

/// The linear Source -> Build -> Deploy pipeline together with the
/// resources it was composed from.
#[derive(Debug, Clone)]
pub struct ReleasePipeline {
    pipeline: Pipeline,
    props: PipelineProps,
    approval: ManualApproval,
    approval_gated: bool,
    source_output: Artifact,
    build_output: Artifact,
}

impl ReleasePipeline {
    pub fn compose(
        env: &Environment,
        props: PipelineProps,
        settings: &PipelineSettings,
    ) -> Result<Self> {
        let source_output = Artifact::new("SourceOutput");
        let build_output = Artifact::new("BuildOutput");

        if settings.source.owner.is_empty() || settings.source.repo.is_empty() {
            return Err(Error::invalid_value("source", "owner and repo are required"));
        }
        if settings.source.branch.is_empty() {
            return Err(Error::invalid_value("source branch", "must not be empty"));
        }
        if settings.build.release.container_name != settings.service.container_name {
            return Err(Error::InvalidReference(format!(
                "image definitions name container '{}' but the service runs '{}'",
                settings.build.release.container_name, settings.service.container_name
            )));
        }

        let source = GitHubSource {
            name: settings.source.action_name.clone(),
            owner: settings.source.owner.clone(),
            repo: settings.source.repo.clone(),
            branch: settings.source.branch.clone(),
            oauth_token: props.github_token.clone(),
            output: source_output.clone(),
        };
        source.repository_url()?;

        let project = BuildProject {
            name: settings.build.project_name.clone(),
            build_image: settings.build.build_image.clone(),
            privileged: settings.build.privileged,
            environment: BuildEnvironment::new(&props.registry, &props.bucket, &env.region),
            spec: BuildSpec::container_release(&props.registry, &settings.build.release)?,
            managed_policies: BUILD_ROLE_POLICIES.iter().map(|p| p.to_string()).collect(),
        };
        let build = CodeBuild {
            name: settings.build.action_name.clone(),
            project,
            input: source_output.clone(),
            outputs: vec![build_output.clone()],
        };

        let service = FargateService::new(settings.service.clone(), &props.registry)?;
        let deploy = EcsDeploy {
            name: settings.deploy_action_name.clone(),
            service,
            input: build_output.clone(),
        };

        let approval = ManualApproval {
            name: "Approve".to_string(),
        };

        let mut builder = PipelineBuilder::new(settings.name.clone())
            .stage(Stage::new("Source", vec![Action::Source(source)]))
            .stage(Stage::new("Build", vec![Action::Build(build)]));
        if settings.approval_gate {
            builder = builder.stage(Stage::new("Approve", vec![Action::Approval(approval.clone())]));
        }
        let pipeline = builder
            .stage(Stage::new("Deploy", vec![Action::Deploy(Box::new(deploy))]))
            .build()?;

        info!(
            pipeline = %pipeline.name(),
            stages = pipeline.stages().len(),
            approval_gated = settings.approval_gate,
            "Release pipeline composed"
        );

        Ok(Self {
            pipeline,
            props,
            approval,
            approval_gated: settings.approval_gate,
            source_output,
            build_output,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn props(&self) -> &PipelineProps {
        &self.props
    }

    /// The declared approval action, whether or not a stage uses it.
    pub fn approval(&self) -> &ManualApproval {
        &self.approval
    }

    pub fn is_approval_gated(&self) -> bool {
        self.approval_gated
    }

    pub fn source_output(&self) -> &Artifact {
        &self.source_output
    }

    pub fn build_output(&self) -> &Artifact {
        &self.build_output
    }

    pub fn source(&self) -> Option<&GitHubSource> {
        self.pipeline.actions().find_map(|(_, a)| match a {
            Action::Source(s) => Some(s),
            _ => None,
        })
    }

    pub fn build(&self) -> Option<&CodeBuild> {
        self.pipeline.actions().find_map(|(_, a)| match a {
            Action::Build(b) => Some(b),
            _ => None,
        })
    }

    pub fn deploy(&self) -> Option<&EcsDeploy> {
        self.pipeline.actions().find_map(|(_, a)| match a {
            Action::Deploy(d) => Some(d.as_ref()),
            _ => None,
        })
    }
}
