//! Build project and its service role.

use serde_json::{Value, json};

use shipline_core::LogicalId;
use shipline_core::pipeline::BuildProject;

use crate::buildspec::render_buildspec_json;
use crate::template::{
    Resource, Template, assume_role_policy, get_att, inline_policy, log_group_arn,
    managed_policy_arn,
};
use crate::{Result, Scope, Synthesizer};

const SCOPE: &str = "BuildProject";

pub fn project_id(project: &BuildProject) -> LogicalId {
    LogicalId::from_path(&[SCOPE, project.name.as_str(), "Resource"])
}

/// Log group the build service writes a project's build logs to.
pub fn log_group_name(project: &BuildProject) -> String {
    format!("/aws/codebuild/{}", project.name)
}

pub fn role_id(project: &BuildProject) -> LogicalId {
    LogicalId::from_path(&[SCOPE, project.name.as_str(), "Role"])
}

impl Synthesizer for BuildProject {
    fn kind(&self) -> &'static str {
        "build project"
    }

    fn synthesize(&self, _scope: &Scope<'_>, template: &mut Template) -> Result<()> {
        let role = role_id(self);
        let policies: Vec<Value> = self
            .managed_policies
            .iter()
            .map(|p| managed_policy_arn(p))
            .collect();
        let log_group = log_group_name(self);
        let logs = json!({
            "Effect": "Allow",
            "Action": ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
            "Resource": [
                log_group_arn(&log_group),
                log_group_arn(&format!("{}:*", log_group)),
            ],
        });
        template.add(
            role.clone(),
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": assume_role_policy("codebuild.amazonaws.com"),
                    "ManagedPolicyArns": policies,
                    "Policies": [inline_policy(format!("{}-logs", self.name), vec![logs])],
                }),
            ),
        )?;

        let variables: Vec<Value> = self
            .environment
            .variables()
            .into_iter()
            .map(|v| json!({ "Name": v.name, "Type": "PLAINTEXT", "Value": v.value }))
            .collect();

        template.add(
            project_id(self),
            Resource::new(
                "AWS::CodeBuild::Project",
                json!({
                    "Name": self.name,
                    "ServiceRole": get_att(&role, "Arn"),
                    "Source": {
                        "Type": "CODEPIPELINE",
                        "BuildSpec": render_buildspec_json(&self.spec)?,
                    },
                    "Artifacts": { "Type": "CODEPIPELINE" },
                    "Environment": {
                        "Type": "LINUX_CONTAINER",
                        "ComputeType": "BUILD_GENERAL1_SMALL",
                        "Image": self.build_image,
                        "ImagePullCredentialsType": "CODEBUILD",
                        "PrivilegedMode": self.privileged,
                        "EnvironmentVariables": variables,
                    },
                }),
            )
            .depends_on(role),
        )
    }
}
