//! The release pipeline, its artifact store and the source webhook.

use serde_json::{Value, json};

use shipline_core::LogicalId;
use shipline_core::artifact::Artifact;
use shipline_core::pipeline::{Action, ActionKind, GitHubSource, ReleasePipeline};

use crate::codebuild::project_id;
use crate::service::{cluster_id, service_id};
use crate::template::{Resource, Template, assume_role_policy, get_att, reference};
use crate::{Result, Scope, Synthesizer};

const SCOPE: &str = "Pipeline";

pub fn pipeline_id(release: &ReleasePipeline) -> LogicalId {
    LogicalId::from_path(&[SCOPE, release.pipeline().name(), "Resource"])
}

pub fn artifacts_bucket_id(release: &ReleasePipeline) -> LogicalId {
    LogicalId::from_path(&[SCOPE, release.pipeline().name(), "ArtifactsBucket"])
}

fn role_id(release: &ReleasePipeline) -> LogicalId {
    LogicalId::from_path(&[SCOPE, release.pipeline().name(), "Role"])
}

fn webhook_id(release: &ReleasePipeline, source: &GitHubSource) -> LogicalId {
    LogicalId::from_path(&[
        SCOPE,
        release.pipeline().name(),
        "Source",
        source.name.as_str(),
        "WebhookResource",
    ])
}

fn artifact_refs(artifacts: Vec<&Artifact>) -> Value {
    Value::Array(
        artifacts
            .into_iter()
            .map(|a| json!({ "Name": a.name() }))
            .collect(),
    )
}

/// Category, owner and provider the engine dispatches an action on.
fn action_type(kind: ActionKind) -> Value {
    let (owner, provider) = match kind {
        ActionKind::Source => ("ThirdParty", "GitHub"),
        ActionKind::Build => ("AWS", "CodeBuild"),
        ActionKind::Approval => ("AWS", "Manual"),
        ActionKind::Deploy => ("AWS", "ECS"),
    };
    json!({
        "Category": kind.to_string(),
        "Owner": owner,
        "Provider": provider,
        "Version": "1",
    })
}

fn action_configuration(action: &Action, template: &Template, from: &str) -> Result<Value> {
    let configuration = match action {
        Action::Source(source) => json!({
            "Owner": source.owner,
            "Repo": source.repo,
            "Branch": source.branch,
            "OAuthToken": source.oauth_token.dynamic_reference(),
            "PollForSourceChanges": false,
        }),
        Action::Build(build) => {
            let project = project_id(&build.project);
            template.require(from, &project)?;
            json!({ "ProjectName": reference(&project) })
        }
        Action::Approval(_) => json!({}),
        Action::Deploy(deploy) => {
            let cluster = cluster_id(&deploy.service);
            let service = service_id(&deploy.service);
            template.require(from, &cluster)?;
            template.require(from, &service)?;
            json!({
                "ClusterName": reference(&cluster),
                "ServiceName": get_att(&service, "Name"),
            })
        }
    };
    Ok(configuration)
}

impl Synthesizer for ReleasePipeline {
    fn kind(&self) -> &'static str {
        "pipeline"
    }

    fn synthesize(&self, _scope: &Scope<'_>, template: &mut Template) -> Result<()> {
        let pipeline = self.pipeline();
        let name = pipeline.name();

        let bucket = artifacts_bucket_id(self);
        template.add(
            bucket.clone(),
            Resource::new(
                "AWS::S3::Bucket",
                json!({
                    "BucketEncryption": {
                        "ServerSideEncryptionConfiguration": [{
                            "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" }
                        }]
                    },
                    "PublicAccessBlockConfiguration": {
                        "BlockPublicAcls": true,
                        "BlockPublicPolicy": true,
                        "IgnorePublicAcls": true,
                        "RestrictPublicBuckets": true,
                    },
                }),
            ),
        )?;

        let role = role_id(self);
        template.add(
            role.clone(),
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": assume_role_policy("codepipeline.amazonaws.com"),
                    "Policies": [{
                        "PolicyName": format!("{}-release", name),
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [
                                {
                                    "Effect": "Allow",
                                    "Action": ["s3:GetObject*", "s3:GetBucket*", "s3:List*", "s3:PutObject", "s3:DeleteObject*"],
                                    "Resource": [
                                        get_att(&bucket, "Arn"),
                                        { "Fn::Join": ["", [get_att(&bucket, "Arn"), "/*"]] },
                                    ],
                                },
                                {
                                    "Effect": "Allow",
                                    "Action": ["codebuild:BatchGetBuilds", "codebuild:StartBuild", "codebuild:StopBuild"],
                                    "Resource": "*",
                                },
                                {
                                    "Effect": "Allow",
                                    "Action": ["ecs:DescribeServices", "ecs:DescribeTaskDefinition", "ecs:DescribeTasks", "ecs:ListTasks", "ecs:RegisterTaskDefinition", "ecs:TagResource", "ecs:UpdateService"],
                                    "Resource": "*",
                                },
                                {
                                    "Effect": "Allow",
                                    "Action": "iam:PassRole",
                                    "Resource": "*",
                                    "Condition": {
                                        "StringEqualsIfExists": {
                                            "iam:PassedToService": ["ec2.amazonaws.com", "ecs-tasks.amazonaws.com"]
                                        }
                                    },
                                },
                            ],
                        },
                    }],
                }),
            ),
        )?;

        let mut stages = Vec::with_capacity(pipeline.stages().len());
        for stage in pipeline.stages() {
            let mut actions = Vec::with_capacity(stage.actions.len());
            for action in &stage.actions {
                let from = format!("{}/{}/{}", name, stage.name, action.name());
                let mut declared = json!({
                    "Name": action.name(),
                    "ActionTypeId": action_type(action.kind()),
                    "Configuration": action_configuration(action, template, &from)?,
                    "RunOrder": 1,
                });
                let inputs = action.inputs();
                if !inputs.is_empty() {
                    declared["InputArtifacts"] = artifact_refs(inputs);
                }
                let outputs = action.outputs();
                if !outputs.is_empty() {
                    declared["OutputArtifacts"] = artifact_refs(outputs);
                }
                actions.push(declared);
            }
            stages.push(json!({ "Name": stage.name, "Actions": actions }));
        }

        let id = pipeline_id(self);
        template.add(
            id.clone(),
            Resource::new(
                "AWS::CodePipeline::Pipeline",
                json!({
                    "Name": name,
                    "RoleArn": get_att(&role, "Arn"),
                    "ArtifactStore": { "Type": "S3", "Location": reference(&bucket) },
                    "Stages": stages,
                }),
            )
            .depends_on(role),
        )?;

        if let Some(source) = self.source() {
            let token = source.oauth_token.dynamic_reference();
            template.add(
                webhook_id(self, source),
                Resource::new(
                    "AWS::CodePipeline::Webhook",
                    json!({
                        "Authentication": "GITHUB_HMAC",
                        "AuthenticationConfiguration": { "SecretToken": token },
                        "Filters": [{
                            "JsonPath": "$.ref",
                            "MatchEquals": "refs/heads/{Branch}",
                        }],
                        "TargetAction": source.name,
                        "TargetPipeline": reference(&id),
                        "TargetPipelineVersion": 1,
                        "RegisterWithThirdParty": true,
                    }),
                ),
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesize;
    use crate::testing;

    fn stages(template: &Template, release: &ReleasePipeline) -> Vec<Value> {
        let resource = template.resource(&pipeline_id(release)).unwrap();
        resource.properties["Stages"].as_array().unwrap().clone()
    }

    #[test]
    fn test_three_stages_without_approval() {
        let stack = testing::stack();
        let template = synthesize(&stack).unwrap();
        let stages = stages(&template, stack.pipeline());
        let names: Vec<&str> = stages.iter().map(|s| s["Name"].as_str().unwrap()).collect();
        assert_eq!(names, ["Source", "Build", "Deploy"]);

        let template_json = template.to_json().unwrap();
        assert!(!template_json.contains("\"Manual\""));
    }

    #[test]
    fn test_approval_gate_adds_stage() {
        let mut def = testing::stack_definition();
        def.pipeline.approval_gate = true;
        let stack = shipline_core::ReleaseStack::compose(def).unwrap();
        let template = synthesize(&stack).unwrap();
        let stages = stages(&template, stack.pipeline());
        assert_eq!(stages.len(), 4);
        assert_eq!(stages[2]["Name"], "Approve");
        assert_eq!(stages[2]["Actions"][0]["ActionTypeId"]["Provider"], "Manual");
    }

    #[test]
    fn test_artifact_wiring() {
        let stack = testing::stack();
        let template = synthesize(&stack).unwrap();
        let stages = stages(&template, stack.pipeline());

        let source = &stages[0]["Actions"][0];
        assert_eq!(source["OutputArtifacts"], json!([{ "Name": "SourceOutput" }]));
        assert!(source.get("InputArtifacts").is_none());
        assert_eq!(
            source["Configuration"]["OAuthToken"],
            format!("{{{{resolve:secretsmanager:{}:SecretString:::}}}}", testing::TOKEN_ARN)
        );

        let build = &stages[1]["Actions"][0];
        assert_eq!(build["InputArtifacts"], json!([{ "Name": "SourceOutput" }]));
        assert_eq!(build["OutputArtifacts"], json!([{ "Name": "BuildOutput" }]));

        let deploy = &stages[2]["Actions"][0];
        assert_eq!(deploy["InputArtifacts"], json!([{ "Name": "BuildOutput" }]));
        assert_eq!(deploy["ActionTypeId"]["Provider"], "ECS");
    }

    #[test]
    fn test_pipeline_requires_build_project() {
        let stack = testing::stack();
        let mut template = Template::new("test");
        let result = stack
            .pipeline()
            .synthesize(&Scope::new(&stack), &mut template);
        assert!(matches!(result, Err(crate::SynthError::DanglingReference { .. })));
    }
}
