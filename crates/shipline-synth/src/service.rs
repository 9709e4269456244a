//! Load-balanced container service: cluster, task definition, load balancer,
//! target group, security groups and the service itself.

use serde_json::{Value, json};

use shipline_core::LogicalId;
use shipline_core::deployer::{FargateService, REGISTRY_PULL_POLICY};
use shipline_core::network::SubnetKind;

use crate::network::{public_route_ids, subnet_id, vpc_id};
use crate::template::{
    Resource, Template, assume_role_policy, get_att, inline_policy, managed_policy_arn, reference,
};
use crate::{Result, Scope, Synthesizer};

const SCOPE: &str = "Service";

/// Port the public listener accepts traffic on.
pub const LISTENER_PORT: u16 = 80;

/// Grace period before the first health check counts against a new task.
const HEALTH_CHECK_GRACE_SECONDS: u32 = 60;

pub fn cluster_id(service: &FargateService) -> LogicalId {
    LogicalId::from_path(&[SCOPE, service.name(), "Cluster"])
}

pub fn service_id(service: &FargateService) -> LogicalId {
    LogicalId::from_path(&[SCOPE, service.name(), "Service", "Service"])
}

pub fn load_balancer_id(service: &FargateService) -> LogicalId {
    LogicalId::from_path(&[SCOPE, service.name(), "LB"])
}

pub fn target_group_id(service: &FargateService) -> LogicalId {
    LogicalId::from_path(&[SCOPE, service.name(), "LB", "PublicListener", "ECSGroup"])
}

pub fn task_definition_id(service: &FargateService) -> LogicalId {
    LogicalId::from_path(&[SCOPE, service.name(), "TaskDef"])
}

fn execution_role_id(service: &FargateService) -> LogicalId {
    LogicalId::from_path(&[SCOPE, service.name(), "TaskDef", "ExecutionRole"])
}

impl Synthesizer for FargateService {
    fn kind(&self) -> &'static str {
        "container service"
    }

    fn synthesize(&self, scope: &Scope<'_>, template: &mut Template) -> Result<()> {
        let network = scope.stack().network();
        let spec = self.spec();
        let name = self.name();
        let vpc = vpc_id(network);
        template.require(name, &vpc)?;

        let subnets_of = |kind: SubnetKind| -> Vec<Value> {
            network
                .subnets_of(kind)
                .map(|s| reference(&subnet_id(network, s)))
                .collect()
        };

        let cluster = cluster_id(self);
        template.add(cluster.clone(), Resource::new("AWS::ECS::Cluster", json!({})))?;

        // Load balancer and its listener.
        let lb_sg = LogicalId::from_path(&[SCOPE, name, "LB", "SecurityGroup"]);
        template.add(
            lb_sg.clone(),
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": format!("{} load balancer", name),
                    "VpcId": reference(&vpc),
                    "SecurityGroupIngress": [{
                        "CidrIp": "0.0.0.0/0",
                        "Description": "Allow from anyone on port 80",
                        "FromPort": LISTENER_PORT,
                        "IpProtocol": "tcp",
                        "ToPort": LISTENER_PORT,
                    }],
                }),
            ),
        )?;

        let lb = load_balancer_id(self);
        let mut lb_resource = Resource::new(
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            json!({
                "Type": "application",
                "Scheme": "internet-facing",
                "Subnets": subnets_of(SubnetKind::Public),
                "SecurityGroups": [get_att(&lb_sg, "GroupId")],
            }),
        );
        for route in public_route_ids(network) {
            lb_resource = lb_resource.depends_on(route);
        }
        template.add(lb.clone(), lb_resource)?;

        let check = self.health_check();
        let target_group = target_group_id(self);
        template.add(
            target_group.clone(),
            Resource::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                json!({
                    "Port": LISTENER_PORT,
                    "Protocol": "HTTP",
                    "TargetType": "ip",
                    "VpcId": reference(&vpc),
                    "HealthCheckIntervalSeconds": check.interval_seconds,
                    "HealthCheckTimeoutSeconds": check.timeout_seconds,
                    "HealthyThresholdCount": check.healthy_threshold,
                    "UnhealthyThresholdCount": check.unhealthy_threshold,
                }),
            ),
        )?;

        let listener = LogicalId::from_path(&[SCOPE, name, "LB", "PublicListener"]);
        template.add(
            listener.clone(),
            Resource::new(
                "AWS::ElasticLoadBalancingV2::Listener",
                json!({
                    "LoadBalancerArn": reference(&lb),
                    "Port": LISTENER_PORT,
                    "Protocol": "HTTP",
                    "DefaultActions": [{
                        "Type": "forward",
                        "TargetGroupArn": reference(&target_group),
                    }],
                }),
            ),
        )?;

        // Task definition.
        let task_role = LogicalId::from_path(&[SCOPE, name, "TaskDef", "TaskRole"]);
        template.add(
            task_role.clone(),
            Resource::new(
                "AWS::IAM::Role",
                json!({ "AssumeRolePolicyDocument": assume_role_policy("ecs-tasks.amazonaws.com") }),
            ),
        )?;
        let log_group = LogicalId::from_path(&[
            SCOPE,
            name,
            "TaskDef",
            spec.container_name.as_str(),
            "LogGroup",
        ]);
        template.add(
            log_group.clone(),
            Resource::new("AWS::Logs::LogGroup", json!({})),
        )?;
        let execution_role = execution_role_id(self);
        template.add(
            execution_role.clone(),
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": assume_role_policy("ecs-tasks.amazonaws.com"),
                    "ManagedPolicyArns": [managed_policy_arn(REGISTRY_PULL_POLICY)],
                    "Policies": [inline_policy(
                        format!("{}-logs", name),
                        vec![json!({
                            "Effect": "Allow",
                            "Action": ["logs:CreateLogStream", "logs:PutLogEvents"],
                            "Resource": get_att(&log_group, "Arn"),
                        })],
                    )],
                }),
            ),
        )?;

        let task_definition = task_definition_id(self);
        template.add(
            task_definition.clone(),
            Resource::new(
                "AWS::ECS::TaskDefinition",
                json!({
                    "Family": name,
                    "Cpu": spec.cpu.to_string(),
                    "Memory": spec.memory_mib.to_string(),
                    "NetworkMode": "awsvpc",
                    "RequiresCompatibilities": ["FARGATE"],
                    "ExecutionRoleArn": get_att(&execution_role, "Arn"),
                    "TaskRoleArn": get_att(&task_role, "Arn"),
                    "ContainerDefinitions": [{
                        "Name": spec.container_name,
                        "Image": self.image(),
                        "Essential": true,
                        "PortMappings": [{
                            "ContainerPort": spec.container_port,
                            "Protocol": "tcp",
                        }],
                        "LogConfiguration": {
                            "LogDriver": "awslogs",
                            "Options": {
                                "awslogs-group": reference(&log_group),
                                "awslogs-stream-prefix": name,
                                "awslogs-region": scope.stack().environment().region,
                            },
                        },
                    }],
                }),
            ),
        )?;

        // Service.
        let service_sg = LogicalId::from_path(&[SCOPE, name, "Service", "SecurityGroup"]);
        template.add(
            service_sg.clone(),
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": format!("{} tasks", name),
                    "VpcId": reference(&vpc),
                    "SecurityGroupIngress": [{
                        "Description": "Load balancer to target",
                        "FromPort": spec.container_port,
                        "IpProtocol": "tcp",
                        "SourceSecurityGroupId": get_att(&lb_sg, "GroupId"),
                        "ToPort": spec.container_port,
                    }],
                }),
            ),
        )?;

        let (assign_public_ip, task_subnets) = if spec.assign_public_ip {
            ("ENABLED", subnets_of(SubnetKind::Public))
        } else {
            ("DISABLED", subnets_of(SubnetKind::Private))
        };

        template.add(
            service_id(self),
            Resource::new(
                "AWS::ECS::Service",
                json!({
                    "ServiceName": name,
                    "Cluster": reference(&cluster),
                    "LaunchType": "FARGATE",
                    "DesiredCount": spec.desired_count,
                    "TaskDefinition": reference(&task_definition),
                    "HealthCheckGracePeriodSeconds": HEALTH_CHECK_GRACE_SECONDS,
                    "DeploymentConfiguration": {
                        "MaximumPercent": 200,
                        "MinimumHealthyPercent": 50,
                    },
                    "LoadBalancers": [{
                        "ContainerName": spec.container_name,
                        "ContainerPort": spec.container_port,
                        "TargetGroupArn": reference(&target_group),
                    }],
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": assign_public_ip,
                            "SecurityGroups": [get_att(&service_sg, "GroupId")],
                            "Subnets": task_subnets,
                        },
                    },
                }),
            )
            .depends_on(listener)
            .depends_on(target_group),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn synthesize() -> (shipline_core::ReleaseStack, Template) {
        let stack = testing::stack();
        let scope = Scope::new(&stack);
        let mut template = Template::new("test");
        stack.network().synthesize(&scope, &mut template).unwrap();
        stack
            .pipeline()
            .deploy()
            .unwrap()
            .service
            .synthesize(&scope, &mut template)
            .unwrap();
        (stack, template)
    }

    #[test]
    fn test_task_size_and_image() {
        let (stack, template) = synthesize();
        let service = &stack.pipeline().deploy().unwrap().service;
        let task = template.resource(&task_definition_id(service)).unwrap();
        assert_eq!(task.properties["Cpu"], "256");
        assert_eq!(task.properties["Memory"], "512");
        let container = &task.properties["ContainerDefinitions"][0];
        assert_eq!(container["Name"], "grocery-repo");
        assert_eq!(container["PortMappings"][0]["ContainerPort"], 8080);
        assert_eq!(
            container["Image"],
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/grocery-repo:latest"
        );

        let role = template.resource(&execution_role_id(service)).unwrap();
        assert!(
            role.properties["ManagedPolicyArns"]
                .to_string()
                .contains("AmazonEC2ContainerRegistryPowerUser")
        );
    }

    #[test]
    fn test_execution_role_writes_container_logs() {
        let (stack, template) = synthesize();
        let service = &stack.pipeline().deploy().unwrap().service;
        let task = template.resource(&task_definition_id(service)).unwrap();
        let group = &task.properties["ContainerDefinitions"][0]["LogConfiguration"]["Options"]
            ["awslogs-group"]["Ref"];

        let role = template.resource(&execution_role_id(service)).unwrap();
        let statement = &role.properties["Policies"][0]["PolicyDocument"]["Statement"][0];
        assert_eq!(
            statement["Action"],
            json!(["logs:CreateLogStream", "logs:PutLogEvents"])
        );
        assert_eq!(statement["Resource"]["Fn::GetAtt"][0], *group);
        assert_eq!(statement["Resource"]["Fn::GetAtt"][1], "Arn");
    }

    #[test]
    fn test_health_check_on_target_group() {
        let (stack, template) = synthesize();
        let service = &stack.pipeline().deploy().unwrap().service;
        let group = template.resource(&target_group_id(service)).unwrap();
        assert_eq!(group.properties["HealthCheckIntervalSeconds"], 120);
        assert_eq!(group.properties["HealthCheckTimeoutSeconds"], 119);
        assert_eq!(group.properties["HealthyThresholdCount"], 2);
        assert_eq!(group.properties["UnhealthyThresholdCount"], 2);
    }

    #[test]
    fn test_public_ip_places_tasks_in_public_subnets() {
        let (stack, template) = synthesize();
        let service = &stack.pipeline().deploy().unwrap().service;
        let resource = template.resource(&service_id(service)).unwrap();
        let config = &resource.properties["NetworkConfiguration"]["AwsvpcConfiguration"];
        assert_eq!(config["AssignPublicIp"], "ENABLED");

        let network = stack.network();
        let expected: Vec<Value> = network
            .subnets_of(SubnetKind::Public)
            .map(|s| reference(&subnet_id(network, s)))
            .collect();
        assert_eq!(config["Subnets"], Value::Array(expected));
    }

    #[test]
    fn test_requires_network() {
        let stack = testing::stack();
        let mut template = Template::new("test");
        let result = stack
            .pipeline()
            .deploy()
            .unwrap()
            .service
            .synthesize(&Scope::new(&stack), &mut template);
        assert!(result.is_err());
    }
}
