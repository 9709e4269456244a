//! Virtual network: VPC, subnets, gateways and routes.

use serde_json::json;

use shipline_core::LogicalId;
use shipline_core::network::{Network, Subnet, SubnetKind};

use crate::template::{Resource, Template, get_att, reference};
use crate::{Result, Scope, Synthesizer};

/// First component of every id this provider declares.
const SCOPE: &str = "Network";

pub fn vpc_id(network: &Network) -> LogicalId {
    LogicalId::from_path(&[SCOPE, network.name(), "Resource"])
}

pub fn subnet_id(network: &Network, subnet: &Subnet) -> LogicalId {
    LogicalId::from_path(&[SCOPE, network.name(), subnet.name().as_str(), "Subnet"])
}

/// Default routes of the public subnets. Anything facing the internet
/// must wait for them.
pub fn public_route_ids(network: &Network) -> Vec<LogicalId> {
    network
        .subnets_of(SubnetKind::Public)
        .map(|s| route_id(network, s))
        .collect()
}

fn route_id(network: &Network, subnet: &Subnet) -> LogicalId {
    LogicalId::from_path(&[SCOPE, network.name(), subnet.name().as_str(), "DefaultRoute"])
}

fn nat_id(network: &Network, zone: usize) -> Option<LogicalId> {
    network
        .subnets_of(SubnetKind::Public)
        .find(|s| s.zone == zone)
        .map(|s| {
            LogicalId::from_path(&[SCOPE, network.name(), s.name().as_str(), "NATGateway"])
        })
}

fn tags(name: String) -> serde_json::Value {
    json!([{ "Key": "Name", "Value": name }])
}

impl Synthesizer for Network {
    fn kind(&self) -> &'static str {
        "network"
    }

    fn synthesize(&self, _scope: &Scope<'_>, template: &mut Template) -> Result<()> {
        let vpc = vpc_id(self);
        template.add(
            vpc.clone(),
            Resource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": self.cidr().to_string(),
                    "EnableDnsHostnames": true,
                    "EnableDnsSupport": true,
                    "InstanceTenancy": "default",
                    "Tags": tags(self.name().to_string()),
                }),
            ),
        )?;

        let igw = LogicalId::from_path(&[SCOPE, self.name(), "IGW"]);
        template.add(
            igw.clone(),
            Resource::new(
                "AWS::EC2::InternetGateway",
                json!({ "Tags": tags(self.name().to_string()) }),
            ),
        )?;
        let attachment = LogicalId::from_path(&[SCOPE, self.name(), "VPCGW"]);
        template.add(
            attachment.clone(),
            Resource::new(
                "AWS::EC2::VPCGatewayAttachment",
                json!({
                    "VpcId": reference(&vpc),
                    "InternetGatewayId": reference(&igw),
                }),
            ),
        )?;

        for subnet in self.subnets() {
            let name = subnet.name();
            let id = subnet_id(self, subnet);
            let public = subnet.kind == SubnetKind::Public;
            template.add(
                id.clone(),
                Resource::new(
                    "AWS::EC2::Subnet",
                    json!({
                        "VpcId": reference(&vpc),
                        "CidrBlock": subnet.cidr.to_string(),
                        "AvailabilityZone": {
                            "Fn::Select": [subnet.zone, { "Fn::GetAZs": "" }]
                        },
                        "MapPublicIpOnLaunch": public,
                        "Tags": tags(format!("{}/{}", self.name(), name)),
                    }),
                ),
            )?;

            let table =
                LogicalId::from_path(&[SCOPE, self.name(), name.as_str(), "RouteTable"]);
            template.add(
                table.clone(),
                Resource::new(
                    "AWS::EC2::RouteTable",
                    json!({
                        "VpcId": reference(&vpc),
                        "Tags": tags(format!("{}/{}", self.name(), name)),
                    }),
                ),
            )?;
            template.add(
                LogicalId::from_path(&[
                    SCOPE,
                    self.name(),
                    name.as_str(),
                    "RouteTableAssociation",
                ]),
                Resource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({
                        "RouteTableId": reference(&table),
                        "SubnetId": reference(&id),
                    }),
                ),
            )?;

            let route = if public {
                Resource::new(
                    "AWS::EC2::Route",
                    json!({
                        "RouteTableId": reference(&table),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": reference(&igw),
                    }),
                )
                .depends_on(attachment.clone())
            } else {
                // Private subnets egress through the NAT gateway of their own zone.
                let nat = nat_id(self, subnet.zone).ok_or_else(|| {
                    shipline_core::Error::Internal(format!("no public subnet in zone {}", subnet.zone))
                })?;
                Resource::new(
                    "AWS::EC2::Route",
                    json!({
                        "RouteTableId": reference(&table),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "NatGatewayId": reference(&nat),
                    }),
                )
            };
            template.add(route_id(self, subnet), route)?;

            if public {
                let eip = LogicalId::from_path(&[SCOPE, self.name(), name.as_str(), "EIP"]);
                template.add(
                    eip.clone(),
                    Resource::new("AWS::EC2::EIP", json!({ "Domain": "vpc" })),
                )?;
                template.add(
                    LogicalId::from_path(&[SCOPE, self.name(), name.as_str(), "NATGateway"]),
                    Resource::new(
                        "AWS::EC2::NatGateway",
                        json!({
                            "SubnetId": reference(&id),
                            "AllocationId": get_att(&eip, "AllocationId"),
                            "Tags": tags(format!("{}/{}", self.name(), name)),
                        }),
                    )
                    .depends_on(route_id(self, subnet)),
                )?;
            }
        }

        Ok(())
    }
}
