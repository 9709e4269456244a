//! The provisioning engine's template document.

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use shipline_core::LogicalId;

use crate::{Result, SynthError};

pub const FORMAT_VERSION: &str = "2010-09-09";

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<LogicalId>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on(mut self, id: LogicalId) -> Self {
        self.depends_on.push(id);
        self
    }
}

/// A value the template exports after deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

/// A synthesized template. Resources and outputs are kept sorted so the
/// same declaration always serializes to the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<LogicalId, Resource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: description.into(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, id: LogicalId, resource: Resource) -> Result<()> {
        if self.resources.contains_key(&id) {
            return Err(SynthError::DuplicateId(id));
        }
        self.resources.insert(id, resource);
        Ok(())
    }

    pub fn add_output(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        value: Value,
    ) -> Result<()> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(SynthError::DuplicateOutput(name));
        }
        self.outputs.insert(
            name,
            Output {
                description: description.into(),
                value,
            },
        );
        Ok(())
    }

    pub fn resource(&self, id: &LogicalId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Fail unless `to` has already been declared.
    pub fn require(&self, from: &str, to: &LogicalId) -> Result<()> {
        if self.resources.contains_key(to) {
            Ok(())
        } else {
            Err(SynthError::DanglingReference {
                from: from.to_string(),
                to: to.clone(),
            })
        }
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a LogicalId, &'a Resource)> {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `{"Ref": id}`
pub fn reference(id: &LogicalId) -> Value {
    json!({ "Ref": id })
}

/// `{"Fn::GetAtt": [id, attribute]}`
pub fn get_att(id: &LogicalId, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id, attribute] })
}

/// ARN of an AWS managed policy in the stack's partition.
pub fn managed_policy_arn(name: &str) -> Value {
    json!({
        "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, format!(":iam::aws:policy/{}", name)]]
    })
}

/// ARN of a log group in the stack's account and region.
pub fn log_group_arn(group: &str) -> Value {
    json!({
        "Fn::Join": ["", [
            "arn:",
            { "Ref": "AWS::Partition" },
            ":logs:",
            { "Ref": "AWS::Region" },
            ":",
            { "Ref": "AWS::AccountId" },
            format!(":log-group:{}", group),
        ]]
    })
}

/// Entry for a role's `Policies` list.
pub fn inline_policy(name: impl Into<String>, statements: Vec<Value>) -> Value {
    json!({
        "PolicyName": name.into(),
        "PolicyDocument": { "Version": "2012-10-17", "Statement": statements },
    })
}

/// Trust policy letting a service principal assume a role.
pub fn assume_role_policy(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": { "Service": service }
        }]
    })
}
