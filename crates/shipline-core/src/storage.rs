//! Static-asset bucket and its resource policy.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Who a statement applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Principal {
    /// Any principal, authenticated or not.
    Any,
    /// A specific principal ARN.
    Arn(String),
}

impl Principal {
    fn matches(&self, principal: &str) -> bool {
        match self {
            Principal::Any => true,
            Principal::Arn(arn) => arn == principal,
        }
    }
}

/// Result of evaluating a policy for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    ExplicitDeny,
    /// No statement matched.
    ImplicitDeny,
}

/// One resource policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub sid: String,
    pub effect: Effect,
    pub principals: Vec<Principal>,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    fn applies_to(&self, principal: &str, action: &str, resource: &str) -> bool {
        self.principals.iter().any(|p| p.matches(principal))
            && self.actions.iter().any(|a| wildcard_match(a, action))
            && self.resources.iter().any(|r| wildcard_match(r, resource))
    }
}

/// A resource policy attached to a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Evaluate a request. Explicit denies win, then allows; everything else is denied.
    pub fn evaluate(&self, principal: &str, action: &str, resource: &str) -> Decision {
        let matching: Vec<&PolicyStatement> = self
            .statements
            .iter()
            .filter(|s| s.applies_to(principal, action, resource))
            .collect();

        if matching.iter().any(|s| s.effect == Effect::Deny) {
            Decision::ExplicitDeny
        } else if matching.iter().any(|s| s.effect == Effect::Allow) {
            Decision::Allowed
        } else {
            Decision::ImplicitDeny
        }
    }
}

/// `*` matches any run of characters, `?` exactly one; comparison is case-sensitive.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();
    let (mut pi, mut vi) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while vi < v.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == v[vi]) {
            pi += 1;
            vi += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, vi));
            pi += 1;
        } else if let Some((sp, sv)) = star {
            pi = sp + 1;
            vi = sv + 1;
            star = Some((sp, sv + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

/// Declared bucket parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub name: String,
    pub index_document: String,
    pub error_document: String,
}

/// A publicly readable bucket with website hosting.
///
/// Public-policy blocking is switched off so the read statement can be
/// attached. Writes are left to the build role's own permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    spec: BucketSpec,
    policy: PolicyDocument,
}

impl Bucket {
    pub fn new(spec: BucketSpec) -> Result<Self> {
        validate_bucket_name(&spec.name)?;
        let policy = PolicyDocument {
            statements: vec![PolicyStatement {
                sid: "Enable Public Get".to_string(),
                effect: Effect::Allow,
                principals: vec![Principal::Any],
                actions: vec!["s3:GetObject".to_string()],
                resources: vec![format!("{}/*", bucket_arn(&spec.name))],
            }],
        };
        Ok(Self { spec, policy })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn arn(&self) -> String {
        bucket_arn(&self.spec.name)
    }

    pub fn index_document(&self) -> &str {
        &self.spec.index_document
    }

    pub fn error_document(&self) -> &str {
        &self.spec.error_document
    }

    pub fn policy(&self) -> &PolicyDocument {
        &self.policy
    }

    pub fn website_url(&self, region: &str) -> String {
        format!("http://{}.s3-website-{}.amazonaws.com", self.spec.name, region)
    }
}

fn bucket_arn(name: &str) -> String {
    format!("arn:aws:s3:::{}", name)
}

fn validate_bucket_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());
    if (3..=63).contains(&name.len()) && valid_chars && valid_edges && !name.contains("..") {
        Ok(())
    } else {
        Err(Error::invalid_value(
            "bucket name",
            format!(
                "'{}' must be 3-63 lowercase letters, digits, '-' or '.'",
                name
            ),
        ))
    }
}
