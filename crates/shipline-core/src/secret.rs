//! Secret references.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A reference to a secret held in the cloud secret store.
///
/// The value is never read by Shipline; it is rendered as a dynamic
/// reference that the provisioning engine resolves at deploy time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    arn: String,
}

impl SecretRef {
    /// Reference a secret by its complete ARN.
    pub fn from_complete_arn(arn: impl Into<String>) -> Result<Self> {
        let arn = arn.into();
        let parts: Vec<&str> = arn.splitn(7, ':').collect();
        let valid = parts.len() == 7
            && parts[0] == "arn"
            && parts[2] == "secretsmanager"
            && parts[5] == "secret"
            && !parts[6].is_empty();
        if !valid {
            return Err(Error::invalid_value(
                "secret arn",
                format!("'{}' is not a complete secrets manager ARN", arn),
            ));
        }
        Ok(Self { arn })
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// Dynamic reference understood by the provisioning engine.
    pub fn dynamic_reference(&self) -> String {
        format!("{{{{resolve:secretsmanager:{}:SecretString:::}}}}", self.arn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARN: &str = "arn:aws:secretsmanager:us-east-1:123456789012:secret:gh/oauth/token-AbCdEf";

    #[test]
    fn test_dynamic_reference() {
        let secret = SecretRef::from_complete_arn(ARN).unwrap();
        assert_eq!(
            secret.dynamic_reference(),
            format!("{{{{resolve:secretsmanager:{}:SecretString:::}}}}", ARN)
        );
    }

    #[test]
    fn test_rejects_non_secret_arn() {
        assert!(SecretRef::from_complete_arn("gh/oauth/token").is_err());
        assert!(SecretRef::from_complete_arn("arn:aws:s3:::bucket").is_err());
        assert!(SecretRef::from_complete_arn("arn:aws:secretsmanager:us-east-1:1:secret:").is_err());
    }
}
