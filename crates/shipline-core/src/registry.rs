//! Container image registry.

use serde::{Deserialize, Serialize};

use crate::stack::Environment;
use crate::{Error, Result};

/// The floating tag every build pushes and every deploy pulls.
pub const LATEST_TAG: &str = "latest";

/// A named image repository in the account's registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    name: String,
    host: String,
}

impl Registry {
    pub fn new(name: impl Into<String>, env: &Environment) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= 256
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-_./".contains(c))
            && name.starts_with(|c: char| c.is_ascii_alphanumeric());
        if !valid {
            return Err(Error::invalid_value(
                "registry name",
                format!(
                    "'{}' must be lowercase alphanumerics separated by '-', '_', '.' or '/'",
                    name
                ),
            ));
        }
        Ok(Self {
            name,
            host: format!("{}.dkr.ecr.{}.amazonaws.com", env.account, env.region),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Account-scoped registry host, used for `docker login`.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Repository URI without a tag.
    pub fn uri(&self) -> String {
        format!("{}/{}", self.host, self.name)
    }

    /// Repository URI for a tag, or the bare URI when `tag` is `None`.
    pub fn uri_for_tag(&self, tag: Option<&str>) -> String {
        match tag {
            Some(tag) => format!("{}:{}", self.uri(), tag),
            None => self.uri(),
        }
    }

    pub fn latest_uri(&self) -> String {
        self.uri_for_tag(Some(LATEST_TAG))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::new("123456789012", "us-east-1").unwrap()
    }

    #[test]
    fn test_uris() {
        let registry = Registry::new("grocery-repo", &env()).unwrap();
        assert_eq!(registry.host(), "123456789012.dkr.ecr.us-east-1.amazonaws.com");
        assert_eq!(
            registry.uri(),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/grocery-repo"
        );
        assert_eq!(
            registry.latest_uri(),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/grocery-repo:latest"
        );
        assert!(registry.uri_for_tag(Some("abc1234")).ends_with(":abc1234"));
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(Registry::new("", &env()).is_err());
        assert!(Registry::new("Grocery", &env()).is_err());
        assert!(Registry::new("-grocery", &env()).is_err());
        assert!(Registry::new("grocery'repo", &env()).is_err());
    }
}
