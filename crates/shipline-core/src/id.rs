//! Logical identifiers for declared resources.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Length of the hash suffix appended to multi-component ids.
const HASH_LEN: usize = 8;

/// Maximum length the provisioning engine accepts for a logical id.
const MAX_LEN: usize = 255;

/// A stable identifier for a resource inside a synthesized template.
///
/// Ids are derived from the construct path (e.g. `["grocery-vpc-construct", "grocery-vpc"]`),
/// so the same declaration always yields the same ids and the provisioning
/// engine can diff one synthesis against the next.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Build an id from a construct path.
    ///
    /// A single-component path maps to that component with non-alphanumerics
    /// removed. Longer paths get the concatenated components followed by the
    /// first eight upper-case hex digits of the MD5 of the `/`-joined path.
    pub fn from_path<S: AsRef<str>>(path: &[S]) -> Self {
        let components: Vec<&str> = path.iter().map(|c| c.as_ref()).collect();

        if components.len() == 1 {
            return Self(alphanumeric(components[0]));
        }

        let human: String = components.iter().map(|c| alphanumeric(c)).collect();
        let digest = md5::compute(components.join("/").as_bytes());
        let hash = format!("{:x}", digest).to_uppercase();

        let max_human = MAX_LEN - HASH_LEN;
        let human = if human.len() > max_human {
            human[human.len() - max_human..].to_string()
        } else {
            human
        };

        Self(format!("{}{}", human, &hash[..HASH_LEN]))
    }

    /// Wrap an id that is already in final form.
    pub fn raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn alphanumeric(component: &str) -> String {
    component
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_component_is_sanitized() {
        let id = LogicalId::from_path(&["grocery-pipeline"]);
        assert_eq!(id.as_str(), "grocerypipeline");
    }

    #[test]
    fn test_multi_component_has_hash_suffix() {
        let id = LogicalId::from_path(&["grocery-vpc-construct", "grocery-vpc"]);
        let s = id.as_str();
        assert!(s.starts_with("groceryvpcconstructgroceryvpc"));
        let suffix = &s["groceryvpcconstructgroceryvpc".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_ids_are_stable_and_path_sensitive() {
        let a = LogicalId::from_path(&["a", "b"]);
        let b = LogicalId::from_path(&["a", "b"]);
        let c = LogicalId::from_path(&["ab", ""]);
        assert_eq!(a, b);
        // Same human part, different path, different hash.
        assert_ne!(a, c);
    }

    #[test]
    fn test_long_paths_are_truncated() {
        let long = "x".repeat(400);
        let id = LogicalId::from_path(&[long.as_str(), "child"]);
        assert_eq!(id.as_str().len(), MAX_LEN);
    }
}
