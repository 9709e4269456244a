//! Image repository.

use serde_json::json;

use shipline_core::LogicalId;
use shipline_core::registry::Registry;

use crate::template::{Resource, Template};
use crate::{Result, Scope, Synthesizer};

const SCOPE: &str = "Registry";

pub fn repository_id(registry: &Registry) -> LogicalId {
    LogicalId::from_path(&[SCOPE, registry.name(), "Resource"])
}

impl Synthesizer for Registry {
    fn kind(&self) -> &'static str {
        "registry"
    }

    fn synthesize(&self, _scope: &Scope<'_>, template: &mut Template) -> Result<()> {
        template.add(
            repository_id(self),
            Resource::new(
                "AWS::ECR::Repository",
                json!({ "RepositoryName": self.name() }),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_repository_named_after_registry() {
        let stack = testing::stack();
        let mut template = Template::new("test");
        stack
            .registry()
            .synthesize(&Scope::new(&stack), &mut template)
            .unwrap();
        let repo = template.resource(&repository_id(stack.registry())).unwrap();
        assert_eq!(repo.resource_type, "AWS::ECR::Repository");
        assert_eq!(repo.properties["RepositoryName"], "grocery-repo");
    }
}
