use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Leaf of the organization tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub id: String,
    pub name: String,
}

/// Sub-organization node; the root organization is one as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sub_orgs: Vec<OrganizationNode>,
    #[serde(default)]
    pub components: Vec<ComponentRef>,
}

impl OrganizationNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sub_orgs: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.components.push(ComponentRef {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn with_sub_org(mut self, sub_org: OrganizationNode) -> Self {
        self.sub_orgs.push(sub_org);
        self
    }

    /// Every component id in the subtree, depth-first.
    pub fn component_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.collect_component_ids(&mut ids);
        ids
    }

    fn collect_component_ids(&self, ids: &mut Vec<String>) {
        ids.extend(self.components.iter().map(|component| component.id.clone()));
        for sub_org in &self.sub_orgs {
            sub_org.collect_component_ids(ids);
        }
    }

    /// Rejects trees whose ids are not unique across sub-orgs and components.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        self.validate_into(&mut seen)
    }

    fn validate_into(&self, seen: &mut BTreeSet<String>) -> Result<(), String> {
        if !seen.insert(self.id.clone()) {
            return Err(format!("duplicate organization id '{}'", self.id));
        }
        for component in &self.components {
            if !seen.insert(component.id.clone()) {
                return Err(format!("duplicate component id '{}'", component.id));
            }
        }
        for sub_org in &self.sub_orgs {
            sub_org.validate_into(seen)?;
        }
        Ok(())
    }
}
