use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{HydraError, HydraResult};

/// One registered entity: which table backs it, which entity owns it and
/// which columns form its key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub entity_name: String,
    pub table_name: String,
    #[serde(default)]
    pub parent_entity: Option<String>,
    pub primary_key_columns: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyManifest {
    pub manifest_version: String,
    pub entities: Vec<HierarchyNode>,
}

/// Immutable registry of entity nodes. Parent links form a forest.
#[derive(Clone, Debug, Default)]
pub struct Hierarchy {
    nodes: BTreeMap<String, HierarchyNode>,
    by_table: BTreeMap<String, String>,
}

impl Hierarchy {
    pub fn new(nodes: impl IntoIterator<Item = HierarchyNode>) -> HydraResult<Self> {
        let mut registry = Hierarchy::default();
        for node in nodes {
            if node.primary_key_columns.is_empty() {
                return Err(HydraError::schema(format!(
                    "entity '{}' declares no primary key columns",
                    node.entity_name
                )));
            }
            if registry
                .by_table
                .insert(node.table_name.clone(), node.entity_name.clone())
                .is_some()
            {
                return Err(HydraError::schema(format!(
                    "table '{}' is registered twice",
                    node.table_name
                )));
            }
            if registry
                .nodes
                .insert(node.entity_name.clone(), node.clone())
                .is_some()
            {
                return Err(HydraError::schema(format!(
                    "entity '{}' is registered twice",
                    node.entity_name
                )));
            }
        }
        registry.check_parents()?;
        Ok(registry)
    }

    pub fn from_manifest(manifest: HierarchyManifest) -> HydraResult<Self> {
        Self::new(manifest.entities)
    }

    pub fn from_json(raw: &str) -> HydraResult<Self> {
        let manifest: HierarchyManifest = serde_json::from_str(raw)
            .map_err(|err| HydraError::schema(format!("hierarchy manifest parse: {err}")))?;
        Self::from_manifest(manifest)
    }

    fn check_parents(&self) -> HydraResult<()> {
        for node in self.nodes.values() {
            let mut seen = BTreeSet::from([node.entity_name.as_str()]);
            let mut cursor = node.parent_entity.as_deref();
            while let Some(parent) = cursor {
                let Some(parent_node) = self.nodes.get(parent) else {
                    return Err(HydraError::schema(format!(
                        "entity '{}' names unknown parent '{parent}'",
                        node.entity_name
                    )));
                };
                if !seen.insert(parent) {
                    return Err(HydraError::schema(format!(
                        "parent chain of '{}' loops through '{parent}'",
                        node.entity_name
                    )));
                }
                cursor = parent_node.parent_entity.as_deref();
            }
        }
        Ok(())
    }

    pub fn node(&self, entity_name: &str) -> HydraResult<&HierarchyNode> {
        self.nodes
            .get(entity_name)
            .ok_or_else(|| HydraError::schema(format!("unknown entity '{entity_name}'")))
    }

    pub fn table_for(&self, entity_name: &str) -> HydraResult<&str> {
        Ok(self.node(entity_name)?.table_name.as_str())
    }

    pub fn parent_of(&self, entity_name: &str) -> HydraResult<Option<&str>> {
        Ok(self.node(entity_name)?.parent_entity.as_deref())
    }

    pub fn primary_key_of(&self, entity_name: &str) -> HydraResult<&[String]> {
        Ok(self.node(entity_name)?.primary_key_columns.as_slice())
    }

    pub fn entity_for_table(&self, table_name: &str) -> Option<&str> {
        self.by_table.get(table_name).map(String::as_str)
    }

    pub fn entities(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(entity: &str, table: &str, parent: Option<&str>, pk: &[&str]) -> HierarchyNode {
        HierarchyNode {
            entity_name: entity.to_string(),
            table_name: table.to_string(),
            parent_entity: parent.map(str::to_string),
            primary_key_columns: pk.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn lookups_resolve_tables_and_parents() {
        let hierarchy = Hierarchy::new([
            node("project", "hydra_project", None, &["project_id"]),
            node("network", "hydra_network", Some("project"), &["network_id"]),
        ])
        .unwrap();
        assert_eq!(hierarchy.table_for("network").unwrap(), "hydra_network");
        assert_eq!(hierarchy.parent_of("network").unwrap(), Some("project"));
        assert_eq!(hierarchy.parent_of("project").unwrap(), None);
        assert_eq!(hierarchy.primary_key_of("project").unwrap(), ["project_id"]);
        assert_eq!(hierarchy.entity_for_table("hydra_project"), Some("project"));
        assert!(matches!(
            hierarchy.node("scenario"),
            Err(HydraError::Schema { .. })
        ));
    }

    #[test]
    fn unknown_parents_and_cycles_are_rejected() {
        let dangling = Hierarchy::new([node("network", "n", Some("project"), &["id"])]);
        assert!(dangling.is_err());
        let cycle = Hierarchy::new([
            node("a", "ta", Some("b"), &["id"]),
            node("b", "tb", Some("a"), &["id"]),
        ]);
        assert!(cycle.is_err());
    }

    #[test]
    fn nodes_need_a_key() {
        assert!(Hierarchy::new([node("a", "ta", None, &[])]).is_err());
    }

    #[test]
    fn parses_manifest_json() {
        let raw = r#"{
            "manifest_version": "1",
            "entities": [
                {"entity_name": "dataset", "table_name": "hydra_dataset", "primary_key_columns": ["dataset_id"]},
                {"entity_name": "metadata", "table_name": "hydra_metadata", "parent_entity": "dataset",
                 "primary_key_columns": ["dataset_id", "metadata_name"]}
            ]
        }"#;
        let hierarchy = Hierarchy::from_json(raw).unwrap();
        assert_eq!(hierarchy.len(), 2);
        assert_eq!(hierarchy.parent_of("metadata").unwrap(), Some("dataset"));
    }
}
