use hydra_core::{Hierarchy, HierarchyManifest, HydraError, HydraResult};

pub fn hierarchy_manifest_json() -> &'static str {
    include_str!(concat!(env!("OUT_DIR"), "/hierarchy_manifest.json"))
}

pub fn load_hierarchy_manifest() -> HydraResult<HierarchyManifest> {
    serde_json::from_str(hierarchy_manifest_json())
        .map_err(|err| HydraError::schema(format!("hierarchy manifest parse: {err}")))
}

/// The registry of the standard Hydra tables.
pub fn standard_hierarchy() -> HydraResult<Hierarchy> {
    Hierarchy::from_manifest(load_hierarchy_manifest()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_parses() {
        let hierarchy = standard_hierarchy().expect("hierarchy");
        assert_eq!(hierarchy.table_for("network").unwrap(), "hydra_network");
        assert_eq!(hierarchy.parent_of("node").unwrap(), Some("network"));
        assert_eq!(
            hierarchy.primary_key_of("resource_scenario").unwrap(),
            ["scenario_id", "resource_attr_id"]
        );
        assert_eq!(hierarchy.entity_for_table("hydra_timeseries_data"), Some("timeseries_data"));
    }
}
