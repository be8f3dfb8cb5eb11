use std::collections::HashSet;

use hydra_store::{Catalog, HydraConfig, HydraError, HydraResult, HydraStore};
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, Statement};
use tempfile::tempdir;

async fn list_tables(store: &HydraStore) -> HydraResult<HashSet<String>> {
    let rows = store
        .connection()
        .query_all_raw(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = 'table'",
        ))
        .await
        .map_err(HydraError::from)?;
    let mut tables = HashSet::new();
    for row in rows {
        let name: String = row.try_get("", "name").map_err(HydraError::from)?;
        tables.insert(name);
    }
    Ok(tables)
}

const HYDRA_TABLES: [&str; 18] = [
    "hydra_project",
    "hydra_network",
    "hydra_node",
    "hydra_link",
    "hydra_resource_group",
    "hydra_resource_group_item",
    "hydra_attr",
    "hydra_resource_attr",
    "hydra_scenario",
    "hydra_resource_scenario",
    "hydra_dataset",
    "hydra_metadata",
    "hydra_scalar",
    "hydra_descriptor",
    "hydra_array",
    "hydra_timeseries",
    "hydra_timeseries_data",
    "hydra_eq_timeseries",
];

#[tokio::test]
async fn sqlite_migrations_create_hydra_tables() -> HydraResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = HydraConfig::default_sqlite(base.join("hydra.sqlite").to_string_lossy());
    let store = HydraStore::connect(&config, base).await?;
    let tables = list_tables(&store).await?;
    for table in HYDRA_TABLES {
        assert!(tables.contains(table), "expected table '{table}' to exist");
    }
    // Idempotency check.
    let _store = HydraStore::connect(&config, base).await?;
    Ok(())
}

#[tokio::test]
async fn catalog_reflects_migrated_layout() -> HydraResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = HydraStore::connect_sqlite(&dir.path().join("hydra.sqlite")).await?;
    let catalog = store.schema().catalog();
    for table in HYDRA_TABLES {
        assert!(catalog.table(table).is_some(), "catalog misses '{table}'");
    }

    let node = catalog.require_table("hydra_node")?;
    assert_eq!(node.primary_key, vec!["node_id".to_string()]);
    assert_eq!(
        node.auto_increment_column().map(|c| c.name.as_str()),
        Some("node_id")
    );
    let x = node.column("node_x").expect("node_x");
    assert_eq!(x.kind, hydra_store::TypeKind::Decimal);

    let scenario_links = catalog.require_table("hydra_resource_scenario")?;
    assert_eq!(scenario_links.primary_key.len(), 2);
    assert!(scenario_links.auto_increment_column().is_none());

    let children: Vec<&str> = catalog
        .children_of("hydra_network")
        .iter()
        .map(|link| link.child_table.as_str())
        .collect();
    for child in ["hydra_node", "hydra_link", "hydra_scenario", "hydra_resource_group"] {
        assert!(children.contains(&child), "network should parent '{child}'");
    }
    let link_parents = catalog
        .parent_links_of("hydra_link")
        .iter()
        .filter(|fk| fk.referenced_table == "hydra_node")
        .count();
    assert_eq!(link_parents, 2);
    Ok(())
}

#[tokio::test]
async fn catalog_of_an_unmigrated_database_is_a_schema_error() -> HydraResult<()> {
    let dir = tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("empty.sqlite").display());
    let conn = Database::connect(url.as_str()).await?;

    let err = Catalog::build(&conn, None).await.unwrap_err();
    assert!(matches!(err, HydraError::Schema { .. }), "got {err:?}");

    let err = Catalog::build(&conn, Some("main; DROP TABLE x")).await.unwrap_err();
    assert!(matches!(err, HydraError::Schema { .. }), "got {err:?}");

    let err = Catalog::build(&conn, Some("not_attached")).await.unwrap_err();
    assert!(matches!(err, HydraError::Schema { .. }), "got {err:?}");
    Ok(())
}
