use std::str::FromStr;
use std::sync::{Arc, Mutex};

use hydra_store::{
    Entity, EntityState, FieldValue, HydraError, HydraResult, HydraStore, Link, Network, Node,
    Project, Scenario,
};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tempfile::{TempDir, tempdir};

async fn open() -> HydraResult<(TempDir, HydraStore)> {
    let dir = tempdir().expect("tempdir");
    let store = HydraStore::connect_sqlite(&dir.path().join("hydra.sqlite")).await?;
    Ok((dir, store))
}

async fn count_rows(store: &HydraStore, table: &str) -> HydraResult<i64> {
    let row = store
        .connection()
        .query_one_raw(Statement::from_string(
            DatabaseBackend::Sqlite,
            format!("SELECT COUNT(*) AS n FROM {table}"),
        ))
        .await?
        .expect("count row");
    Ok(row.try_get::<i64>("", "n")?)
}

/// A project with one network holding two nodes joined by a link.
async fn seed_network(store: &HydraStore) -> HydraResult<(Project, Network, Vec<Node>, Link)> {
    let conn = store.connection();
    let schema = store.schema();
    let mut project = Project::new(schema)?;
    project.set_name("Thames")?;
    project.save(conn).await?;

    let mut network =
        Network::from_entity(Network::new(schema)?.into_inner().with_parent(&project)?)?;
    network.set_name("Upper basin")?;
    network.save(conn).await?;
    let network_id = network.id().expect("network id");

    let mut nodes = Vec::new();
    for (name, x) in [("Reservoir", "1.01"), ("Weir", "2.50")] {
        let mut node = Node::new(schema)?;
        node.set_network_id(network_id)?;
        node.set_name(name)?;
        node.set_x(Decimal::from_str(x).expect("decimal"))?;
        node.set_y(Decimal::ZERO)?;
        node.save(conn).await?;
        nodes.push(node);
    }

    let mut link = Link::new(schema)?;
    link.set_network_id(network_id)?;
    link.set_node1_id(nodes[0].id().expect("node id"))?;
    link.set_node2_id(nodes[1].id().expect("node id"))?;
    link.set_name("Spillway")?;
    link.save(conn).await?;
    Ok((project, network, nodes, link))
}

#[tokio::test]
async fn decimals_survive_a_save_load_cycle() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let (_, _, nodes, _) = seed_network(&store).await?;
    let id = nodes[0].id().expect("node id");

    let reloaded = Node::find(store.schema(), store.connection(), id)
        .await?
        .expect("node exists");
    assert_eq!(reloaded.x()?, Some(Decimal::from_str("1.01").expect("decimal")));
    assert_eq!(reloaded.name()?.as_deref(), Some("Reservoir"));
    assert_eq!(reloaded.status()?.as_deref(), Some("A"));
    assert_eq!(reloaded.state(), EntityState::Loaded);
    Ok(())
}

#[tokio::test]
async fn missing_rows_load_as_false() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let mut record = store.schema().record_for("node")?;
    record.set("node_id", 999)?;
    record.mark_clean();
    assert!(!record.load(store.connection()).await?);
    assert_eq!(record.get("node_name")?, None);
    assert_eq!(record.values().len(), 1);
    assert!(!record.is_dirty());

    assert!(Node::find(store.schema(), store.connection(), 999).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn saving_an_unchanged_entity_issues_no_update() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let (_, network, _, _) = seed_network(&store).await?;
    let id = network.id().expect("network id");

    let statements = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut conn = store.connection().clone();
    let seen = statements.clone();
    conn.set_metric_callback(move |info| {
        seen.lock().expect("lock").push(info.statement.sql.clone());
    });

    let mut loaded = Network::find(store.schema(), &conn, id)
        .await?
        .expect("network exists");
    loaded.set_name("Upper basin")?;
    assert!(!loaded.is_dirty());
    loaded.save(&conn).await?;
    let updates = |log: &[String]| {
        log.iter()
            .filter(|sql| sql.trim_start().to_uppercase().starts_with("UPDATE"))
            .count()
    };
    assert_eq!(updates(&statements.lock().expect("lock")), 0);

    loaded.set_name("Lower basin")?;
    loaded.save(&conn).await?;
    assert_eq!(updates(&statements.lock().expect("lock")), 1);
    Ok(())
}

#[tokio::test]
async fn bulk_insert_continues_after_the_current_max_id() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let conn = store.connection();
    let mut seed = store.entity("project")?;
    seed.set("project_id", 100)?;
    seed.set("project_name", "Seed")?;
    seed.save(conn).await?;
    assert_eq!(seed.id(), Some(100));

    let mut batch = Vec::new();
    for name in ["Avon", "Severn", "Trent"] {
        let mut project = store.entity("project")?;
        project.set("project_name", name)?;
        batch.push(project);
    }
    let last = hydra_store::bulk_insert(conn, &mut batch, 500).await?;
    assert_eq!(last, Some(103));
    let ids: Vec<Option<i64>> = batch.iter().map(Entity::id).collect();
    assert_eq!(ids, vec![Some(101), Some(102), Some(103)]);
    assert!(batch.iter().all(|p| p.state() == EntityState::Loaded && !p.is_dirty()));

    let trent = Project::find(store.schema(), conn, 103).await?.expect("trent");
    assert_eq!(trent.name()?.as_deref(), Some("Trent"));
    Ok(())
}

#[tokio::test]
async fn chunked_bulk_insert_keeps_input_order() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let conn = store.connection();
    let mut batch = Vec::new();
    for index in 0..7 {
        let mut attr = store.entity("attr")?;
        attr.set("attr_name", format!("flow_{index}"))?;
        batch.push(attr);
    }
    hydra_store::bulk_insert(conn, &mut batch, 3).await?;
    for (index, attr) in batch.iter().enumerate() {
        let id = attr.id().expect("attr id");
        assert_eq!(id, index as i64 + 1);
        let mut check = store.entity("attr")?;
        check.set("attr_id", id)?;
        assert!(check.load(conn).await?);
        assert_eq!(check.get("attr_name")?, Some(FieldValue::from(format!("flow_{index}"))));
    }
    Ok(())
}

#[tokio::test]
async fn mixed_column_sets_are_rejected_before_writing() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let mut plain = store.entity("project")?;
    plain.set("project_name", "Plain")?;
    let mut described = store.entity("project")?;
    described.set("project_name", "Described")?;
    described.set("project_description", "has more columns")?;

    let mut batch = vec![plain, described];
    let err = hydra_store::bulk_insert(store.connection(), &mut batch, 500)
        .await
        .unwrap_err();
    assert!(matches!(err, HydraError::BatchColumnMismatch { .. }));
    assert_eq!(count_rows(&store, "hydra_project").await?, 0);

    let mut empty: Vec<Entity> = Vec::new();
    assert_eq!(hydra_store::bulk_insert(store.connection(), &mut empty, 500).await?, None);
    Ok(())
}

#[tokio::test]
async fn deleting_a_network_removes_its_rows_first() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let (project, network, _, _) = seed_network(&store).await?;
    let conn = store.connection();
    let mut scenario = Scenario::new(store.schema())?;
    scenario.set_network_id(network.id().expect("network id"))?;
    scenario.set_name("Baseline")?;
    scenario.save(conn).await?;

    let mut network = network.into_inner();
    network.delete();
    assert_eq!(network.state(), EntityState::PendingDelete);
    assert_eq!(count_rows(&store, "hydra_node").await?, 2);

    network.save(conn).await?;
    assert_eq!(network.state(), EntityState::Deleted);
    for table in ["hydra_network", "hydra_node", "hydra_link", "hydra_scenario"] {
        assert_eq!(count_rows(&store, table).await?, 0, "{table} should be empty");
    }
    let survivor = Project::find(store.schema(), conn, project.id().expect("project id")).await?;
    assert!(survivor.is_some());
    assert!(network.set("network_name", "gone").is_err());
    Ok(())
}

#[tokio::test]
async fn staged_deletes_wait_for_commit() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let (_, _, _, link) = seed_network(&store).await?;
    let mut link = link.into_inner();
    link.delete();
    assert_eq!(count_rows(&store, "hydra_link").await?, 1);

    let txn = store.begin().await?;
    let link = link.commit(txn).await?;
    assert_eq!(link.state(), EntityState::Deleted);
    assert_eq!(count_rows(&store, "hydra_link").await?, 0);
    assert_eq!(count_rows(&store, "hydra_node").await?, 2);
    Ok(())
}

#[tokio::test]
async fn save_atomic_commits_its_own_transaction() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let mut project = Project::new(store.schema())?.into_inner();
    project.set("project_name", "Severn")?;
    let project = project.save_atomic(store.connection()).await?;
    assert_eq!(project.state(), EntityState::Loaded);
    assert_eq!(count_rows(&store, "hydra_project").await?, 1);

    let mut project = project;
    project.delete();
    let project = project.save_atomic(store.connection()).await?;
    assert_eq!(project.state(), EntityState::Deleted);
    assert_eq!(count_rows(&store, "hydra_project").await?, 0);
    Ok(())
}

#[tokio::test]
async fn load_all_builds_the_network_tree() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let (_, network, nodes, _) = seed_network(&store).await?;
    let mut root = store.entity("network")?;
    root.set("network_id", network.id().expect("network id"))?;

    let tree = root
        .load_all(store.connection())
        .await?
        .expect("network exists");
    let top = tree.root();
    assert_eq!(
        tree.collections(top).collect::<Vec<_>>(),
        vec!["link", "node"]
    );
    let loaded_nodes = tree.children(top, "node");
    assert_eq!(loaded_nodes.len(), 2);
    assert_eq!(tree.entity(loaded_nodes[0]).id(), nodes[0].id());
    assert_eq!(tree.entity(loaded_nodes[1]).id(), nodes[1].id());
    assert_eq!(tree.parent(loaded_nodes[0]), Some(top));
    // Links belong to the network, not to the nodes they join.
    assert!(tree.children(loaded_nodes[0], "link").is_empty());
    assert_eq!(tree.len(), 4);

    let link_node = tree.children(top, "link")[0];
    let parent = tree.entity(link_node).parent_ref().expect("parent ref");
    assert_eq!(parent.entity_name, "network");

    let mut missing = store.entity("network")?;
    missing.set("network_id", 4242)?;
    assert!(missing.load_all(store.connection()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn loaded_entities_find_their_parent() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let (project, network, nodes, _) = seed_network(&store).await?;
    let conn = store.connection();

    let node = Node::find(store.schema(), conn, nodes[1].id().expect("node id"))
        .await?
        .expect("node exists");
    let parent = node.get_parent(conn).await?.expect("network parent");
    assert_eq!(parent.entity_name(), "network");
    assert_eq!(parent.id(), network.id());

    let grandparent = parent.get_parent(conn).await?.expect("project parent");
    assert_eq!(grandparent.id(), project.id());
    assert!(grandparent.get_parent(conn).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn soft_delete_flags_the_status_column() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let (_, network, _, _) = seed_network(&store).await?;
    let conn = store.connection();
    let mut network = network;
    network.soft_delete()?;
    network.save(conn).await?;

    let reloaded = Network::find(store.schema(), conn, network.id().expect("network id"))
        .await?
        .expect("row kept");
    assert!(reloaded.is_soft_deleted());
    assert_eq!(reloaded.status()?.as_deref(), Some("X"));

    let mut attr = store.entity("attr")?;
    assert!(matches!(attr.soft_delete(), Err(HydraError::Validation { .. })));
    Ok(())
}

#[tokio::test]
async fn constraint_violations_surface_as_integrity_errors() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let mut orphan = Node::new(store.schema())?;
    orphan.set_network_id(31337)?;
    orphan.set_name("Nowhere")?;
    let err = orphan.save(store.connection()).await.unwrap_err();
    assert!(matches!(err, HydraError::Integrity { .. }), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn updates_require_a_key() -> HydraResult<()> {
    let (_dir, store) = open().await?;
    let mut record = store.schema().record_for("scenario")?;
    record.set("scenario_name", "keyless")?;
    let err = record.update(store.connection()).await.unwrap_err();
    assert!(matches!(err, HydraError::PrimaryKeyMissing { .. }));
    Ok(())
}
