use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use sea_orm::{
    ConnectOptions, Database, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;

use hydra_core::{
    Dataset, DatasetApi, DatasetCandidate, DatasetRef, Hierarchy, HydraError, HydraResult,
    ResourceAssignment, ResourceScenarioLink,
};

use crate::catalog::Catalog;
use crate::config::{DatabaseConfig, HydraConfig, LimitsConfig};
use crate::dataset_store::DatasetStore;
use crate::entity::Entity;
use crate::hierarchy_manifest::standard_hierarchy;
use crate::migration::Migrator;
use crate::schema::Schema;

/// A migrated database together with its introspected schema.
#[derive(Clone)]
pub struct HydraStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    schema: Schema,
    limits: LimitsConfig,
}

impl HydraStore {
    pub async fn connect(config: &HydraConfig, base_dir: &Path) -> HydraResult<Self> {
        Self::connect_with_hierarchy(config, base_dir, standard_hierarchy()?).await
    }

    /// Connects, migrates, and introspects, registering `hierarchy` as the
    /// entity registry.
    pub async fn connect_with_hierarchy(
        config: &HydraConfig,
        base_dir: &Path,
        hierarchy: Hierarchy,
    ) -> HydraResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        options.sqlx_logging(false);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await.map_err(HydraError::from)?;
        let backend = conn.get_database_backend();
        Migrator::up(&conn, None).await.map_err(HydraError::from)?;
        info!("{} datastore migrated", config.backend_name());

        let catalog = Catalog::build(&conn, config.schema_name.as_deref()).await?;
        info!("catalog built with {} tables", catalog.len());
        let schema = Schema::new(catalog, hierarchy)?;
        Ok(Self {
            conn,
            backend,
            schema,
            limits: config.limits(),
        })
    }

    pub async fn connect_sqlite(path: &Path) -> HydraResult<Self> {
        let config = HydraConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub async fn begin(&self) -> HydraResult<DatabaseTransaction> {
        Ok(self.conn.begin().await?)
    }

    /// A new, unsaved entity of a registered type.
    pub fn entity(&self, entity_name: &str) -> HydraResult<Entity> {
        Entity::new(&self.schema, entity_name)
    }

    pub fn datasets(&self) -> DatasetStore {
        DatasetStore::new(self.schema.clone(), self.limits.clone())
    }
}

#[async_trait]
impl DatasetApi for HydraStore {
    async fn bulk_insert_data(
        &self,
        candidates: Vec<DatasetCandidate>,
    ) -> HydraResult<Vec<DatasetRef>> {
        let txn = self.begin().await?;
        let refs = self.datasets().bulk_insert_data(&txn, &candidates).await?;
        txn.commit().await?;
        Ok(refs)
    }

    async fn get_dataset(&self, dataset_id: i64) -> HydraResult<Option<Dataset>> {
        self.datasets().load_dataset(&self.conn, dataset_id).await
    }

    async fn release_dataset(&self, dataset_id: i64) -> HydraResult<bool> {
        let txn = self.begin().await?;
        let released = self.datasets().release_dataset(&txn, dataset_id).await?;
        txn.commit().await?;
        Ok(released)
    }

    async fn attach_resource_scenarios(
        &self,
        scenario_id: i64,
        assignments: Vec<ResourceAssignment>,
    ) -> HydraResult<Vec<ResourceScenarioLink>> {
        let txn = self.begin().await?;
        let links = self
            .datasets()
            .attach_resource_scenarios(&txn, scenario_id, &assignments)
            .await?;
        txn.commit().await?;
        Ok(links)
    }
}

fn build_connection_url(config: &HydraConfig, base_dir: &Path) -> HydraResult<String> {
    match &config.database {
        DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}
