use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hydra_core::{HydraError, HydraResult};

const DEFAULT_CONFIG_NAME: &str = "hydra.json";
const DEFAULT_DB_NAME: &str = "hydra.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Rows per multi-row INSERT; larger batches are chunked.
    pub max_insert_batch: Option<usize>,
    /// Hashes per `IN (...)` lookup.
    pub max_lookup_batch: Option<usize>,
}

impl LimitsConfig {
    pub fn with_defaults() -> Self {
        Self {
            max_insert_batch: Some(500),
            max_lookup_batch: Some(500),
        }
    }

    pub fn insert_batch(&self) -> usize {
        self.max_insert_batch.filter(|n| *n > 0).unwrap_or(500)
    }

    pub fn lookup_batch(&self) -> usize {
        self.max_lookup_batch.filter(|n| *n > 0).unwrap_or(500)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HydraConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub limits: Option<LimitsConfig>,
    /// Introspection schema: `main` on SQLite, `public` on Postgres, the
    /// database name on MySQL.
    pub schema_name: Option<String>,
}

impl HydraConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            limits: Some(LimitsConfig::with_defaults()),
            schema_name: None,
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> HydraResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| HydraError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| HydraError::storage(format!("read config: {err}")))?;
            let config: HydraConfig = serde_json::from_str(&raw)
                .map_err(|err| HydraError::validation(format!("config: {err}")))?;
            return Ok(config);
        }
        let default = HydraConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| HydraError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| HydraError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> HydraResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(HydraError::validation("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => None,
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Some(url.as_str()),
        }
    }

    pub fn limits(&self) -> LimitsConfig {
        self.limits.clone().unwrap_or_default()
    }
}

pub(crate) fn default_db_name() -> &'static str {
    DEFAULT_DB_NAME
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_default_config_on_first_load() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("hydra.sqlite");
        let config = HydraConfig::load_or_init(dir.path(), &db).expect("config");
        assert_eq!(config.backend_name(), "sqlite");
        assert!(dir.path().join("hydra.json").exists());
        assert_eq!(config.sqlite_path(dir.path()).expect("path"), db);
    }

    #[test]
    fn reads_postgres_config() {
        let dir = tempdir().expect("tempdir");
        let raw = r#"{
            "database": { "backend": "postgres", "url": "postgres://hydra@localhost/hydra" },
            "pool": { "max_connections": 4 },
            "limits": { "max_insert_batch": 50, "max_lookup_batch": null },
            "schema_name": "public"
        }"#;
        fs::write(dir.path().join("hydra.json"), raw).expect("write");
        let config =
            HydraConfig::load_or_init(dir.path(), &dir.path().join("unused")).expect("config");
        assert_eq!(config.backend_name(), "postgres");
        assert_eq!(
            config.connection_url(),
            Some("postgres://hydra@localhost/hydra")
        );
        assert!(config.sqlite_path(dir.path()).is_err());
        assert_eq!(config.limits().insert_batch(), 50);
        assert_eq!(config.limits().lookup_batch(), 500);
    }

    #[test]
    fn rejects_malformed_config() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("hydra.json"), "{ nope").expect("write");
        let err = HydraConfig::load_or_init(dir.path(), &dir.path().join("db")).unwrap_err();
        assert!(matches!(err, HydraError::Validation { .. }));
    }
}
