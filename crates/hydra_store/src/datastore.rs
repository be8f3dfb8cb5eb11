use std::path::{Path, PathBuf};

use crate::config::default_db_name;
use crate::{HydraConfig, HydraResult, HydraStore};

pub fn load_or_init_config(base: &Path) -> HydraResult<HydraConfig> {
    let default_sqlite = default_sqlite_path(base);
    HydraConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_store(base: &Path) -> HydraResult<HydraStore> {
    let config = load_or_init_config(base)?;
    HydraStore::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(default_db_name())
}
