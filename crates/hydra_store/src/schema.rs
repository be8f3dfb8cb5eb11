use std::sync::Arc;

use hydra_core::{Hierarchy, HydraResult};

use crate::catalog::{Catalog, TableInfo};
use crate::record::Record;

/// Catalog and entity registry, validated against each other.
#[derive(Clone, Debug)]
pub struct Schema {
    catalog: Arc<Catalog>,
    hierarchy: Arc<Hierarchy>,
}

impl Schema {
    pub fn new(catalog: Catalog, hierarchy: Hierarchy) -> HydraResult<Self> {
        catalog.validate_hierarchy(&hierarchy)?;
        Ok(Self {
            catalog: Arc::new(catalog),
            hierarchy: Arc::new(hierarchy),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn table_of(&self, entity_name: &str) -> HydraResult<Arc<TableInfo>> {
        let table = self.hierarchy.table_for(entity_name)?;
        self.catalog.require_table(table)
    }

    pub fn record_for(&self, entity_name: &str) -> HydraResult<Record> {
        let table = self.table_of(entity_name)?;
        let key = self.hierarchy.primary_key_of(entity_name)?.to_vec();
        Ok(Record::new(table, key))
    }

    /// Registered tables use the registry's key; others fall back to the
    /// key the database reports.
    pub fn record_for_table(&self, table_name: &str) -> HydraResult<Record> {
        let table = self.catalog.require_table(table_name)?;
        let key = match self.hierarchy.entity_for_table(table_name) {
            Some(entity) => self.hierarchy.primary_key_of(entity)?.to_vec(),
            None => table.primary_key.clone(),
        };
        Ok(Record::new(table, key))
    }
}
