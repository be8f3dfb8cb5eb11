pub mod bulk;
pub mod catalog;
pub mod config;
pub mod dataset_store;
pub mod datastore;
mod db;
pub mod entities;
pub mod entity;
pub mod hierarchy_manifest;
pub mod migration;
pub mod record;
pub mod schema;
mod sql;
pub mod store;
pub mod tree;

pub use hydra_core::*;

pub use bulk::{IdAnchor, bulk_insert, reconcile_ids};
pub use catalog::{Catalog, ChildLink, ColumnInfo, ForeignKey, TableInfo};
pub use config::{DatabaseConfig, HydraConfig, LimitsConfig, PoolConfig};
pub use dataset_store::DatasetStore;
pub use datastore::{default_sqlite_path, load_or_init_config, open_store};
pub use entities::{
    Attr, Link, Network, Node, Project, ResourceAttr, ResourceGroup, ResourceScenario, Scenario,
};
pub use entity::{Entity, EntityState, ParentRef};
pub use hierarchy_manifest::{load_hierarchy_manifest, standard_hierarchy};
pub use record::Record;
pub use schema::Schema;
pub use store::HydraStore;
pub use tree::{EntityTree, NodeId, TreeNode};
