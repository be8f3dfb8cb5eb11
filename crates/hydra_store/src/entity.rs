use log::debug;
use sea_orm::sea_query::{Expr, ExprTrait, Query, SelectStatement};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, TransactionTrait,
};

use hydra_core::{FieldValue, HydraError, HydraResult};

use crate::catalog::Catalog;
use crate::dataset_store::release_dataset_rows;
use crate::db::{HydraDataset, iden_name};
use crate::record::Record;
use crate::schema::Schema;
use crate::sql::{bind_value, decode_field, exec, ident, query_all};
use crate::tree::{EntityTree, load_tree};

const MAX_CASCADE_DEPTH: usize = 32;
const STATUS_COLUMN: &str = "status";
const STATUS_DELETED: &str = "X";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityState {
    New,
    Loaded,
    PendingDelete,
    Deleted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParentRef {
    pub entity_name: String,
    pub key: Vec<(String, FieldValue)>,
}

#[derive(Clone, Debug)]
pub struct Entity {
    schema: Schema,
    entity_name: String,
    record: Record,
    state: EntityState,
    parent: Option<ParentRef>,
}

impl Entity {
    pub fn new(schema: &Schema, entity_name: &str) -> HydraResult<Self> {
        Ok(Self {
            schema: schema.clone(),
            entity_name: entity_name.to_string(),
            record: schema.record_for(entity_name)?,
            state: EntityState::New,
            parent: None,
        })
    }

    pub(crate) fn from_loaded(
        schema: &Schema,
        entity_name: &str,
        record: Record,
        parent: Option<ParentRef>,
    ) -> Self {
        Self {
            schema: schema.clone(),
            entity_name: entity_name.to_string(),
            record,
            state: EntityState::Loaded,
            parent,
        }
    }

    pub fn with_parent(mut self, parent: &Entity) -> HydraResult<Self> {
        let link = self
            .schema
            .catalog()
            .parent_links_of(self.record.table_name())
            .iter()
            .find(|fk| fk.referenced_table == parent.record.table_name())
            .cloned()
            .ok_or_else(|| {
                HydraError::schema(format!(
                    "'{}' has no foreign key to '{}'",
                    self.record.table_name(),
                    parent.record.table_name()
                ))
            })?;
        let value = parent.get(&link.referenced_column)?.ok_or_else(|| {
            HydraError::validation(format!(
                "parent '{}' has no value for '{}'",
                parent.entity_name, link.referenced_column
            ))
        })?;
        self.record.set(&link.column, value.clone())?;
        self.parent = Some(ParentRef {
            entity_name: parent.entity_name.clone(),
            key: vec![(link.referenced_column, value)],
        });
        Ok(self)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub(crate) fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    pub fn parent_ref(&self) -> Option<&ParentRef> {
        self.parent.as_ref()
    }

    pub fn get(&self, column: &str) -> HydraResult<Option<FieldValue>> {
        self.record.get(column)
    }

    pub fn set(&mut self, column: &str, value: impl Into<FieldValue>) -> HydraResult<()> {
        if self.state == EntityState::Deleted {
            return Err(HydraError::validation(format!(
                "'{}' has been deleted",
                self.entity_name
            )));
        }
        self.record.set(column, value)
    }

    pub fn id(&self) -> Option<i64> {
        match self.record.primary_key() {
            [column] => self
                .record
                .get(column)
                .ok()
                .flatten()
                .and_then(|value| value.as_i64()),
            _ => None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.record.is_dirty()
    }

    pub(crate) fn mark_inserted(&mut self) {
        self.record.mark_clean();
        self.state = EntityState::Loaded;
    }

    pub async fn load<C: ConnectionTrait>(&mut self, conn: &C) -> HydraResult<bool> {
        if !self.record.load(conn).await? {
            return Ok(false);
        }
        self.state = EntityState::Loaded;
        self.parent = self.resolve_parent()?;
        Ok(true)
    }

    fn resolve_parent(&self) -> HydraResult<Option<ParentRef>> {
        let hierarchy = self.schema.hierarchy();
        let Some(parent_entity) = hierarchy.parent_of(&self.entity_name)? else {
            return Ok(None);
        };
        let parent_table = hierarchy.table_for(parent_entity)?;
        let links = self.schema.catalog().parent_links_of(self.record.table_name());
        for link in links.iter().filter(|fk| fk.referenced_table == parent_table) {
            if let Some(value) = self.record.get(&link.column)? {
                return Ok(Some(ParentRef {
                    entity_name: parent_entity.to_string(),
                    key: vec![(link.referenced_column.clone(), value)],
                }));
            }
        }
        Ok(None)
    }

    pub async fn get_parent<C: ConnectionTrait>(&self, conn: &C) -> HydraResult<Option<Entity>> {
        let Some(parent) = &self.parent else {
            return Ok(None);
        };
        let mut entity = Entity::new(&self.schema, &parent.entity_name)?;
        for (column, value) in &parent.key {
            entity.record.set(column, value.clone())?;
        }
        Ok(entity.load(conn).await?.then_some(entity))
    }

    pub async fn load_all<C: ConnectionTrait>(self, conn: &C) -> HydraResult<Option<EntityTree>> {
        load_tree(conn, self).await
    }

    pub async fn save<C: ConnectionTrait>(&mut self, conn: &C) -> HydraResult<()> {
        match self.state {
            EntityState::New => {
                self.record.insert(conn).await?;
                self.state = EntityState::Loaded;
            }
            EntityState::Loaded => {
                if self.record.is_dirty() {
                    self.record.update(conn).await?;
                }
            }
            EntityState::PendingDelete if self.record.table_name() == dataset_table() => {
                let dataset_id = self
                    .id()
                    .ok_or_else(|| HydraError::primary_key_missing(self.record.table_name()))?;
                if !release_dataset_rows(conn, &self.schema, dataset_id).await? {
                    return Err(HydraError::integrity(format!(
                        "dataset {dataset_id} is still bound to a resource scenario"
                    )));
                }
                self.state = EntityState::Deleted;
            }
            EntityState::PendingDelete => {
                let key = self.record.key_pairs()?;
                let removed = cascade_delete(
                    conn,
                    self.schema.catalog(),
                    self.record.table_name(),
                    RowFilter::Key(key),
                )
                .await?;
                debug!("deleted {removed} rows under {}", self.entity_name);
                self.state = EntityState::Deleted;
            }
            EntityState::Deleted => {}
        }
        Ok(())
    }

    /// Stages removal of the row and everything referencing it; the next
    /// `save` or `commit` performs it.
    pub fn delete(&mut self) {
        self.state = match self.state {
            EntityState::New | EntityState::Deleted => EntityState::Deleted,
            EntityState::Loaded | EntityState::PendingDelete => EntityState::PendingDelete,
        };
    }

    pub fn soft_delete(&mut self) -> HydraResult<()> {
        if !self.record.table().has_column(STATUS_COLUMN) {
            return Err(HydraError::validation(format!(
                "'{}' has no status column",
                self.record.table_name()
            )));
        }
        self.set(STATUS_COLUMN, STATUS_DELETED)
    }

    pub fn is_soft_deleted(&self) -> bool {
        matches!(
            self.record.get(STATUS_COLUMN),
            Ok(Some(FieldValue::Text(ref status))) if status == STATUS_DELETED
        )
    }

    pub async fn commit(mut self, txn: DatabaseTransaction) -> HydraResult<Self> {
        self.save(&txn).await?;
        txn.commit().await?;
        Ok(self)
    }

    pub async fn save_atomic(self, conn: &DatabaseConnection) -> HydraResult<Self> {
        let txn = conn.begin().await?;
        self.commit(txn).await
    }
}

fn dataset_table() -> String {
    iden_name(HydraDataset::Table)
}

#[derive(Clone, Debug)]
enum RowFilter {
    Key(Vec<(String, FieldValue)>),
    AnyOf { column: String, values: Vec<FieldValue> },
}

struct Frame {
    table: String,
    filter: RowFilter,
    depth: usize,
    expanded: bool,
}

/// Deletes the selected rows after every row referencing them, innermost
/// first. Referencing rows are located before their parents disappear.
async fn cascade_delete<C: ConnectionTrait>(
    conn: &C,
    catalog: &Catalog,
    table: &str,
    filter: RowFilter,
) -> HydraResult<u64> {
    let backend = conn.get_database_backend();
    let mut removed = 0;
    let mut stack = vec![Frame {
        table: table.to_string(),
        filter,
        depth: 0,
        expanded: false,
    }];
    while let Some(mut frame) = stack.pop() {
        if frame.expanded {
            let mut delete = Query::delete();
            delete.from_table(ident(&frame.table));
            apply_filter(catalog, backend, &frame.table, &frame.filter, |cond| {
                delete.and_where(cond);
            })?;
            removed += exec(conn, &delete).await?;
            continue;
        }
        if frame.depth > MAX_CASCADE_DEPTH {
            return Err(HydraError::integrity(format!(
                "cascade from '{table}' exceeds {MAX_CASCADE_DEPTH} levels"
            )));
        }
        let mut children = Vec::new();
        for link in catalog.children_of(&frame.table) {
            let values =
                referenced_values(conn, catalog, &frame.table, &frame.filter, &link.referenced_column)
                    .await?;
            if values.is_empty() {
                continue;
            }
            children.push(Frame {
                table: link.child_table.clone(),
                filter: RowFilter::AnyOf {
                    column: link.column.clone(),
                    values,
                },
                depth: frame.depth + 1,
                expanded: false,
            });
        }
        frame.expanded = true;
        stack.push(frame);
        stack.extend(children.into_iter().rev());
    }
    Ok(removed)
}

async fn referenced_values<C: ConnectionTrait>(
    conn: &C,
    catalog: &Catalog,
    table: &str,
    filter: &RowFilter,
    column: &str,
) -> HydraResult<Vec<FieldValue>> {
    let info = catalog.require_table(table)?;
    let kind = info
        .column(column)
        .map(|c| c.kind)
        .ok_or_else(|| HydraError::schema(format!("'{table}' has no column '{column}'")))?;
    let backend = conn.get_database_backend();
    let mut select: SelectStatement = Query::select();
    select
        .distinct()
        .column(ident(column))
        .from(ident(table))
        .and_where(Expr::col(ident(column)).is_not_null());
    apply_filter(catalog, backend, table, filter, |cond| {
        select.and_where(cond);
    })?;
    let rows = query_all(conn, &select).await?;
    rows.iter()
        .map(|row| decode_field(row, column, kind).map(|value| value.coerce(kind)))
        .collect()
}

fn apply_filter(
    catalog: &Catalog,
    backend: DatabaseBackend,
    table: &str,
    filter: &RowFilter,
    mut push: impl FnMut(sea_orm::sea_query::SimpleExpr),
) -> HydraResult<()> {
    let info = catalog.require_table(table)?;
    let kind_of = |column: &str| {
        info.column(column)
            .map(|c| c.kind)
            .ok_or_else(|| HydraError::schema(format!("'{table}' has no column '{column}'")))
    };
    match filter {
        RowFilter::Key(pairs) => {
            for (column, value) in pairs {
                let kind = kind_of(column)?;
                push(Expr::col(ident(column)).eq(bind_value(backend, kind, value)));
            }
        }
        RowFilter::AnyOf { column, values } => {
            let kind = kind_of(column)?;
            push(
                Expr::col(ident(column))
                    .is_in(values.iter().map(|value| bind_value(backend, kind, value))),
            );
        }
    }
    Ok(())
}
