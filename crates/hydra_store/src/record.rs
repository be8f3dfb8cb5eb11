use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use sea_orm::sea_query::{Expr, ExprTrait, Order, Query, SelectStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult};

use hydra_core::{FieldValue, HydraError, HydraResult, TypeKind};

use crate::bulk::insert_rows;
use crate::catalog::{ColumnInfo, TableInfo};
use crate::sql::{bind_value, decode_field, exec, ident, query_all, query_one};

#[derive(Clone, Debug)]
pub struct Record {
    table: Arc<TableInfo>,
    primary_key: Vec<String>,
    values: BTreeMap<String, FieldValue>,
    dirty: BTreeSet<String>,
    persisted_key: Option<Vec<FieldValue>>,
}

impl Record {
    pub fn new(table: Arc<TableInfo>, primary_key: Vec<String>) -> Self {
        Self {
            table,
            primary_key,
            values: BTreeMap::new(),
            dirty: BTreeSet::new(),
            persisted_key: None,
        }
    }

    pub fn table(&self) -> &TableInfo {
        &self.table
    }

    pub fn table_info(&self) -> Arc<TableInfo> {
        self.table.clone()
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    fn column(&self, name: &str) -> HydraResult<&ColumnInfo> {
        self.table.column(name).ok_or_else(|| {
            HydraError::validation(format!(
                "table '{}' has no column '{name}'",
                self.table.name
            ))
        })
    }

    /// Reads a column, coerced to its storage class. Unset and NULL both
    /// read as `None`.
    pub fn get(&self, name: &str) -> HydraResult<Option<FieldValue>> {
        let kind = self.column(name)?.kind;
        Ok(self
            .values
            .get(name)
            .filter(|value| !value.is_null())
            .map(|value| value.clone().coerce(kind)))
    }

    /// Assigns a column. Assigning the value it already holds changes
    /// nothing, including the dirty state.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> HydraResult<()> {
        let kind = self.column(name)?.kind;
        let value = value.into().coerce(kind);
        if matches!(kind, TypeKind::Integer | TypeKind::Decimal)
            && matches!(value, FieldValue::Text(_))
        {
            return Err(HydraError::validation(format!(
                "column '{name}' of '{}' is numeric, got {value:?}",
                self.table.name
            )));
        }
        if self.values.get(name) == Some(&value) {
            return Ok(());
        }
        self.values.insert(name.to_string(), value);
        self.dirty.insert(name.to_string());
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty_columns(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    pub fn mark_clean(&mut self) {
        self.dirty.clear();
        self.persisted_key = self.key_values().ok();
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    pub fn column_set(&self) -> BTreeSet<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted_key.is_some()
    }

    pub fn key_values(&self) -> HydraResult<Vec<FieldValue>> {
        self.primary_key
            .iter()
            .map(|column| {
                self.values
                    .get(column)
                    .filter(|value| !value.is_null())
                    .cloned()
                    .ok_or_else(|| HydraError::primary_key_missing(self.table.name.clone()))
            })
            .collect()
    }

    pub fn key_pairs(&self) -> HydraResult<Vec<(String, FieldValue)>> {
        Ok(self
            .primary_key
            .iter()
            .cloned()
            .zip(self.key_values()?)
            .collect())
    }

    fn where_key(&self) -> HydraResult<Vec<(String, FieldValue)>> {
        let values = match &self.persisted_key {
            Some(values) => values.clone(),
            None => self.key_values()?,
        };
        Ok(self.primary_key.iter().cloned().zip(values).collect())
    }

    pub(crate) fn bind(&self, backend: DatabaseBackend, column: &str) -> HydraResult<sea_orm::Value> {
        let kind = self.column(column)?.kind;
        let value = self.values.get(column).cloned().unwrap_or(FieldValue::Null);
        Ok(bind_value(backend, kind, &value))
    }

    pub(crate) fn absorb_id(&mut self, column: &str, id: i64) {
        self.values.insert(column.to_string(), FieldValue::Int(id));
    }

    pub(crate) fn ensure_insert_key(&self) -> HydraResult<()> {
        let auto = self.table.auto_increment_column().map(|c| c.name.as_str());
        for column in &self.primary_key {
            let unset = self.values.get(column).is_none_or(FieldValue::is_null);
            if unset && auto != Some(column.as_str()) {
                return Err(HydraError::primary_key_missing(self.table.name.clone()));
            }
        }
        Ok(())
    }

    pub async fn insert<C: ConnectionTrait>(&mut self, conn: &C) -> HydraResult<Option<i64>> {
        self.ensure_insert_key()?;
        let auto = self.table.auto_increment_column().map(|c| c.name.clone());
        let backend = conn.get_database_backend();
        let columns: Vec<String> = self.values.keys().cloned().collect();
        let row = columns
            .iter()
            .map(|column| self.bind(backend, column))
            .collect::<HydraResult<Vec<_>>>()?;
        let ids = insert_rows(conn, &self.table, &columns, vec![row]).await?;
        let id = match (&auto, ids.first()) {
            (Some(column), Some(id)) => {
                self.absorb_id(column, *id);
                Some(*id)
            }
            (Some(column), None) => self.get(column)?.and_then(|value| value.as_i64()),
            (None, _) => None,
        };
        self.mark_clean();
        Ok(id)
    }

    pub async fn update<C: ConnectionTrait>(&mut self, conn: &C) -> HydraResult<u64> {
        let key = self.where_key()?;
        if self.dirty.is_empty() {
            return Ok(0);
        }
        let backend = conn.get_database_backend();
        let mut update = Query::update();
        update.table(ident(&self.table.name));
        for column in &self.dirty {
            update.value(ident(column), self.bind(backend, column)?);
        }
        for (column, value) in &key {
            let kind = self.column(column)?.kind;
            update.and_where(Expr::col(ident(column)).eq(bind_value(backend, kind, value)));
        }
        let affected = exec(conn, &update).await?;
        self.mark_clean();
        Ok(affected)
    }

    pub async fn load<C: ConnectionTrait>(&mut self, conn: &C) -> HydraResult<bool> {
        let key = self.key_pairs()?;
        let mut select = self.select_all();
        self.filter(&mut select, conn.get_database_backend(), &key)?;
        let Some(row) = query_one(conn, &select).await? else {
            return Ok(false);
        };
        self.absorb_row(&row)?;
        Ok(true)
    }

    pub async fn delete<C: ConnectionTrait>(&mut self, conn: &C) -> HydraResult<u64> {
        let key = self.where_key()?;
        let backend = conn.get_database_backend();
        let mut delete = Query::delete();
        delete.from_table(ident(&self.table.name));
        for (column, value) in &key {
            let kind = self.column(column)?.kind;
            delete.and_where(Expr::col(ident(column)).eq(bind_value(backend, kind, value)));
        }
        let affected = exec(conn, &delete).await?;
        self.persisted_key = None;
        Ok(affected)
    }

    pub async fn select_where<C: ConnectionTrait>(
        &self,
        conn: &C,
        filters: &[(String, FieldValue)],
        order_by: &[String],
    ) -> HydraResult<Vec<Record>> {
        let mut select = self.select_all();
        self.filter(&mut select, conn.get_database_backend(), filters)?;
        for column in order_by {
            select.order_by(ident(column), Order::Asc);
        }
        let rows = query_all(conn, &select).await?;
        rows.iter()
            .map(|row| {
                let mut record = Record::new(self.table.clone(), self.primary_key.clone());
                record.absorb_row(row)?;
                Ok(record)
            })
            .collect()
    }

    fn select_all(&self) -> SelectStatement {
        let mut select = Query::select();
        select
            .columns(self.table.columns.iter().map(|column| ident(&column.name)))
            .from(ident(&self.table.name));
        select
    }

    fn filter(
        &self,
        select: &mut SelectStatement,
        backend: DatabaseBackend,
        filters: &[(String, FieldValue)],
    ) -> HydraResult<()> {
        for (column, value) in filters {
            let kind = self.column(column)?.kind;
            if value.is_null() {
                select.and_where(Expr::col(ident(column)).is_null());
            } else {
                select.and_where(Expr::col(ident(column)).eq(bind_value(backend, kind, value)));
            }
        }
        Ok(())
    }

    fn absorb_row(&mut self, row: &QueryResult) -> HydraResult<()> {
        let mut values = BTreeMap::new();
        for column in &self.table.columns {
            let raw = decode_field(row, &column.name, column.kind)?;
            values.insert(column.name.clone(), raw.coerce(column.kind));
        }
        self.values = values;
        self.mark_clean();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;

    fn node_table() -> Arc<TableInfo> {
        let column = |name: &str, declared: &str, pk: bool| ColumnInfo {
            name: name.to_string(),
            default: None,
            nullable: !pk,
            declared_type: declared.to_string(),
            kind: TypeKind::from_declared(declared),
            is_primary_key: pk,
            is_auto_increment: pk,
        };
        Arc::new(TableInfo {
            name: "hydra_node".to_string(),
            columns: vec![
                column("node_id", "integer", true),
                column("node_name", "varchar(200)", false),
                column("node_x", "decimal_text", false),
            ],
            primary_key: vec!["node_id".to_string()],
            foreign_keys: vec![],
        })
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let mut record = Record::new(node_table(), vec!["node_id".to_string()]);
        assert!(matches!(
            record.set("colour", "red"),
            Err(HydraError::Validation { .. })
        ));
        assert!(record.get("colour").is_err());
    }

    #[test]
    fn setting_an_equal_value_keeps_record_clean() {
        let mut record = Record::new(node_table(), vec!["node_id".to_string()]);
        record.set("node_x", "1.0").unwrap();
        record.mark_clean();
        record.set("node_x", Decimal::from_str("1.00").unwrap()).unwrap();
        assert!(!record.is_dirty());
        record.set("node_x", 2).unwrap();
        assert!(record.is_dirty());
        assert_eq!(record.dirty_columns().collect::<Vec<_>>(), vec!["node_x"]);
    }

    #[test]
    fn numeric_columns_reject_text() {
        let mut record = Record::new(node_table(), vec!["node_id".to_string()]);
        assert!(record.set("node_x", "east").is_err());
        record.set("node_x", "1.01").unwrap();
        assert_eq!(
            record.get("node_x").unwrap(),
            Some(FieldValue::Decimal(Decimal::from_str("1.01").unwrap()))
        );
    }

    #[test]
    fn missing_key_is_reported() {
        let record = Record::new(node_table(), vec!["node_id".to_string()]);
        assert!(matches!(
            record.key_values(),
            Err(HydraError::PrimaryKeyMissing { .. })
        ));
        assert_eq!(record.get("node_name").unwrap(), None);
    }
}
