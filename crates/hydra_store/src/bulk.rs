use log::{debug, warn};
use sea_orm::sea_query::{Query, SimpleExpr, Value as SeaValue};
use sea_orm::{ConnectionTrait, DatabaseBackend};

use hydra_core::{HydraError, HydraResult};

use crate::catalog::TableInfo;
use crate::entity::{Entity, EntityState};
use crate::sql::{exec, exec_insert, ident, query_all, read_i64};

/// Which row of a multi-row INSERT the driver-reported id belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdAnchor {
    First,
    Last,
}

/// Expands one reported id into the contiguous ids of a `count`-row insert.
pub fn reconcile_ids(reported: i64, count: usize, anchor: IdAnchor) -> HydraResult<Vec<i64>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let span = i64::try_from(count)
        .map_err(|_| HydraError::storage(format!("batch of {count} rows is too large")))?;
    let first = match anchor {
        IdAnchor::First => reported,
        IdAnchor::Last => reported - span + 1,
    };
    if first < 1 {
        return Err(HydraError::storage(format!(
            "driver reported id {reported} for {count} inserted rows"
        )));
    }
    Ok((first..first + span).collect())
}

pub(crate) async fn insert_rows<C: ConnectionTrait>(
    conn: &C,
    table: &TableInfo,
    columns: &[String],
    rows: Vec<Vec<SeaValue>>,
) -> HydraResult<Vec<i64>> {
    let count = rows.len();
    if count == 0 {
        return Ok(Vec::new());
    }
    let backend = conn.get_database_backend();
    let auto = table
        .auto_increment_column()
        .map(|column| column.name.as_str())
        .filter(|name| !columns.iter().any(|column| column == name));

    if columns.is_empty() {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let mut insert = Query::insert();
            insert.into_table(ident(&table.name)).or_default_values();
            ids.extend(run_insert(conn, backend, insert, auto, 1).await?);
        }
        return Ok(ids);
    }

    let mut insert = Query::insert();
    insert
        .into_table(ident(&table.name))
        .columns(columns.iter().map(|column| ident(column)));
    for row in rows {
        insert
            .values(row.into_iter().map(SimpleExpr::from))
            .map_err(|err| HydraError::storage(format!("insert into {}: {err}", table.name)))?;
    }
    debug!("inserting {count} rows into {}", table.name);
    run_insert(conn, backend, insert, auto, count).await
}

async fn run_insert<C: ConnectionTrait>(
    conn: &C,
    backend: DatabaseBackend,
    mut insert: sea_orm::sea_query::InsertStatement,
    auto: Option<&str>,
    count: usize,
) -> HydraResult<Vec<i64>> {
    let Some(auto) = auto else {
        exec(conn, &insert).await?;
        return Ok(Vec::new());
    };
    if backend == DatabaseBackend::MySql {
        let reported = exec_insert(conn, &insert).await?;
        let reported = i64::try_from(reported)
            .map_err(|_| HydraError::storage(format!("id {reported} overflows i64")))?;
        return reconcile_ids(reported, count, IdAnchor::First);
    }
    insert.returning_col(ident(auto));
    let rows = query_all(conn, &insert).await?;
    let mut ids = rows
        .iter()
        .map(|row| {
            read_i64(row, auto)?
                .ok_or_else(|| HydraError::storage(format!("RETURNING gave a null {auto}")))
        })
        .collect::<HydraResult<Vec<_>>>()?;
    if ids.len() != count {
        return Err(HydraError::storage(format!(
            "inserted {count} rows but {} ids came back",
            ids.len()
        )));
    }
    ids.sort_unstable();
    if ids.windows(2).any(|pair| pair[1] != pair[0] + 1) {
        warn!("non-contiguous ids returned for {count} rows: {ids:?}");
    }
    Ok(ids)
}

/// Inserts a batch of new entities of one table with the same assigned
/// columns, writing generated ids back in input order. Returns the last id.
pub async fn bulk_insert<C: ConnectionTrait>(
    conn: &C,
    entities: &mut [Entity],
    max_rows: usize,
) -> HydraResult<Option<i64>> {
    let Some(first) = entities.first() else {
        warn!("bulk insert called with an empty batch");
        return Ok(None);
    };
    let table = first.record().table_info();
    let columns: Vec<String> = first
        .record()
        .column_set()
        .into_iter()
        .map(str::to_string)
        .collect();
    for (index, entity) in entities.iter().enumerate() {
        if entity.record().table_name() != table.name {
            return Err(HydraError::batch_column_mismatch(
                table.name.clone(),
                format!(
                    "entity {index} belongs to '{}'",
                    entity.record().table_name()
                ),
            ));
        }
        let own: Vec<&str> = entity.record().column_set().into_iter().collect();
        if own != columns.iter().map(String::as_str).collect::<Vec<_>>() {
            return Err(HydraError::batch_column_mismatch(
                table.name.clone(),
                format!("entity {index} assigns {own:?}, expected {columns:?}"),
            ));
        }
        if entity.state() != EntityState::New {
            return Err(HydraError::validation(format!(
                "entity {index} of '{}' is already persisted",
                table.name
            )));
        }
        entity.record().ensure_insert_key()?;
    }

    let backend = conn.get_database_backend();
    let auto = table
        .auto_increment_column()
        .map(|column| column.name.clone())
        .filter(|name| !columns.contains(name));
    let mut last_id = None;
    for chunk in entities.chunks_mut(max_rows.max(1)) {
        let rows = chunk
            .iter()
            .map(|entity| {
                columns
                    .iter()
                    .map(|column| entity.record().bind(backend, column))
                    .collect::<HydraResult<Vec<_>>>()
            })
            .collect::<HydraResult<Vec<_>>>()?;
        let ids = insert_rows(conn, &table, &columns, rows).await?;
        if let Some(column) = &auto {
            for (entity, id) in chunk.iter_mut().zip(&ids) {
                entity.record_mut().absorb_id(column, *id);
            }
            last_id = ids.last().copied().or(last_id);
        } else if let Some(entity) = chunk.last() {
            last_id = entity.id().or(last_id);
        }
        for entity in chunk.iter_mut() {
            entity.mark_inserted();
        }
    }
    Ok(last_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_anchor_counts_forward() {
        assert_eq!(
            reconcile_ids(101, 3, IdAnchor::First).unwrap(),
            vec![101, 102, 103]
        );
    }

    #[test]
    fn last_anchor_counts_back() {
        assert_eq!(
            reconcile_ids(103, 3, IdAnchor::Last).unwrap(),
            vec![101, 102, 103]
        );
    }

    #[test]
    fn impossible_ids_are_rejected() {
        assert!(reconcile_ids(2, 5, IdAnchor::Last).is_err());
        assert!(reconcile_ids(7, 0, IdAnchor::Last).unwrap().is_empty());
    }
}
