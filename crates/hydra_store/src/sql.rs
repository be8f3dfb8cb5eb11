use log::debug;
use rust_decimal::Decimal;
use sea_orm::prelude::{DateTime, DateTimeUtc, DateTimeWithTimeZone};
use sea_orm::sea_query::{
    Alias, MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder,
    Value as SeaValue,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult, Statement};

use hydra_core::{FieldValue, HydraError, HydraResult, TypeKind, parse_decimal};

pub(crate) fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

pub(crate) fn statement<S: QueryStatementWriter>(backend: DatabaseBackend, stmt: &S) -> Statement {
    let (sql, values) = build_stmt(backend, stmt);
    debug!("sql: {sql}");
    Statement::from_sql_and_values(backend, sql, values)
}

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> HydraResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let result = conn.execute_raw(statement(backend, stmt)).await?;
    Ok(result.rows_affected())
}

pub(crate) async fn exec_insert<C, S>(conn: &C, stmt: &S) -> HydraResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let result = conn.execute_raw(statement(backend, stmt)).await?;
    Ok(result.last_insert_id())
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> HydraResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let rows = conn.query_all_raw(statement(backend, stmt)).await?;
    Ok(rows)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> HydraResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let row = conn.query_one_raw(statement(backend, stmt)).await?;
    Ok(row)
}

pub(crate) fn ident(name: &str) -> Alias {
    Alias::new(name.to_string())
}

/// Binds a value for a column of `kind`. Decimals bind natively on Postgres
/// and as text elsewhere so no binary float ever reaches the database.
pub(crate) fn bind_value(backend: DatabaseBackend, kind: TypeKind, value: &FieldValue) -> SeaValue {
    match value {
        FieldValue::Null => null_value(backend, kind),
        FieldValue::Bool(value) => match kind {
            TypeKind::Integer => i64::from(*value).into(),
            _ => (*value).into(),
        },
        FieldValue::Int(value) => match kind {
            TypeKind::Decimal => decimal_value(backend, Decimal::from(*value)),
            TypeKind::Text => value.to_string().into(),
            _ => (*value).into(),
        },
        FieldValue::Float(value) => (*value).into(),
        FieldValue::Decimal(value) => decimal_value(backend, *value),
        FieldValue::Text(text) => match (kind, backend) {
            (TypeKind::DateTime, DatabaseBackend::Postgres) => parse_naive(text)
                .map(SeaValue::from)
                .unwrap_or_else(|| text.clone().into()),
            _ => text.clone().into(),
        },
        FieldValue::Bytes(bytes) => bytes.clone().into(),
        FieldValue::Json(json) => json.to_string().into(),
    }
}

fn decimal_value(backend: DatabaseBackend, value: Decimal) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => value.into(),
        _ => value.normalize().to_string().into(),
    }
}

fn null_value(backend: DatabaseBackend, kind: TypeKind) -> SeaValue {
    match kind {
        TypeKind::Integer => Option::<i64>::None.into(),
        TypeKind::Decimal if backend == DatabaseBackend::Postgres => Option::<Decimal>::None.into(),
        TypeKind::Boolean => Option::<bool>::None.into(),
        TypeKind::Blob => Option::<Vec<u8>>::None.into(),
        TypeKind::DateTime if backend == DatabaseBackend::Postgres => {
            Option::<DateTime>::None.into()
        }
        _ => Option::<String>::None.into(),
    }
}

fn parse_naive(text: &str) -> Option<DateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.fZ"]
        .into_iter()
        .find_map(|layout| DateTime::parse_from_str(text.trim(), layout).ok())
}

pub(crate) fn decode_field(row: &QueryResult, column: &str, kind: TypeKind) -> HydraResult<FieldValue> {
    let decoded = match kind {
        TypeKind::Integer => read_int(row, column),
        TypeKind::Decimal => read_decimal(row, column),
        TypeKind::Text => read_text(row, column),
        TypeKind::Blob => read_blob(row, column),
        TypeKind::DateTime => read_datetime(row, column),
        TypeKind::Boolean => read_bool(row, column),
    };
    decoded.ok_or_else(|| HydraError::storage(format!("unsupported value in column '{column}'")))
}

fn read_int(row: &QueryResult, column: &str) -> Option<FieldValue> {
    if let Ok(value) = row.try_get::<Option<i64>>("", column) {
        return Some(value.into());
    }
    if let Ok(value) = row.try_get::<Option<i32>>("", column) {
        return Some(value.into());
    }
    if let Ok(value) = row.try_get::<Option<i16>>("", column) {
        return Some(value.map(i64::from).into());
    }
    if let Ok(value) = row.try_get::<Option<bool>>("", column) {
        return Some(value.into());
    }
    read_text(row, column)
}

fn read_decimal(row: &QueryResult, column: &str) -> Option<FieldValue> {
    if let Ok(value) = row.try_get::<Option<String>>("", column) {
        return Some(match value {
            Some(text) => match parse_decimal(&text) {
                Some(decimal) => FieldValue::Decimal(decimal),
                None => FieldValue::Text(text),
            },
            None => FieldValue::Null,
        });
    }
    if let Ok(value) = row.try_get::<Option<Decimal>>("", column) {
        return Some(value.into());
    }
    if let Ok(value) = row.try_get::<Option<f64>>("", column) {
        return Some(value.into());
    }
    if let Ok(value) = row.try_get::<Option<i64>>("", column) {
        return Some(value.into());
    }
    None
}

fn read_text(row: &QueryResult, column: &str) -> Option<FieldValue> {
    if let Ok(value) = row.try_get::<Option<String>>("", column) {
        return Some(value.into());
    }
    if let Ok(value) = row.try_get::<Option<i64>>("", column) {
        return Some(value.into());
    }
    if let Ok(value) = row.try_get::<Option<f64>>("", column) {
        return Some(value.into());
    }
    None
}

fn read_blob(row: &QueryResult, column: &str) -> Option<FieldValue> {
    if let Ok(value) = row.try_get::<Option<Vec<u8>>>("", column) {
        return Some(value.into());
    }
    read_text(row, column)
}

fn read_datetime(row: &QueryResult, column: &str) -> Option<FieldValue> {
    if let Ok(value) = row.try_get::<Option<String>>("", column) {
        return Some(value.into());
    }
    if let Ok(value) = row.try_get::<Option<DateTime>>("", column) {
        return Some(value.map(|v| v.to_string()).into());
    }
    if let Ok(value) = row.try_get::<Option<DateTimeUtc>>("", column) {
        return Some(value.map(|v| v.naive_utc().to_string()).into());
    }
    if let Ok(value) = row.try_get::<Option<DateTimeWithTimeZone>>("", column) {
        return Some(value.map(|v| v.naive_utc().to_string()).into());
    }
    None
}

fn read_bool(row: &QueryResult, column: &str) -> Option<FieldValue> {
    if let Ok(value) = row.try_get::<Option<bool>>("", column) {
        return Some(value.into());
    }
    read_int(row, column)
}

pub(crate) fn read_i64(row: &QueryResult, column: &str) -> HydraResult<Option<i64>> {
    match read_int(row, column) {
        Some(FieldValue::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| HydraError::storage(format!("column '{column}' is not an integer"))),
        None => Err(HydraError::storage(format!("column '{column}' is missing"))),
    }
}

pub(crate) fn read_string(row: &QueryResult, column: &str) -> HydraResult<Option<String>> {
    match read_text(row, column) {
        Some(FieldValue::Null) => Ok(None),
        Some(FieldValue::Text(text)) => Ok(Some(text)),
        Some(FieldValue::Int(value)) => Ok(Some(value.to_string())),
        Some(FieldValue::Float(value)) => Ok(Some(value.to_string())),
        _ => Err(HydraError::storage(format!("column '{column}' is missing"))),
    }
}
