use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult, Statement};
use serde::Serialize;

use hydra_core::{Hierarchy, HydraError, HydraResult, TypeKind};

use crate::sql::{read_i64, read_string};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub default: Option<String>,
    pub nullable: bool,
    pub declared_type: String,
    pub kind: TypeKind,
    pub is_primary_key: bool,
    pub is_auto_increment: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn auto_increment_column(&self) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.is_auto_increment)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChildLink {
    pub child_table: String,
    pub column: String,
    pub referenced_column: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Catalog {
    tables: BTreeMap<String, Arc<TableInfo>>,
    #[serde(skip)]
    children: BTreeMap<String, Vec<ChildLink>>,
}

struct ColumnRow {
    table: String,
    name: String,
    declared_type: String,
    not_null: bool,
    default: Option<String>,
    pk_index: i64,
    auto_increment: bool,
}

struct ForeignKeyRow {
    table: String,
    column: String,
    referenced_table: String,
    referenced_column: Option<String>,
}

impl Catalog {
    /// Introspects `schema_name` (or the backend default) with one query for
    /// columns and one for foreign keys.
    pub async fn build<C: ConnectionTrait>(conn: &C, schema_name: Option<&str>) -> HydraResult<Self> {
        let backend = conn.get_database_backend();
        let schema = match schema_name {
            Some(name) => name.to_string(),
            None => default_schema(conn).await?,
        };
        let column_rows = conn
            .query_all_raw(columns_statement(backend, &schema)?)
            .await
            .map_err(|err| HydraError::schema(format!("introspect columns of '{schema}': {err}")))?;
        if column_rows.is_empty() {
            return Err(HydraError::schema(format!(
                "schema '{schema}' has no tables"
            )));
        }
        let columns = column_rows
            .iter()
            .map(|row| read_column_row(row, backend))
            .collect::<HydraResult<Vec<_>>>()?;
        let fk_rows = conn
            .query_all_raw(foreign_keys_statement(backend, &schema)?)
            .await
            .map_err(|err| {
                HydraError::schema(format!("introspect foreign keys of '{schema}': {err}"))
            })?;
        let foreign_keys = fk_rows
            .iter()
            .map(read_fk_row)
            .collect::<HydraResult<Vec<_>>>()?;

        let catalog = Self::assemble(columns, foreign_keys);
        info!(
            "catalog built for schema '{schema}' with {} tables",
            catalog.tables.len()
        );
        Ok(catalog)
    }

    fn assemble(columns: Vec<ColumnRow>, foreign_keys: Vec<ForeignKeyRow>) -> Self {
        let mut tables: BTreeMap<String, TableInfo> = BTreeMap::new();
        let mut pk_order: BTreeMap<String, Vec<(i64, String)>> = BTreeMap::new();
        for row in columns {
            let table = tables.entry(row.table.clone()).or_insert_with(|| TableInfo {
                name: row.table.clone(),
                columns: Vec::new(),
                primary_key: Vec::new(),
                foreign_keys: Vec::new(),
            });
            if row.pk_index > 0 {
                pk_order
                    .entry(row.table.clone())
                    .or_default()
                    .push((row.pk_index, row.name.clone()));
            }
            table.columns.push(ColumnInfo {
                kind: TypeKind::from_declared(&row.declared_type),
                name: row.name,
                default: row.default,
                nullable: !row.not_null,
                declared_type: row.declared_type,
                is_primary_key: row.pk_index > 0,
                is_auto_increment: row.auto_increment,
            });
        }
        for (table_name, mut keys) in pk_order {
            keys.sort();
            if let Some(table) = tables.get_mut(&table_name) {
                table.primary_key = keys.into_iter().map(|(_, name)| name).collect();
                if table.primary_key.len() > 1 {
                    for column in &mut table.columns {
                        column.is_auto_increment = false;
                    }
                }
            }
        }
        for row in foreign_keys {
            let referenced_column = row.referenced_column.or_else(|| {
                tables
                    .get(&row.referenced_table)
                    .and_then(|table| table.primary_key.first().cloned())
            });
            let (Some(referenced_column), Some(table)) =
                (referenced_column, tables.get_mut(&row.table))
            else {
                continue;
            };
            table.foreign_keys.push(ForeignKey {
                column: row.column,
                referenced_table: row.referenced_table,
                referenced_column,
            });
        }
        Self::from_parts(tables.into_values())
    }

    pub fn from_parts(tables: impl IntoIterator<Item = TableInfo>) -> Self {
        let mut children: BTreeMap<String, Vec<ChildLink>> = BTreeMap::new();
        let mut by_name = BTreeMap::new();
        for table in tables {
            for fk in &table.foreign_keys {
                children
                    .entry(fk.referenced_table.clone())
                    .or_default()
                    .push(ChildLink {
                        child_table: table.name.clone(),
                        column: fk.column.clone(),
                        referenced_column: fk.referenced_column.clone(),
                    });
            }
            by_name.insert(table.name.clone(), Arc::new(table));
        }
        for links in children.values_mut() {
            links.sort_by(|a, b| {
                (a.child_table.as_str(), a.column.as_str())
                    .cmp(&(b.child_table.as_str(), b.column.as_str()))
            });
        }
        Self {
            tables: by_name,
            children,
        }
    }

    pub fn table(&self, name: &str) -> Option<Arc<TableInfo>> {
        self.tables.get(name).cloned()
    }

    pub fn require_table(&self, name: &str) -> HydraResult<Arc<TableInfo>> {
        self.table(name)
            .ok_or_else(|| HydraError::schema(format!("table '{name}' is not in the catalog")))
    }

    pub fn columns_of(&self, name: &str) -> Option<&[ColumnInfo]> {
        self.tables.get(name).map(|table| table.columns.as_slice())
    }

    pub fn children_of(&self, parent_table: &str) -> &[ChildLink] {
        self.children
            .get(parent_table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn parent_links_of(&self, child_table: &str) -> &[ForeignKey] {
        self.tables
            .get(child_table)
            .map(|table| table.foreign_keys.as_slice())
            .unwrap_or(&[])
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Every registered entity must map onto an existing table and key.
    pub fn validate_hierarchy(&self, hierarchy: &Hierarchy) -> HydraResult<()> {
        for node in hierarchy.entities() {
            let table = self.tables.get(&node.table_name).ok_or_else(|| {
                HydraError::schema(format!(
                    "entity '{}' maps to missing table '{}'",
                    node.entity_name, node.table_name
                ))
            })?;
            for column in &node.primary_key_columns {
                if !table.has_column(column) {
                    return Err(HydraError::schema(format!(
                        "entity '{}' key column '{column}' is missing from '{}'",
                        node.entity_name, node.table_name
                    )));
                }
            }
        }
        debug!("hierarchy of {} entities matches catalog", hierarchy.len());
        Ok(())
    }
}

async fn default_schema<C: ConnectionTrait>(conn: &C) -> HydraResult<String> {
    match conn.get_database_backend() {
        DatabaseBackend::Postgres => Ok("public".to_string()),
        DatabaseBackend::MySql => {
            let row = conn
                .query_one_raw(Statement::from_string(
                    DatabaseBackend::MySql,
                    "SELECT DATABASE() AS schema_name",
                ))
                .await?
                .ok_or_else(|| HydraError::schema("no database selected"))?;
            read_string(&row, "schema_name")?.ok_or_else(|| HydraError::schema("no database selected"))
        }
        _ => Ok("main".to_string()),
    }
}

fn checked_schema_name(schema: &str) -> HydraResult<&str> {
    let valid = !schema.is_empty()
        && schema
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        Ok(schema)
    } else {
        Err(HydraError::schema(format!("invalid schema name '{schema}'")))
    }
}

const SQLITE_COLUMNS: &str = r#"
SELECT m.name AS table_name, p.name AS column_name, p.type AS declared_type,
       p."notnull" AS not_null, p.dflt_value AS column_default, p.pk AS pk_index,
       0 AS auto_increment
FROM "{schema}".sqlite_master m
JOIN pragma_table_info(m.name, '{schema}') p
WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%' AND m.name <> 'seaql_migrations'
ORDER BY m.name, p.cid"#;

const SQLITE_FOREIGN_KEYS: &str = r#"
SELECT m.name AS table_name, f."from" AS column_name, f."table" AS referenced_table,
       f."to" AS referenced_column
FROM "{schema}".sqlite_master m
JOIN pragma_foreign_key_list(m.name, '{schema}') f
WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%' AND m.name <> 'seaql_migrations'
ORDER BY m.name, f.id, f.seq"#;

const POSTGRES_COLUMNS: &str = r#"
SELECT c.table_name::text AS table_name, c.column_name::text AS column_name,
       c.data_type::text AS declared_type,
       CASE WHEN c.is_nullable = 'NO' THEN 1 ELSE 0 END AS not_null,
       c.column_default::text AS column_default,
       COALESCE(k.ordinal_position, 0)::bigint AS pk_index,
       CASE WHEN c.column_default LIKE 'nextval(%' OR c.is_identity = 'YES' THEN 1 ELSE 0 END
           AS auto_increment
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema AND t.table_name = c.table_name
 AND t.table_type = 'BASE TABLE'
LEFT JOIN (
    SELECT ku.table_schema, ku.table_name, ku.column_name, ku.ordinal_position
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage ku
      ON ku.constraint_name = tc.constraint_name AND ku.table_schema = tc.table_schema
     AND ku.table_name = tc.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
) k ON k.table_schema = c.table_schema AND k.table_name = c.table_name
   AND k.column_name = c.column_name
WHERE c.table_schema = $1 AND c.table_name <> 'seaql_migrations'
ORDER BY c.table_name, c.ordinal_position"#;

const POSTGRES_FOREIGN_KEYS: &str = r#"
SELECT kcu.table_name::text AS table_name, kcu.column_name::text AS column_name,
       ccu.table_name::text AS referenced_table, ccu.column_name::text AS referenced_column
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema
JOIN information_schema.constraint_column_usage ccu
  ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema
WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1
ORDER BY kcu.table_name, kcu.constraint_name, kcu.ordinal_position"#;

const MYSQL_COLUMNS: &str = r#"
SELECT c.TABLE_NAME AS table_name, c.COLUMN_NAME AS column_name,
       CAST(c.COLUMN_TYPE AS CHAR) AS declared_type,
       CASE WHEN c.IS_NULLABLE = 'NO' THEN 1 ELSE 0 END AS not_null,
       CAST(c.COLUMN_DEFAULT AS CHAR) AS column_default,
       CAST(COALESCE(k.ORDINAL_POSITION, 0) AS SIGNED) AS pk_index,
       CASE WHEN c.EXTRA LIKE '%auto_increment%' THEN 1 ELSE 0 END AS auto_increment
FROM information_schema.COLUMNS c
JOIN information_schema.TABLES t
  ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
 AND t.TABLE_TYPE = 'BASE TABLE'
LEFT JOIN information_schema.KEY_COLUMN_USAGE k
  ON k.TABLE_SCHEMA = c.TABLE_SCHEMA AND k.TABLE_NAME = c.TABLE_NAME
 AND k.COLUMN_NAME = c.COLUMN_NAME AND k.CONSTRAINT_NAME = 'PRIMARY'
WHERE c.TABLE_SCHEMA = ? AND c.TABLE_NAME <> 'seaql_migrations'
ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION"#;

const MYSQL_FOREIGN_KEYS: &str = r#"
SELECT k.TABLE_NAME AS table_name, k.COLUMN_NAME AS column_name,
       k.REFERENCED_TABLE_NAME AS referenced_table, k.REFERENCED_COLUMN_NAME AS referenced_column
FROM information_schema.KEY_COLUMN_USAGE k
WHERE k.TABLE_SCHEMA = ? AND k.REFERENCED_TABLE_NAME IS NOT NULL
ORDER BY k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION"#;

fn columns_statement(backend: DatabaseBackend, schema: &str) -> HydraResult<Statement> {
    introspection_statement(backend, schema, SQLITE_COLUMNS, POSTGRES_COLUMNS, MYSQL_COLUMNS)
}

fn foreign_keys_statement(backend: DatabaseBackend, schema: &str) -> HydraResult<Statement> {
    introspection_statement(
        backend,
        schema,
        SQLITE_FOREIGN_KEYS,
        POSTGRES_FOREIGN_KEYS,
        MYSQL_FOREIGN_KEYS,
    )
}

fn introspection_statement(
    backend: DatabaseBackend,
    schema: &str,
    sqlite: &str,
    postgres: &str,
    mysql: &str,
) -> HydraResult<Statement> {
    Ok(match backend {
        DatabaseBackend::Postgres => {
            Statement::from_sql_and_values(backend, postgres, [schema.to_string().into()])
        }
        DatabaseBackend::MySql => {
            Statement::from_sql_and_values(backend, mysql, [schema.to_string().into()])
        }
        _ => {
            // pragma table functions take no bind parameters for the schema
            let schema = checked_schema_name(schema)?;
            Statement::from_string(backend, sqlite.replace("{schema}", schema))
        }
    })
}

fn required(row: &QueryResult, column: &str) -> HydraResult<String> {
    read_string(row, column)?
        .ok_or_else(|| HydraError::schema(format!("introspection column '{column}' is null")))
}

fn read_column_row(row: &QueryResult, backend: DatabaseBackend) -> HydraResult<ColumnRow> {
    let declared_type = read_string(row, "declared_type")?.unwrap_or_default();
    let pk_index = read_i64(row, "pk_index")?.unwrap_or(0);
    let mut auto_increment = read_i64(row, "auto_increment")?.unwrap_or(0) != 0;
    if backend == DatabaseBackend::Sqlite {
        // only a lone INTEGER key aliases the rowid; composite keys are
        // filtered out once every column of the table is known
        auto_increment = pk_index == 1 && declared_type.eq_ignore_ascii_case("integer");
    }
    Ok(ColumnRow {
        table: required(row, "table_name")?,
        name: required(row, "column_name")?,
        declared_type,
        not_null: read_i64(row, "not_null")?.unwrap_or(0) != 0,
        default: read_string(row, "column_default")?,
        pk_index,
        auto_increment,
    })
}

fn read_fk_row(row: &QueryResult) -> HydraResult<ForeignKeyRow> {
    Ok(ForeignKeyRow {
        table: required(row, "table_name")?,
        column: required(row, "column_name")?,
        referenced_table: required(row, "referenced_table")?,
        referenced_column: read_string(row, "referenced_column")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_core::HierarchyNode;

    fn column(name: &str, declared: &str, pk: bool) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            default: None,
            nullable: !pk,
            declared_type: declared.to_string(),
            kind: TypeKind::from_declared(declared),
            is_primary_key: pk,
            is_auto_increment: pk,
        }
    }

    fn sample() -> Catalog {
        Catalog::from_parts([
            TableInfo {
                name: "hydra_project".to_string(),
                columns: vec![column("project_id", "integer", true)],
                primary_key: vec!["project_id".to_string()],
                foreign_keys: vec![],
            },
            TableInfo {
                name: "hydra_network".to_string(),
                columns: vec![
                    column("network_id", "integer", true),
                    column("project_id", "integer", false),
                ],
                primary_key: vec!["network_id".to_string()],
                foreign_keys: vec![ForeignKey {
                    column: "project_id".to_string(),
                    referenced_table: "hydra_project".to_string(),
                    referenced_column: "project_id".to_string(),
                }],
            },
        ])
    }

    #[test]
    fn children_are_indexed_by_referenced_table() {
        let catalog = sample();
        let children = catalog.children_of("hydra_project");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].child_table, "hydra_network");
        assert_eq!(children[0].column, "project_id");
        assert!(catalog.children_of("hydra_network").is_empty());
        assert_eq!(catalog.parent_links_of("hydra_network").len(), 1);
    }

    #[test]
    fn composite_sqlite_keys_are_not_auto_increment() {
        let rows = vec![
            ColumnRow {
                table: "t".to_string(),
                name: "a".to_string(),
                declared_type: "INTEGER".to_string(),
                not_null: true,
                default: None,
                pk_index: 1,
                auto_increment: true,
            },
            ColumnRow {
                table: "t".to_string(),
                name: "b".to_string(),
                declared_type: "INTEGER".to_string(),
                not_null: true,
                default: None,
                pk_index: 2,
                auto_increment: false,
            },
        ];
        let catalog = Catalog::assemble(rows, vec![]);
        let table = catalog.table("t").unwrap();
        assert_eq!(table.primary_key, vec!["a", "b"]);
        assert!(table.auto_increment_column().is_none());
    }

    #[test]
    fn hierarchy_must_match_tables() {
        let catalog = sample();
        let good = Hierarchy::new([HierarchyNode {
            entity_name: "project".to_string(),
            table_name: "hydra_project".to_string(),
            parent_entity: None,
            primary_key_columns: vec!["project_id".to_string()],
        }])
        .unwrap();
        assert!(catalog.validate_hierarchy(&good).is_ok());
        let bad = Hierarchy::new([HierarchyNode {
            entity_name: "node".to_string(),
            table_name: "hydra_node".to_string(),
            parent_entity: None,
            primary_key_columns: vec!["node_id".to_string()],
        }])
        .unwrap();
        assert!(matches!(
            catalog.validate_hierarchy(&bad),
            Err(HydraError::Schema { .. })
        ));
    }

    #[test]
    fn schema_names_are_identifiers() {
        assert!(checked_schema_name("main").is_ok());
        assert!(checked_schema_name("main'; drop").is_err());
    }
}
