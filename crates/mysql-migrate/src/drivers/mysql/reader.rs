//! MySQL/MariaDB source reader implementation.
//!
//! Implements [`SourceReader`] for catalog discovery and range reads, and
//! [`SchemaSource`] for DDL extraction.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, Row, Value};
use tracing::debug;

use super::{connection_opts, fetch_all, opt_u32, text, timed};
use crate::config::CommandTimeouts;
use crate::core::{
    Column, DatabaseDefaults, ObjectKind, SchemaObject, SchemaSource, SourceReader, Statement,
    TableSchema,
};
use crate::dialect::quote_ident;
use crate::error::{MigrateError, Result};

/// Base tables with their insertable columns and primary key positions.
///
/// Generated columns are left out because they cannot be inserted.
const CATALOG_SQL: &str = r#"
    SELECT
        CAST(c.TABLE_NAME AS CHAR(255)) AS TABLE_NAME,
        CAST(c.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
        CAST(c.DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
        CAST(c.COLUMN_TYPE AS CHAR(1024)) AS COLUMN_TYPE,
        CAST(k.ORDINAL_POSITION AS UNSIGNED) AS PK_ORDINAL
    FROM information_schema.TABLES t
    JOIN information_schema.COLUMNS c
        ON c.TABLE_SCHEMA = t.TABLE_SCHEMA AND c.TABLE_NAME = t.TABLE_NAME
    LEFT JOIN information_schema.KEY_COLUMN_USAGE k
        ON k.TABLE_SCHEMA = c.TABLE_SCHEMA
        AND k.TABLE_NAME = c.TABLE_NAME
        AND k.COLUMN_NAME = c.COLUMN_NAME
        AND k.CONSTRAINT_NAME = 'PRIMARY'
    WHERE t.TABLE_SCHEMA = @database
        AND t.TABLE_TYPE = 'BASE TABLE'
        AND c.EXTRA NOT LIKE '%VIRTUAL GENERATED%'
        AND c.EXTRA NOT LIKE '%STORED GENERATED%'
    ORDER BY t.TABLE_NAME, c.ORDINAL_POSITION
"#;

const DEFAULTS_SQL: &str = r#"
    SELECT
        CAST(DEFAULT_CHARACTER_SET_NAME AS CHAR(255)),
        CAST(DEFAULT_COLLATION_NAME AS CHAR(255))
    FROM information_schema.SCHEMATA
    WHERE SCHEMA_NAME = @database
"#;

fn object_list_sql(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Table => {
            "SELECT CAST(TABLE_NAME AS CHAR(255)) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = @database AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
        }
        ObjectKind::View => {
            "SELECT CAST(TABLE_NAME AS CHAR(255)) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = @database AND TABLE_TYPE = 'VIEW' ORDER BY TABLE_NAME"
        }
        ObjectKind::Function => {
            "SELECT CAST(ROUTINE_NAME AS CHAR(255)) FROM information_schema.ROUTINES \
             WHERE ROUTINE_SCHEMA = @database AND ROUTINE_TYPE = 'FUNCTION' ORDER BY ROUTINE_NAME"
        }
        ObjectKind::Procedure => {
            "SELECT CAST(ROUTINE_NAME AS CHAR(255)) FROM information_schema.ROUTINES \
             WHERE ROUTINE_SCHEMA = @database AND ROUTINE_TYPE = 'PROCEDURE' ORDER BY ROUTINE_NAME"
        }
        ObjectKind::Trigger => {
            "SELECT CAST(TRIGGER_NAME AS CHAR(255)) FROM information_schema.TRIGGERS \
             WHERE TRIGGER_SCHEMA = @database ORDER BY TRIGGER_NAME"
        }
    }
}

/// Column of `SHOW CREATE <kind>` holding the statement text.
fn script_column(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Table => "Create Table",
        ObjectKind::View => "Create View",
        ObjectKind::Function => "Create Function",
        ObjectKind::Procedure => "Create Procedure",
        ObjectKind::Trigger => "SQL Original Statement",
    }
}

/// Group catalog rows into tables, keeping catalog order.
fn tables_from_catalog(rows: Vec<Vec<Value>>) -> Result<Vec<TableSchema>> {
    let mut tables: Vec<(String, Vec<Column>)> = Vec::new();

    for row in rows {
        let [table, name, data_type, column_type, pk_ordinal]: [Value; 5] =
            row.try_into().map_err(|row: Vec<Value>| {
                MigrateError::integrity(format!("catalog row has {} columns, expected 5", row.len()))
            })?;

        let table = text(table, "TABLE_NAME")?;
        let column = Column {
            name: text(name, "COLUMN_NAME")?,
            pk_ordinal: opt_u32(pk_ordinal, "PK_ORDINAL")?,
            data_type: text(data_type, "DATA_TYPE")?,
            column_type: text(column_type, "COLUMN_TYPE")?,
        };

        match tables.last_mut() {
            Some((name, columns)) if *name == table => columns.push(column),
            _ => tables.push((table, vec![column])),
        }
    }

    tables
        .into_iter()
        .map(|(name, columns)| TableSchema::new(name, columns))
        .collect()
}

/// MySQL source reader.
pub struct MysqlReader {
    opts: Opts,
    database: String,
    timeouts: CommandTimeouts,
}

impl MysqlReader {
    /// Create a reader for the database named in `url`. No connection is
    /// opened until the first operation.
    pub fn new(url: &str, timeouts: CommandTimeouts) -> Result<Self> {
        let opts = connection_opts(url)?;
        let database = opts
            .db_name()
            .map(str::to_string)
            .ok_or_else(|| MigrateError::Config("source url must name a database".into()))?;
        Ok(Self {
            opts,
            database,
            timeouts,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    async fn connect(&self) -> Result<Conn> {
        Ok(Conn::new(self.opts.clone()).await?)
    }

    fn database_statement(&self, sql: &str) -> Statement {
        Statement::new(sql).bind("database", Value::from(self.database.as_str()))
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn tables(&self) -> Result<Vec<TableSchema>> {
        let statement = self.database_statement(CATALOG_SQL);
        let rows = timed("read schema", self.timeouts.schema, async {
            let mut conn = self.connect().await?;
            let rows = fetch_all(&mut conn, &statement).await?;
            conn.disconnect().await?;
            Ok(rows)
        })
        .await?;

        let tables = tables_from_catalog(rows)?;
        debug!(database = %self.database, tables = tables.len(), "Loaded source catalog");
        Ok(tables)
    }

    async fn query(&self, statement: &Statement) -> Result<Vec<Vec<Value>>> {
        timed("read", self.timeouts.read, async {
            let mut conn = self.connect().await?;
            let rows = fetch_all(&mut conn, statement).await?;
            conn.disconnect().await?;
            Ok(rows)
        })
        .await
    }
}

#[async_trait]
impl SchemaSource for MysqlReader {
    async fn database_defaults(&self) -> Result<DatabaseDefaults> {
        let statement = self.database_statement(DEFAULTS_SQL);
        let rows = timed("read schema", self.timeouts.schema, async {
            let mut conn = self.connect().await?;
            let rows = fetch_all(&mut conn, &statement).await?;
            conn.disconnect().await?;
            Ok(rows)
        })
        .await?;

        let row = rows.into_iter().next().ok_or_else(|| {
            MigrateError::integrity(format!("source database {} not found", self.database))
        })?;
        let [character_set, collation]: [Value; 2] = row
            .try_into()
            .map_err(|_| MigrateError::integrity("unexpected SCHEMATA row shape"))?;

        Ok(DatabaseDefaults {
            character_set: text(character_set, "DEFAULT_CHARACTER_SET_NAME")?,
            collation: text(collation, "DEFAULT_COLLATION_NAME")?,
        })
    }

    async fn objects(&self) -> Result<Vec<SchemaObject>> {
        timed("read schema", self.timeouts.schema, async {
            let mut conn = self.connect().await?;
            let mut objects = Vec::new();
            for kind in ObjectKind::ALL {
                let statement = self.database_statement(object_list_sql(kind));
                for row in fetch_all(&mut conn, &statement).await? {
                    let name = row
                        .into_iter()
                        .next()
                        .ok_or_else(|| MigrateError::integrity("empty object list row"))?;
                    objects.push(SchemaObject::new(kind, text(name, "object name")?));
                }
            }
            conn.disconnect().await?;
            Ok(objects)
        })
        .await
    }

    async fn create_script(&self, object: &SchemaObject) -> Result<String> {
        let sql = format!("SHOW CREATE {} {}", object.kind.keyword(), quote_ident(&object.name));
        timed("read schema", self.timeouts.schema, async {
            let mut conn = self.connect().await?;
            let row: Option<Row> = conn.query_first(sql).await?;
            conn.disconnect().await?;

            let mut row = row.ok_or_else(|| {
                MigrateError::integrity(format!("no create script for {} {}", object.kind, object.name))
            })?;
            let column = script_column(object.kind);
            let idx = row
                .columns_ref()
                .iter()
                .position(|c| c.name_str() == column)
                .ok_or_else(|| {
                    MigrateError::integrity(format!(
                        "SHOW CREATE {} returned no '{}' column",
                        object.kind.keyword(),
                        column
                    ))
                })?;
            let script = row.take::<Value, _>(idx).unwrap_or(Value::NULL);
            text(script, column)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    #[test]
    fn test_tables_from_catalog_groups_rows() {
        let rows = vec![
            vec![bytes("items"), bytes("order_id"), bytes("int"), bytes("int"), Value::UInt(1)],
            vec![bytes("items"), bytes("line"), bytes("int"), bytes("int"), Value::UInt(2)],
            vec![bytes("items"), bytes("sku"), bytes("varchar"), bytes("varchar(32)"), Value::NULL],
            vec![bytes("log"), bytes("message"), bytes("text"), bytes("text"), Value::NULL],
        ];
        let tables = tables_from_catalog(rows).unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name(), "items");
        assert_eq!(tables[0].primary_key_names(), vec!["order_id", "line"]);
        assert_eq!(tables[0].columns()[2].column_type, "varchar(32)");
        assert!(!tables[1].has_primary_key());
    }

    #[test]
    fn test_tables_from_catalog_rejects_bad_ordinals() {
        let rows = vec![vec![bytes("t"), bytes("a"), bytes("int"), bytes("int"), Value::UInt(2)]];
        assert!(matches!(
            tables_from_catalog(rows),
            Err(MigrateError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_script_columns() {
        assert_eq!(script_column(ObjectKind::Trigger), "SQL Original Statement");
        assert_eq!(script_column(ObjectKind::View), "Create View");
    }

    #[test]
    fn test_reader_requires_database() {
        assert!(MysqlReader::new("mysql://root@localhost:3306", CommandTimeouts::default()).is_err());
        let reader = MysqlReader::new("mysql://root@localhost:3306/shop", CommandTimeouts::default()).unwrap();
        assert_eq!(reader.database(), "shop");
    }
}
