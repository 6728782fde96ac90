//! MySQL/MariaDB target writer implementation.
//!
//! Implements [`TargetWriter`] for transactional batch inserts and
//! [`SchemaTarget`] for database creation and DDL replay.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, IsolationLevel, Opts, OptsBuilder, TxOpts};
use tracing::{debug, warn};

use super::{connection_opts, timed, to_positional};
use crate::config::CommandTimeouts;
use crate::core::{DatabaseDefaults, InsertSession, SchemaObject, SchemaTarget, Statement, TargetWriter};
use crate::dialect::{quote_ident, quote_literal};
use crate::error::{MigrateError, Result};

const DISABLE_CHECKS: [&str; 2] = ["SET unique_checks = 0", "SET foreign_key_checks = 0"];

/// MySQL target writer.
pub struct MysqlWriter {
    opts: Opts,
    database: String,
    timeouts: CommandTimeouts,
}

impl MysqlWriter {
    /// Create a writer for the database named in `url`. No connection is
    /// opened until the first operation.
    pub fn new(url: &str, timeouts: CommandTimeouts) -> Result<Self> {
        let opts = connection_opts(url)?;
        let database = opts
            .db_name()
            .map(str::to_string)
            .ok_or_else(|| MigrateError::Config("destination url must name a database".into()))?;
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

    /// Connection without a default database, for `CREATE DATABASE`.
    async fn connect_server(&self) -> Result<Conn> {
        let opts = OptsBuilder::from_opts(self.opts.clone()).db_name(None::<String>);
        Ok(Conn::new(opts).await?)
    }

    async fn disable_checks(conn: &mut Conn) -> Result<()> {
        for sql in DISABLE_CHECKS {
            conn.query_drop(sql).await?;
        }
        Ok(())
    }

    async fn insert_on(
        conn: &mut Conn,
        statement: &Statement,
        session: &InsertSession,
    ) -> Result<u64> {
        Self::disable_checks(conn).await?;
        if let Some(sql_mode) = &session.sql_mode {
            conn.query_drop(session_sql_mode(sql_mode)).await?;
        }

        let (sql, params) = to_positional(statement)?;
        let mut tx_opts = TxOpts::default();
        tx_opts.with_isolation_level(IsolationLevel::ReadCommitted);
        let mut tx = conn.start_transaction(tx_opts).await?;

        match tx.exec_drop(sql, params).await {
            Ok(()) => {
                let affected = tx.affected_rows();
                tx.commit().await?;
                Ok(affected)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback after failed insert also failed");
                }
                Err(e.into())
            }
        }
    }
}

fn session_sql_mode(sql_mode: &str) -> String {
    format!("SET SESSION sql_mode = {}", quote_literal(sql_mode))
}

fn create_database_sql(database: &str, defaults: &DatabaseDefaults) -> String {
    format!(
        "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET {} COLLATE {}",
        quote_ident(database),
        quote_literal(&defaults.character_set),
        quote_literal(&defaults.collation)
    )
}

fn drop_object_sql(object: &SchemaObject) -> String {
    format!(
        "DROP {} IF EXISTS {}",
        object.kind.keyword(),
        quote_ident(&object.name)
    )
}

#[async_trait]
impl TargetWriter for MysqlWriter {
    async fn execute_insert(&self, statement: &Statement, session: &InsertSession) -> Result<u64> {
        timed("insert", self.timeouts.insert, async {
            let mut conn = self.connect().await?;
            let result = Self::insert_on(&mut conn, statement, session).await;
            if let Err(e) = conn.disconnect().await {
                debug!(error = %e, "Disconnect after insert failed");
            }
            result
        })
        .await
    }
}

#[async_trait]
impl SchemaTarget for MysqlWriter {
    async fn create_database(&self, defaults: &DatabaseDefaults, drop_first: bool) -> Result<()> {
        timed("schema", self.timeouts.schema, async {
            let mut conn = self.connect_server().await?;
            if drop_first {
                warn!(database = %self.database, "Dropping destination database");
                conn.query_drop(format!("DROP DATABASE IF EXISTS {}", quote_ident(&self.database)))
                    .await?;
            }
            conn.query_drop(create_database_sql(&self.database, defaults))
                .await?;
            conn.disconnect().await?;
            Ok(())
        })
        .await
    }

    async fn replace_object(&self, object: &SchemaObject, script: &str) -> Result<()> {
        timed("schema", self.timeouts.schema, async {
            let mut conn = self.connect().await?;
            Self::disable_checks(&mut conn).await?;
            conn.query_drop(drop_object_sql(object)).await?;
            conn.query_drop(script).await?;
            conn.disconnect().await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ObjectKind;

    #[test]
    fn test_create_database_sql() {
        let defaults = DatabaseDefaults {
            character_set: "utf8mb4".into(),
            collation: "utf8mb4_0900_ai_ci".into(),
        };
        assert_eq!(
            create_database_sql("shop", &defaults),
            "CREATE DATABASE IF NOT EXISTS `shop` CHARACTER SET 'utf8mb4' COLLATE 'utf8mb4_0900_ai_ci'"
        );
    }

    #[test]
    fn test_drop_object_sql() {
        let object = SchemaObject::new(ObjectKind::Procedure, "refresh`totals");
        assert_eq!(drop_object_sql(&object), "DROP PROCEDURE IF EXISTS `refresh``totals`");
    }

    #[test]
    fn test_session_sql_mode_is_quoted() {
        assert_eq!(
            session_sql_mode("NO_ENGINE_SUBSTITUTION"),
            "SET SESSION sql_mode = 'NO_ENGINE_SUBSTITUTION'"
        );
        assert_eq!(session_sql_mode("a'b"), "SET SESSION sql_mode = 'a''b'");
    }

    #[test]
    fn test_writer_requires_database() {
        assert!(MysqlWriter::new("mysql://root@localhost", CommandTimeouts::default()).is_err());
    }
}
