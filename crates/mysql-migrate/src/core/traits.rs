//! Core traits for the database capabilities the pipeline depends on.
//!
//! - [`SourceReader`]: catalog discovery and row queries against the source
//! - [`TargetWriter`]: transactional inserts against the destination
//! - [`SchemaSource`] / [`SchemaTarget`]: DDL extraction and replay
//!
//! Every method performs exactly one database operation on a fresh
//! connection, so callers may retry a failed call as a whole. Retrying is
//! the caller's job; implementations only map failures into
//! [`MigrateError`](crate::error::MigrateError) kinds and enforce their
//! command timeout.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{DatabaseDefaults, SchemaObject, TableSchema};
use super::value::{Row, Statement};

/// Session settings applied before a destination insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertSession {
    /// Value for `SET SESSION sql_mode`, if overridden.
    pub sql_mode: Option<String>,
}

/// Read metadata and rows from the source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Base tables of the source database with their insertable columns.
    async fn tables(&self) -> Result<Vec<TableSchema>>;

    /// Run a query and materialize every returned row, in return order.
    async fn query(&self, statement: &Statement) -> Result<Vec<Row>>;
}

/// Write rows to the destination database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Execute `statement` inside one read-committed transaction with unique
    /// and foreign key checks disabled. Returns the affected row count.
    async fn execute_insert(&self, statement: &Statement, session: &InsertSession) -> Result<u64>;
}

/// Extract DDL from the source database.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Default character set and collation of the source database.
    async fn database_defaults(&self) -> Result<DatabaseDefaults>;

    /// Tables, views, functions, procedures and triggers, in that order.
    async fn objects(&self) -> Result<Vec<SchemaObject>>;

    /// The `SHOW CREATE` script for one object.
    async fn create_script(&self, object: &SchemaObject) -> Result<String>;
}

/// Replay DDL on the destination database.
#[async_trait]
pub trait SchemaTarget: Send + Sync {
    /// Create the destination database, optionally dropping it first.
    async fn create_database(&self, defaults: &DatabaseDefaults, drop_first: bool) -> Result<()>;

    /// Drop `object` if it exists, then run `script`.
    async fn replace_object(&self, object: &SchemaObject, script: &str) -> Result<()>;
}
