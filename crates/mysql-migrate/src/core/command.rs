//! Units of work passed between pipeline stages.

use std::sync::Arc;

use super::schema::TableSchema;
use super::value::{Batch, SqlValue};

/// Read one key range `[from_key, to_key)` of a table.
///
/// Both bounds absent means the whole table; that only happens for tables
/// without a primary key. An absent `to_key` alone means the range is open
/// ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadCommand {
    pub table: Arc<TableSchema>,
    pub from_key: Option<Vec<SqlValue>>,
    pub to_key: Option<Vec<SqlValue>>,
}

impl ReadCommand {
    pub fn whole_table(table: Arc<TableSchema>) -> Self {
        Self {
            table,
            from_key: None,
            to_key: None,
        }
    }

    pub fn range(table: Arc<TableSchema>, from_key: Vec<SqlValue>, to_key: Option<Vec<SqlValue>>) -> Self {
        Self {
            table,
            from_key: Some(from_key),
            to_key,
        }
    }

    pub fn table_name(&self) -> &str {
        self.table.name()
    }
}

/// Insert one batch into a destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertCommand {
    pub table_name: String,
    pub batch: Batch,
}
