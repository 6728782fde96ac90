//! Row values, batches and parameterized statements.

use std::sync::Arc;

use super::schema::Column;

/// A single SQL value as carried between source and destination.
///
/// Values cross the pipeline in the driver's wire representation, so no
/// type conversion happens between read and insert.
pub type SqlValue = mysql_async::Value;

/// One result row, positionally aligned to the batch columns.
pub type Row = Vec<SqlValue>;

/// Rows read by one command, together with the projection that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub columns: Arc<[Column]>,
    pub rows: Vec<Row>,
}

impl Batch {
    pub fn new(columns: Arc<[Column]>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// SQL text with `@name` placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<(String, SqlValue)>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: SqlValue) -> Self {
        self.params.push((name.into(), value));
        self
    }

    /// Look up a bound value by placeholder name.
    pub fn param(&self, name: &str) -> Option<&SqlValue> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}
