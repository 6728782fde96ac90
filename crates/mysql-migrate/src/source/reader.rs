//! Materializes one key range into a batch.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{Batch, Column, ReadCommand, SourceReader, SqlValue, Statement};
use crate::dialect::{range_select_sql, RangeParams};
use crate::error::{MigrateError, Result};
use crate::filter::ColumnSkipRules;
use crate::resilience::ResiliencePolicy;

/// Build the select statement for `command` over the `projection` columns.
pub fn build_query(command: &ReadCommand, projection: &[Column]) -> Result<Statement> {
    let table = &command.table;
    let key = table.primary_key_names();

    if key.is_empty() && (command.from_key.is_some() || command.to_key.is_some()) {
        return Err(MigrateError::integrity(format!(
            "table {} has no primary key but the read command is ranged",
            table.name()
        )));
    }
    if !key.is_empty() && command.from_key.is_none() {
        return Err(MigrateError::integrity(format!(
            "read command for {} is missing its lower bound",
            table.name()
        )));
    }

    let columns: Vec<&str> = projection.iter().map(|c| c.name.as_str()).collect();
    let sql = range_select_sql(
        table.name(),
        &columns,
        &key,
        command.from_key.is_some(),
        command.to_key.is_some(),
    )?;

    let mut statement = Statement::new(sql);
    let bounds = [
        (command.from_key.as_deref(), RangeParams::from as fn(usize) -> String),
        (command.to_key.as_deref(), RangeParams::to as fn(usize) -> String),
    ];
    for (values, param) in bounds {
        let Some(values) = values else { continue };
        statement = bind_key(statement, table.name(), key.len(), values, param)?;
    }
    Ok(statement)
}

fn bind_key(
    mut statement: Statement,
    table: &str,
    width: usize,
    values: &[SqlValue],
    param: fn(usize) -> String,
) -> Result<Statement> {
    if values.len() != width {
        return Err(MigrateError::integrity(format!(
            "table {}: key bound has {} values for a {}-column key",
            table,
            values.len(),
            width
        )));
    }
    for (idx, value) in values.iter().enumerate() {
        statement = statement.bind(param(idx), value.clone());
    }
    Ok(statement)
}

/// Reads key ranges from the source under the source resilience policy.
pub struct BatchReader {
    source: Arc<dyn SourceReader>,
    policy: Arc<ResiliencePolicy>,
    skip_columns: Arc<ColumnSkipRules>,
}

impl BatchReader {
    pub fn new(
        source: Arc<dyn SourceReader>,
        policy: Arc<ResiliencePolicy>,
        skip_columns: Arc<ColumnSkipRules>,
    ) -> Self {
        Self {
            source,
            policy,
            skip_columns,
        }
    }

    /// Run `command` and return every row of its range, in return order.
    pub async fn read(&self, cancel: &CancellationToken, command: &ReadCommand) -> Result<Batch> {
        let projection = self.skip_columns.projection(&command.table);
        let statement = build_query(command, &projection)?;

        let source = &self.source;
        let statement = &statement;
        let rows = self
            .policy
            .execute(cancel, move || source.query(statement))
            .await?;

        if let Some(row) = rows.iter().find(|r| r.len() != projection.len()) {
            return Err(MigrateError::integrity(format!(
                "table {}: row has {} values for {} columns",
                command.table_name(),
                row.len(),
                projection.len()
            )));
        }

        Ok(Batch::new(projection, rows))
    }
}
