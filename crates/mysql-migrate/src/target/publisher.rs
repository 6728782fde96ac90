//! Partitioned multi-row inserts into the destination.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::core::{InsertCommand, InsertSession, Row, Statement, TargetWriter};
use crate::dialect::{insert_param, insert_sql};
use crate::error::{MigrateError, Result};
use crate::resilience::ResiliencePolicy;

/// Upper bound on placeholders in a single insert statement.
pub const MAX_PARAMETERS: usize = 10_000;

/// Rows per insert so that `columns * rows <= MAX_PARAMETERS`.
pub fn partition_size(columns: usize) -> usize {
    (MAX_PARAMETERS / columns.max(1)).max(1)
}

/// Split `rows` into insert-sized partitions, keeping row order.
pub fn partitions(rows: &[Row], columns: usize) -> impl Iterator<Item = &[Row]> {
    rows.chunks(partition_size(columns))
}

/// Build the insert statement for one partition.
pub fn insert_statement(table: &str, columns: &[&str], rows: &[Row], insert_ignore: bool) -> Statement {
    let mut statement = Statement::new(insert_sql(table, columns, rows.len(), insert_ignore));
    let values = rows.iter().flat_map(|row| row.iter().cloned());
    for (idx, value) in values.enumerate() {
        statement = statement.bind(insert_param(idx + 1), value);
    }
    statement
}

/// Writes batches to the destination under the destination resilience policy.
pub struct Publisher {
    writer: Arc<dyn TargetWriter>,
    policy: Arc<ResiliencePolicy>,
    session: InsertSession,
    insert_ignore: bool,
    debug_delay: Duration,
}

impl Publisher {
    pub fn new(
        writer: Arc<dyn TargetWriter>,
        policy: Arc<ResiliencePolicy>,
        session: InsertSession,
        insert_ignore: bool,
        debug_delay: Duration,
    ) -> Self {
        Self {
            writer,
            policy,
            session,
            insert_ignore,
            debug_delay,
        }
    }

    /// Insert every row of `command`, one transaction per partition.
    ///
    /// Returns the number of rows sent. Each partition is retried on its
    /// own; a failure stops the remaining partitions of the batch.
    pub async fn publish(&self, cancel: &CancellationToken, command: &InsertCommand) -> Result<u64> {
        let columns = command.batch.column_names();
        let mut sent = 0u64;

        for partition in partitions(&command.batch.rows, columns.len()) {
            let statement =
                insert_statement(&command.table_name, &columns, partition, self.insert_ignore);

            if !self.debug_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(MigrateError::Cancelled),
                    _ = tokio::time::sleep(self.debug_delay) => {}
                }
            }

            let writer = &self.writer;
            let statement = &statement;
            let session = &self.session;
            let result = self
                .policy
                .execute(cancel, move || writer.execute_insert(statement, session))
                .await;

            match result {
                Ok(affected) => {
                    debug!(
                        table = %command.table_name,
                        rows = partition.len(),
                        affected,
                        "Inserted partition"
                    );
                    sent += partition.len() as u64;
                }
                Err(MigrateError::Cancelled) => return Err(MigrateError::Cancelled),
                Err(e) => {
                    error!(
                        event = "insert_failed",
                        table = %command.table_name,
                        rows = partition.len(),
                        error = %e,
                        "Insert into {} failed",
                        command.table_name
                    );
                    return Err(e);
                }
            }
        }

        Ok(sent)
    }
}
