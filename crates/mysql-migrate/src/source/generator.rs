//! Walks the eligible tables and yields their read commands.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::pager::KeyRangePager;
use crate::core::{ReadCommand, SourceReader, TableSchema};
use crate::error::Result;
use crate::filter::{RowLimits, TableFilter};
use crate::resilience::ResiliencePolicy;

pub struct CommandGenerator {
    source: Arc<dyn SourceReader>,
    policy: Arc<ResiliencePolicy>,
    pager: KeyRangePager,
    tables: TableFilter,
    limits: RowLimits,
    batch_size: u64,
}

impl CommandGenerator {
    pub fn new(
        source: Arc<dyn SourceReader>,
        policy: Arc<ResiliencePolicy>,
        tables: TableFilter,
        limits: RowLimits,
        batch_size: u64,
    ) -> Self {
        Self {
            pager: KeyRangePager::new(source.clone(), policy.clone()),
            source,
            policy,
            tables,
            limits,
            batch_size,
        }
    }

    pub fn pager(&self) -> &KeyRangePager {
        &self.pager
    }

    /// Source tables that pass the include/exclude rules, in catalog order.
    pub async fn discover(&self, cancel: &CancellationToken) -> Result<Vec<Arc<TableSchema>>> {
        info!(event = "read_schema_started", "Reading source schema");

        let source = &self.source;
        let all = self.policy.execute(cancel, move || source.tables()).await?;
        let total = all.len();

        let selected: Vec<Arc<TableSchema>> = all
            .into_iter()
            .filter(|t| self.tables.matches(t.name()))
            .map(Arc::new)
            .collect();

        info!(
            event = "read_schema_completed",
            tables = selected.len(),
            skipped = total - selected.len(),
            "Read source schema: {} of {} tables selected",
            selected.len(),
            total
        );
        Ok(selected)
    }

    /// Read commands for every table, table by table in key order.
    ///
    /// A failed probe ends its table's commands; callers stop at the first error.
    pub fn commands<'a>(
        &'a self,
        tables: Vec<Arc<TableSchema>>,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<ReadCommand>> {
        stream::iter(tables)
            .map(move |table| {
                let limit = self.limits.limit_for(table.name());
                self.pager.commands(table, limit, self.batch_size, cancel)
            })
            .flatten()
            .boxed()
    }
}
