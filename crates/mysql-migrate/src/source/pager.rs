//! Key-range pagination over a table's primary key.
//!
//! Each step runs one probe that returns the first key at or after the
//! previous upper bound and the key `batch_size` rows further on. The pair
//! becomes the half-open range `[first, next)` and `next` seeds the following
//! step, so ranges are disjoint and cover the key order without offsets
//! growing with the table.

use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::{ReadCommand, SourceReader, SqlValue, Statement, TableSchema};
use crate::dialect::{probe_sql, ProbeParams};
use crate::error::{MigrateError, Result};
use crate::resilience::ResiliencePolicy;

/// Sizes of successive pager steps for a row cap `limit` and step size `batch_size`.
///
/// With a cap the sizes sum exactly to the cap and only the last may be
/// smaller than `batch_size`. Without a cap the sequence is endless. A zero
/// step size yields nothing.
pub fn batch_sizes(limit: Option<u64>, batch_size: u64) -> impl Iterator<Item = u64> + Send {
    let mut remaining = limit;
    std::iter::from_fn(move || {
        if batch_size == 0 {
            return None;
        }
        match remaining.as_mut() {
            None => Some(batch_size),
            Some(0) => None,
            Some(left) => {
                let next = (*left).min(batch_size);
                *left -= next;
                Some(next)
            }
        }
    })
}

/// Outcome of one probe step.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// No rows at or after the lower bound.
    Exhausted,
    /// Fewer than `batch_size` rows remain; the range is open ended.
    Last(Vec<SqlValue>),
    /// A full range `[from, to)`.
    Range(Vec<SqlValue>, Vec<SqlValue>),
}

/// Computes key ranges of tables with a primary key.
pub struct KeyRangePager {
    source: Arc<dyn SourceReader>,
    policy: Arc<ResiliencePolicy>,
    /// Probe text per (table, has lower bound).
    sql_cache: DashMap<(String, bool), Arc<str>>,
}

impl KeyRangePager {
    pub fn new(source: Arc<dyn SourceReader>, policy: Arc<ResiliencePolicy>) -> Self {
        Self {
            source,
            policy,
            sql_cache: DashMap::new(),
        }
    }

    fn probe_sql(&self, table: &TableSchema, has_from: bool) -> Result<Arc<str>> {
        let key = (table.name().to_string(), has_from);
        if let Some(sql) = self.sql_cache.get(&key) {
            return Ok(sql.clone());
        }
        let sql: Arc<str> = probe_sql(table.name(), &table.primary_key_names(), has_from)?.into();
        Ok(self.sql_cache.entry(key).or_insert(sql).clone())
    }

    /// Number of cached probe statements.
    pub fn cached_statements(&self) -> usize {
        self.sql_cache.len()
    }

    /// Locate the next key range starting at `from` (or at the first row).
    pub async fn probe(
        &self,
        cancel: &CancellationToken,
        table: &TableSchema,
        batch_size: u64,
        from: Option<&[SqlValue]>,
    ) -> Result<Probe> {
        let width = table.key_width();
        let sql = self.probe_sql(table, from.is_some())?;
        let mut statement = Statement::new(&*sql);
        if let Some(from) = from {
            if from.len() != width {
                return Err(MigrateError::integrity(format!(
                    "table {}: lower bound has {} values for a {}-column key",
                    table.name(),
                    from.len(),
                    width
                )));
            }
            for (idx, value) in from.iter().enumerate() {
                statement = statement.bind(ProbeParams::key(idx), value.clone());
            }
        }
        let statement = statement.bind(ProbeParams::BATCH_SIZE, SqlValue::UInt(batch_size));

        let source = &self.source;
        let statement = &statement;
        let rows = self
            .policy
            .execute(cancel, move || source.query(statement))
            .await?;

        let mut keyed = Vec::with_capacity(rows.len());
        for mut row in rows {
            if row.len() != width + 1 {
                return Err(MigrateError::integrity(format!(
                    "table {}: probe returned {} columns, expected {}",
                    table.name(),
                    row.len(),
                    width + 1
                )));
            }
            let ordinal = row.pop().as_ref().and_then(ordinal_of).ok_or_else(|| {
                MigrateError::integrity(format!("table {}: probe row has no ordinal", table.name()))
            })?;
            keyed.push((ordinal, row));
        }
        keyed.sort_by_key(|(ordinal, _)| *ordinal);

        let ordinals: Vec<i64> = keyed.iter().map(|(o, _)| *o).collect();
        let mut keys = keyed.into_iter().map(|(_, key)| key);
        match (ordinals.as_slice(), keys.next(), keys.next()) {
            ([], _, _) => Ok(Probe::Exhausted),
            ([1], Some(start), None) => Ok(Probe::Last(start)),
            ([1, 2], Some(start), Some(end)) => Ok(Probe::Range(start, end)),
            _ => Err(MigrateError::integrity(format!(
                "table {}: key range probe returned ordinals {:?}, expected at most [1, 2]",
                table.name(),
                ordinals
            ))),
        }
    }

    /// Read commands covering `table`, in ascending key order.
    ///
    /// Tables without a primary key yield a single whole-table command.
    pub fn commands<'a>(
        &'a self,
        table: Arc<TableSchema>,
        limit: Option<u64>,
        batch_size: u64,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<ReadCommand>> {
        if !table.has_primary_key() {
            return stream::once(async move { Ok(ReadCommand::whole_table(table)) }).boxed();
        }

        let initial = PageState {
            sizes: batch_sizes(limit, batch_size),
            from: None,
            finished: false,
        };

        stream::try_unfold(initial, move |mut state| {
            let table = table.clone();
            async move {
                if state.finished {
                    return Ok(None);
                }
                if cancel.is_cancelled() {
                    return Err(MigrateError::Cancelled);
                }
                let Some(size) = state.sizes.next() else {
                    return Ok(None);
                };

                let probe = self
                    .probe(cancel, &table, size, state.from.as_deref())
                    .await?;
                debug!(table = table.name(), size, ?probe, "Key range probed");

                match probe {
                    Probe::Exhausted => Ok(None),
                    Probe::Last(start) => {
                        state.finished = true;
                        state.from = None;
                        Ok(Some((ReadCommand::range(table, start, None), state)))
                    }
                    Probe::Range(start, end) => {
                        state.from = Some(end.clone());
                        Ok(Some((ReadCommand::range(table, start, Some(end)), state)))
                    }
                }
            }
        })
        .boxed()
    }
}

struct PageState<I> {
    sizes: I,
    from: Option<Vec<SqlValue>>,
    finished: bool,
}

fn ordinal_of(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Int(v) => Some(*v),
        SqlValue::UInt(v) => i64::try_from(*v).ok(),
        SqlValue::Bytes(b) => std::str::from_utf8(b).ok()?.parse().ok(),
        _ => None,
    }
}
