//! Worker loops for the three pipeline stages.
//!
//! Each worker returns its own counters when it exits. A worker that fails
//! logs the failure, cancels the pipeline token and returns the error; a
//! worker that observes cancellation or a closed queue exits cleanly.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::{Queue, Recv, Sent};
use crate::core::{InsertCommand, ReadCommand};
use crate::error::{MigrateError, Result};
use crate::source::{BatchReader, CommandGenerator};
use crate::target::Publisher;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateStats {
    pub tables: u64,
    pub commands: u64,
}

/// Counters of a read or publish worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub batches: u64,
    pub rows: u64,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.batches += other.batches;
        self.rows += other.rows;
    }
}

/// Record a worker fault and signal every sibling to stop.
fn fault(
    stage: &str,
    event: &'static str,
    pipeline: &CancellationToken,
    e: MigrateError,
) -> MigrateError {
    error!(
        event,
        stage,
        error = %e,
        "Stage {} failed: {}",
        stage,
        e
    );
    if !pipeline.is_cancelled() {
        warn!(event = "pipeline_cancelled", requester = stage, "Pipeline cancelled by {}", stage);
        pipeline.cancel();
    }
    MigrateError::stage(stage, e.to_string())
}

pub(super) async fn generate(
    generator: Arc<CommandGenerator>,
    read_queue: Queue<ReadCommand>,
    pipeline: CancellationToken,
) -> Result<GenerateStats> {
    info!(event = "pipeline_generate_started", "Command generation started");
    let result = generate_into(&generator, &read_queue, &pipeline).await;
    read_queue.close();

    match result {
        Ok(stats) => {
            info!(
                event = "pipeline_generate_completed",
                tables = stats.tables,
                commands = stats.commands,
                "Command generation completed"
            );
            Ok(stats)
        }
        Err(MigrateError::Cancelled) => {
            debug!("Command generation stopped by cancellation");
            Ok(GenerateStats::default())
        }
        Err(e) => Err(fault("generate", "pipeline_generate_failed", &pipeline, e)),
    }
}

async fn generate_into(
    generator: &CommandGenerator,
    read_queue: &Queue<ReadCommand>,
    pipeline: &CancellationToken,
) -> Result<GenerateStats> {
    let tables = generator.discover(pipeline).await?;
    let mut stats = GenerateStats {
        tables: tables.len() as u64,
        commands: 0,
    };

    let mut commands = generator.commands(tables, pipeline);
    while let Some(command) = commands.next().await {
        match read_queue.send(command?, pipeline).await {
            Sent::Delivered => stats.commands += 1,
            Sent::Closed => break,
            Sent::Cancelled => return Err(MigrateError::Cancelled),
        }
    }
    Ok(stats)
}

pub(super) async fn read(
    id: usize,
    reader: Arc<BatchReader>,
    read_queue: Queue<ReadCommand>,
    insert_queue: Queue<InsertCommand>,
    pipeline: CancellationToken,
) -> Result<WorkerStats> {
    let stage = format!("read-{}", id);
    info!(event = "pipeline_read_started", stage = %stage, "Reader {} started", id);

    let mut stats = WorkerStats::default();
    loop {
        let command = match read_queue.recv(&pipeline).await {
            Recv::Item(command) => command,
            Recv::Closed | Recv::Cancelled => break,
        };

        let batch = match reader.read(&pipeline, &command).await {
            Ok(batch) => batch,
            Err(MigrateError::Cancelled) => break,
            Err(e) => {
                read_queue.close();
                return Err(fault(&stage, "pipeline_read_failed", &pipeline, e));
            }
        };

        let rows = batch.len() as u64;
        debug!(stage = %stage, table = command.table_name(), rows, "Batch read");
        if batch.is_empty() {
            continue;
        }

        let insert = InsertCommand {
            table_name: command.table_name().to_string(),
            batch,
        };
        match insert_queue.send(insert, &pipeline).await {
            Sent::Delivered => {
                stats += WorkerStats { batches: 1, rows };
            }
            Sent::Closed | Sent::Cancelled => break,
        }
    }

    info!(
        event = "pipeline_read_completed",
        stage = %stage,
        batches = stats.batches,
        rows = stats.rows,
        "Reader {} completed",
        id
    );
    Ok(stats)
}

pub(super) async fn publish(
    id: usize,
    publisher: Arc<Publisher>,
    insert_queue: Queue<InsertCommand>,
    pipeline: CancellationToken,
    root: CancellationToken,
) -> Result<WorkerStats> {
    let stage = format!("insert-{}", id);
    info!(event = "pipeline_insert_started", stage = %stage, "Publisher {} started", id);

    let mut stats = WorkerStats::default();
    loop {
        let command = match insert_queue.recv(&root).await {
            Recv::Item(command) => command,
            Recv::Closed | Recv::Cancelled => break,
        };

        match publisher.publish(&root, &command).await {
            Ok(rows) => stats += WorkerStats { batches: 1, rows },
            Err(MigrateError::Cancelled) => break,
            Err(e) => return Err(fault(&stage, "pipeline_insert_failed", &pipeline, e)),
        }
    }

    info!(
        event = "pipeline_insert_completed",
        stage = %stage,
        batches = stats.batches,
        rows = stats.rows,
        "Publisher {} completed",
        id
    );
    Ok(stats)
}
