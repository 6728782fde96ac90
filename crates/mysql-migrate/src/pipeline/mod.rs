//! Concurrent extraction/load pipeline.
//!
//! One generator, N readers and M publishers connected by two bounded
//! queues:
//!
//! ```text
//! generate --[read queue]--> read x N --[insert queue]--> publish x M
//! ```
//!
//! # Shutdown
//!
//! The generator closes the read queue when it runs out of commands. Once
//! the generator and every reader have exited the insert queue is closed,
//! and publishers exit after draining it.
//!
//! A failing generator or reader cancels the pipeline token and closes the
//! read queue. Its siblings stop, but publishers only watch the job token,
//! so batches that were already read are still inserted. The run reports
//! failure regardless.
//!
//! Dropping the future returned by [`Pipeline::run`] cancels the job token,
//! so no worker outlives it.

mod queue;
mod stages;

pub use queue::{Queue, Recv, Sent};
pub use stages::{GenerateStats, WorkerStats};

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::source::{BatchReader, CommandGenerator};
use crate::target::Publisher;

/// Queue capacity per worker of the consuming stage.
pub const QUEUE_CAPACITY_MULTIPLIER: usize = 5;

/// Worker counts of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub read_concurrency: usize,
    pub insert_concurrency: usize,
}

impl PipelineConfig {
    pub fn from_migration(config: &MigrationConfig) -> Self {
        Self {
            read_concurrency: config.read_concurrency.max(1),
            insert_concurrency: config.insert_concurrency.max(1),
        }
    }
}

/// Pipeline lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Running,
    DrainingRead,
    DrainingPublish,
    Succeeded,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Running => "running",
            PipelineState::DrainingRead => "draining-read",
            PipelineState::DrainingPublish => "draining-publish",
            PipelineState::Succeeded => "succeeded",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn transition(state: PipelineState) {
    info!(event = "pipeline_state", state = %state, "Pipeline {}", state);
}

/// Totals collected from every worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub tables: u64,
    pub commands: u64,
    pub batches_read: u64,
    pub rows_read: u64,
    pub batches_published: u64,
    pub rows_published: u64,
}

/// The stage implementations a pipeline run wires together.
pub struct Pipeline {
    generator: Arc<CommandGenerator>,
    reader: Arc<BatchReader>,
    publisher: Arc<Publisher>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        generator: Arc<CommandGenerator>,
        reader: Arc<BatchReader>,
        publisher: Arc<Publisher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            generator,
            reader,
            publisher,
            config,
        }
    }

    /// Run every stage to completion.
    ///
    /// `root` is the job-wide token (timeout, signals). Returns
    /// [`MigrateError::Pipeline`] naming the failed stages if any worker
    /// failed, or [`MigrateError::Cancelled`] if `root` fired.
    pub async fn run(&self, root: &CancellationToken) -> Result<PipelineStats> {
        let job = root.child_token();
        let _abandon = job.clone().drop_guard();
        let pipeline = job.child_token();
        let read_queue = Queue::bounded(self.config.read_concurrency * QUEUE_CAPACITY_MULTIPLIER);
        let insert_queue =
            Queue::bounded(self.config.insert_concurrency * QUEUE_CAPACITY_MULTIPLIER);

        transition(PipelineState::Running);

        let generate_handle = tokio::spawn(stages::generate(
            self.generator.clone(),
            read_queue.clone(),
            pipeline.clone(),
        ));

        let read_handles: Vec<_> = (0..self.config.read_concurrency)
            .map(|id| {
                tokio::spawn(stages::read(
                    id,
                    self.reader.clone(),
                    read_queue.clone(),
                    insert_queue.clone(),
                    pipeline.clone(),
                ))
            })
            .collect();

        let publish_handles: Vec<_> = (0..self.config.insert_concurrency)
            .map(|id| {
                tokio::spawn(stages::publish(
                    id,
                    self.publisher.clone(),
                    insert_queue.clone(),
                    pipeline.clone(),
                    job.clone(),
                ))
            })
            .collect();

        let upstream = async {
            let generated = join_stage("generate".to_string(), generate_handle).await;
            transition(PipelineState::DrainingRead);
            let reads = join_workers("read", read_handles).await;
            insert_queue.close();
            transition(PipelineState::DrainingPublish);
            (generated, reads)
        };
        let ((generated, reads), publishes) =
            tokio::join!(upstream, join_workers("insert", publish_handles));

        let mut failures = Vec::new();
        let mut stats = PipelineStats::default();

        match generated {
            Ok(g) => {
                stats.tables = g.tables;
                stats.commands = g.commands;
            }
            Err(failure) => failures.push(failure),
        }
        for result in reads {
            match result {
                Ok(w) => {
                    stats.batches_read += w.batches;
                    stats.rows_read += w.rows;
                }
                Err(failure) => failures.push(failure),
            }
        }
        for result in publishes {
            match result {
                Ok(w) => {
                    stats.batches_published += w.batches;
                    stats.rows_published += w.rows;
                }
                Err(failure) => failures.push(failure),
            }
        }

        let failed_stages: Vec<String> = failures.iter().map(|(stage, _)| stage.clone()).collect();
        if let Some((_, first_error)) = failures.into_iter().next() {
            transition(PipelineState::Failed);
            error!(
                event = "pipeline_failed",
                failed_stages = ?failed_stages,
                rows_published = stats.rows_published,
                "Pipeline has errors in stages: {}",
                failed_stages.join(", ")
            );
            return Err(MigrateError::Pipeline {
                failed_stages,
                first_error: Box::new(first_error),
            });
        }
        if root.is_cancelled() {
            transition(PipelineState::Failed);
            error!(
                event = "pipeline_failed",
                rows_published = stats.rows_published,
                "Pipeline cancelled before completion"
            );
            return Err(MigrateError::Cancelled);
        }

        transition(PipelineState::Succeeded);
        info!(
            event = "pipeline_finished",
            tables = stats.tables,
            commands = stats.commands,
            rows_read = stats.rows_read,
            rows_published = stats.rows_published,
            "Pipeline finished"
        );
        Ok(stats)
    }
}

/// A failed worker: its stage name and the error it returned.
type StageFailure = (String, MigrateError);

/// Await one worker; a failed or panicked worker yields its stage name and error.
async fn join_stage<T>(stage: String, handle: JoinHandle<Result<T>>) -> std::result::Result<T, StageFailure> {
    match handle.await {
        Ok(Ok(stats)) => Ok(stats),
        Ok(Err(e)) => Err((stage, e)),
        Err(e) => {
            error!(stage = %stage, error = %e, "Worker task panicked");
            let message = format!("worker task panicked: {}", e);
            Err((stage.clone(), MigrateError::stage(stage, message)))
        }
    }
}

async fn join_workers<T>(
    kind: &str,
    handles: Vec<JoinHandle<Result<T>>>,
) -> Vec<std::result::Result<T, StageFailure>> {
    join_all(
        handles
            .into_iter()
            .enumerate()
            .map(|(id, handle)| join_stage(format!("{}-{}", kind, id), handle)),
    )
    .await
}
