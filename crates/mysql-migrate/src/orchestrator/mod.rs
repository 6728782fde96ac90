//! Job orchestrator - schema copy followed by the data pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::{InsertSession, SchemaSource, SchemaTarget, SourceReader, TargetWriter};
use crate::drivers::{MysqlReader, MysqlWriter};
use crate::error::{MigrateError, Result};
use crate::filter::Rules;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineStats};
use crate::resilience::Policies;
use crate::schema_copy::SchemaCopier;
use crate::source::{BatchReader, CommandGenerator};
use crate::target::Publisher;

/// The database capabilities a job runs against.
#[derive(Clone)]
pub struct Drivers {
    pub source: Arc<dyn SourceReader>,
    pub target: Arc<dyn TargetWriter>,
    pub schema_source: Arc<dyn SchemaSource>,
    pub schema_target: Arc<dyn SchemaTarget>,
}

impl Drivers {
    /// MySQL drivers for the configured source and destination.
    pub fn mysql(config: &Config) -> Result<Self> {
        let timeouts = config.migration.timeouts();
        let reader = Arc::new(MysqlReader::new(&config.source.url, timeouts)?);
        let writer = Arc::new(MysqlWriter::new(&config.destination.url, timeouts)?);
        Ok(Self {
            source: reader.clone(),
            target: writer.clone(),
            schema_source: reader,
            schema_target: writer,
        })
    }
}

/// Result of a successful job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    /// Tables selected for copy.
    pub tables: u64,

    /// Read commands generated across all tables.
    pub commands: u64,

    pub batches_read: u64,
    pub rows_read: u64,
    pub batches_published: u64,
    pub rows_published: u64,
}

impl JobReport {
    fn completed(run_id: String, started_at: DateTime<Utc>, stats: PipelineStats) -> Self {
        let completed_at = Utc::now();
        Self {
            run_id,
            status: "completed".to_string(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables: stats.tables,
            commands: stats.commands,
            batches_read: stats.batches_read,
            rows_read: stats.rows_read,
            batches_published: stats.batches_published,
            rows_published: stats.rows_published,
        }
    }
}

/// Runs one migration job.
pub struct Orchestrator {
    config: Config,
    drivers: Drivers,
    policies: Policies,
}

impl Orchestrator {
    /// Validate `config` and prepare the MySQL drivers. No connection is
    /// opened until the job runs.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let drivers = Drivers::mysql(&config)?;
        Ok(Self::with_drivers(config, drivers))
    }

    /// Use the given drivers instead of MySQL.
    pub fn with_drivers(config: Config, drivers: Drivers) -> Self {
        let policies = Policies::from_config(&config.resilience);
        Self {
            config,
            drivers,
            policies,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the job until it completes, fails, times out or `cancel` fires.
    ///
    /// The job timeout cancels a child of `cancel`, so the caller's token is
    /// never cancelled by the orchestrator. Dropping the returned future
    /// cancels the job as well.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<JobReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let started = Instant::now();
        let job_timeout = self.config.migration.job_timeout();

        info!(event = "job_started", run_id = %run_id, "Starting migration job {}", run_id);
        match serde_json::to_string(&self.config.redacted()) {
            Ok(settings) => info!(event = "settings", settings = %settings, "Effective settings"),
            Err(e) => warn!(error = %e, "Could not serialize settings"),
        }

        let root = cancel.child_token();
        // Stops the watchdog and every worker if this future is dropped.
        let _abandon = root.clone().drop_guard();
        let timed_out = Arc::new(AtomicBool::new(false));
        let watchdog = tokio::spawn({
            let root = root.clone();
            let timed_out = timed_out.clone();
            async move {
                tokio::select! {
                    _ = root.cancelled() => {}
                    _ = tokio::time::sleep(job_timeout) => {
                        warn!(
                            event = "job_timeout",
                            timeout_seconds = job_timeout.as_secs(),
                            "Job timeout reached, cancelling"
                        );
                        timed_out.store(true, Ordering::SeqCst);
                        root.cancel();
                    }
                }
            }
        });

        let result = self.execute(&root).await;
        watchdog.abort();

        let result = match result {
            Err(_) if timed_out.load(Ordering::SeqCst) => Err(MigrateError::JobTimeout(job_timeout)),
            other => other,
        };
        let elapsed_seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(stats) => {
                let report = JobReport::completed(run_id, started_at, stats);
                info!(
                    event = "job_completed",
                    run_id = %report.run_id,
                    elapsed_seconds,
                    tables = report.tables,
                    rows_published = report.rows_published,
                    "Job completed: {} tables, {} rows in {:.1}s",
                    report.tables,
                    report.rows_published,
                    elapsed_seconds
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    event = "job_failed",
                    run_id = %run_id,
                    elapsed_seconds,
                    error = %e,
                    "Job failed after {:.1}s: {}",
                    elapsed_seconds,
                    e
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, root: &CancellationToken) -> Result<PipelineStats> {
        let migration = &self.config.migration;

        if self.config.schema.create_schema {
            let copier = SchemaCopier::new(
                self.drivers.schema_source.clone(),
                self.drivers.schema_target.clone(),
                self.policies.source.clone(),
                self.policies.destination.clone(),
                self.config.schema.clone(),
                migration.read_concurrency,
            );
            copier.copy(root).await?;
        }

        let rules = Rules::from_config(migration)?;
        let generator = CommandGenerator::new(
            self.drivers.source.clone(),
            self.policies.source.clone(),
            rules.tables,
            rules.limits,
            migration.read_batch_size,
        );
        let reader = BatchReader::new(
            self.drivers.source.clone(),
            self.policies.source.clone(),
            Arc::new(rules.skip_columns),
        );
        let publisher = Publisher::new(
            self.drivers.target.clone(),
            self.policies.destination.clone(),
            InsertSession {
                sql_mode: migration.sql_mode.clone(),
            },
            migration.insert_ignore,
            migration.debug_delay(),
        );

        let pipeline = Pipeline::new(
            Arc::new(generator),
            Arc::new(reader),
            Arc::new(publisher),
            PipelineConfig::from_migration(migration),
        );
        pipeline.run(root).await
    }
}
