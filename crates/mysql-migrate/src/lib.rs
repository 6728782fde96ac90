//! # mysql-migrate
//!
//! Concurrent MySQL to MySQL data migration library.
//!
//! A job optionally copies the database schema, then streams every eligible
//! table through a three-stage pipeline:
//!
//! - **Key-range paging** splits each table into disjoint, ordered ranges of
//!   its primary key without offset scans or table locks
//! - **Concurrent readers** materialize one range per command
//! - **Concurrent publishers** insert each batch in parameter-bounded
//!   transactions
//!
//! Every database call runs under a per-realm retry and circuit breaker
//! policy, bounded by a command timeout.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_migrate::{Config, ConfigOverrides, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mysql_migrate::Result<()> {
//!     let config = Config::load(Some("config.yaml".as_ref()), &ConfigOverrides::new())?;
//!     let report = Orchestrator::new(config)?.run(&CancellationToken::new()).await?;
//!     println!("Migrated {} rows", report.rows_published);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod pipeline;
pub mod resilience;
pub mod schema_copy;
pub mod source;
pub mod target;

// Re-exports for convenient access
pub use crate::config::{Config, ConfigOverrides, MigrationConfig, ResilienceConfig, SchemaConfig};
pub use crate::core::{Batch, ReadCommand, SqlValue, Statement, TableSchema};
pub use crate::error::{MigrateError, Result};
pub use crate::orchestrator::{Drivers, JobReport, Orchestrator};
pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineStats};
pub use crate::resilience::{Policies, Realm, ResiliencePolicy};
