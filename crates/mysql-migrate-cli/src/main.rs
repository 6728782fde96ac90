//! mysql-migrate CLI - concurrent MySQL to MySQL data migration.

use clap::{Args, Parser, Subcommand};
use mysql_migrate::{Config, ConfigOverrides, MigrateError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-migrate")]
#[command(about = "Concurrent MySQL to MySQL data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    log_format: String,

    /// Log verbosity: trace, debug, info, warn, error (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the schema and data from source to destination
    Run {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the effective configuration as JSON, with passwords redacted
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Settings that take precedence over the file and the environment.
#[derive(Args)]
struct Overrides {
    /// Parallel batch readers
    #[arg(long)]
    read_concurrency: Option<u64>,

    /// Parallel publishers
    #[arg(long)]
    insert_concurrency: Option<u64>,

    /// Rows per key range
    #[arg(long)]
    batch_size: Option<u64>,

    /// Row cap per table
    #[arg(long)]
    limit: Option<u64>,

    /// Table name pattern that is always copied (repeatable)
    #[arg(long = "include")]
    include: Vec<String>,

    /// Table name pattern that is skipped unless included (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Use INSERT IGNORE on the destination
    #[arg(long)]
    insert_ignore: bool,

    /// Session sql_mode for destination inserts
    #[arg(long)]
    sql_mode: Option<String>,

    /// Whole-job timeout in minutes
    #[arg(long)]
    job_timeout_minutes: Option<u64>,

    /// Retries after the first attempt, for both source and destination
    #[arg(long)]
    retry_attempts: Option<u64>,

    /// Base retry delay in milliseconds, for both source and destination
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Delay before every insert, for testing cancellation
    #[arg(long)]
    debug_delay_seconds: Option<u64>,

    /// Do not create the destination database and schema objects
    #[arg(long)]
    skip_schema: bool,

    /// Drop the destination database before creating it
    #[arg(long)]
    drop_database: bool,
}

impl Overrides {
    fn into_config_overrides(self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new()
            .set_opt("migration.read_concurrency", self.read_concurrency)
            .set_opt("migration.insert_concurrency", self.insert_concurrency)
            .set_opt("migration.read_batch_size", self.batch_size)
            .set_opt("migration.limit", self.limit)
            .set_opt("migration.sql_mode", self.sql_mode)
            .set_opt("migration.job_timeout_minutes", self.job_timeout_minutes)
            .set_opt("migration.debug_delay_seconds", self.debug_delay_seconds);

        if !self.include.is_empty() {
            overrides = overrides.set("migration.include_tables", self.include);
        }
        if !self.exclude.is_empty() {
            overrides = overrides.set("migration.exclude_tables", self.exclude);
        }
        if self.insert_ignore {
            overrides = overrides.set("migration.insert_ignore", true);
        }
        if self.skip_schema {
            overrides = overrides.set("schema.create_schema", false);
        }
        if self.drop_database {
            overrides = overrides.set("schema.drop_database", true);
        }
        for realm in ["source", "destination"] {
            overrides = overrides
                .set_opt(&format!("resilience.{}.retry_attempts", realm), self.retry_attempts)
                .set_opt(&format!("resilience.{}.initial_delay_ms", realm), self.retry_delay_ms);
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { overrides } => {
            let config = Config::load(cli.config.as_deref(), &overrides.into_config_overrides())?;
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
        Commands::Run { overrides } => {
            setup_logging(&cli.verbosity, &cli.log_format)?;

            let config = Config::load(cli.config.as_deref(), &overrides.into_config_overrides())?;
            match &cli.config {
                Some(path) => info!("Loaded configuration from {:?}", path),
                None => info!("Loaded configuration from environment"),
            }

            let cancel_token = setup_signal_handler();
            let orchestrator = Orchestrator::new(config)?;
            let report = orchestrator.run(&cancel_token).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), MigrateError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(verbosity.to_lowercase())
            .map_err(|e| MigrateError::Config(format!("invalid verbosity '{}': {}", verbosity, e)))?,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Cancel the returned token on SIGINT (Ctrl-C) or SIGTERM (container shutdown).
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Shutting down...", name);
                    token.cancel();
                }
                Err(e) => eprintln!("Failed to install {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

/// Cancel the returned token on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Shutting down...");
            token.cancel();
        }
    });

    cancel_token
}
