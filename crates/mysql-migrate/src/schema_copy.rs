//! Database and schema object copy, run before the data pipeline.
//!
//! The destination database is created first, then every source table,
//! view, function, procedure and trigger is recreated from its
//! `SHOW CREATE` script. Scripts are fetched concurrently but replayed in
//! source order so that views are created after the tables they select
//! from.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use once_cell::sync::OnceCell;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::SchemaConfig;
use crate::core::{DatabaseDefaults, SchemaObject, SchemaSource, SchemaTarget};
use crate::error::Result;
use crate::resilience::ResiliencePolicy;

const DEFINER_PATTERN: &str = r"DEFINER=`[a-zA-Z0-9_-]*`@`[a-zA-Z0-9%._-]*`\s*";

static DEFINER: OnceCell<Regex> = OnceCell::new();

/// Remove `DEFINER=` clauses so objects are owned by the connecting user.
pub fn strip_definer(script: &str) -> Result<String> {
    let definer = DEFINER.get_or_try_init(|| Regex::new(DEFINER_PATTERN))?;
    Ok(definer.replace_all(script, "").into_owned())
}

/// Copies the database and its objects from source to destination.
pub struct SchemaCopier {
    source: Arc<dyn SchemaSource>,
    target: Arc<dyn SchemaTarget>,
    source_policy: Arc<ResiliencePolicy>,
    target_policy: Arc<ResiliencePolicy>,
    settings: SchemaConfig,
    concurrency: usize,
}

impl SchemaCopier {
    pub fn new(
        source: Arc<dyn SchemaSource>,
        target: Arc<dyn SchemaTarget>,
        source_policy: Arc<ResiliencePolicy>,
        target_policy: Arc<ResiliencePolicy>,
        settings: SchemaConfig,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            target,
            source_policy,
            target_policy,
            settings,
            concurrency: concurrency.max(1),
        }
    }

    /// Create the destination database and replay every object script.
    ///
    /// Returns the number of objects created.
    pub async fn copy(&self, cancel: &CancellationToken) -> Result<usize> {
        info!(event = "schema_copy_started", "Copying schema");
        let started = Instant::now();

        match self.copy_inner(cancel).await {
            Ok(objects) => {
                info!(
                    event = "schema_copy_completed",
                    objects,
                    elapsed_seconds = started.elapsed().as_secs_f64(),
                    "Schema copied ({} objects)",
                    objects
                );
                Ok(objects)
            }
            Err(e) => {
                error!(event = "schema_copy_failed", error = %e, "Schema copy failed: {}", e);
                Err(e)
            }
        }
    }

    async fn copy_inner(&self, cancel: &CancellationToken) -> Result<usize> {
        let defaults = self.database_defaults(cancel).await?;
        let drop_first = self.settings.drop_database;
        let target = &self.target;
        self.target_policy
            .execute(cancel, || target.create_database(&defaults, drop_first))
            .await?;
        debug!(
            character_set = %defaults.character_set,
            collation = %defaults.collation,
            "Destination database ready"
        );

        let source = &self.source;
        let objects = self.source_policy.execute(cancel, || source.objects()).await?;
        let scripts: Vec<(SchemaObject, String)> = stream::iter(objects)
            .map(|object| async move {
                let script = self
                    .source_policy
                    .execute(cancel, || source.create_script(&object))
                    .await?;
                Ok::<_, crate::error::MigrateError>((object, script))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        for (object, script) in &scripts {
            let script = strip_definer(script)?;
            debug!(kind = %object.kind, name = %object.name, "Creating object");
            self.target_policy
                .execute(cancel, || target.replace_object(object, &script))
                .await?;
        }
        Ok(scripts.len())
    }

    /// Configured overrides, falling back to the source database defaults.
    async fn database_defaults(&self, cancel: &CancellationToken) -> Result<DatabaseDefaults> {
        if let (Some(character_set), Some(collation)) =
            (&self.settings.character_set, &self.settings.collation)
        {
            return Ok(DatabaseDefaults {
                character_set: character_set.clone(),
                collation: collation.clone(),
            });
        }

        let source = &self.source;
        let mut defaults = self
            .source_policy
            .execute(cancel, || source.database_defaults())
            .await?;
        if let Some(character_set) = &self.settings.character_set {
            defaults.character_set = character_set.clone();
        }
        if let Some(collation) = &self.settings.collation {
            defaults.collation = collation.clone();
        }
        Ok(defaults)
    }
}
