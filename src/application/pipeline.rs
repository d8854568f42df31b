//! Run orchestration: extraction → identity → tally → partition → publish.
//!
//! One `RollupPipeline` owns exactly one run's state. Everything is
//! recomputed from the raw source each run; a failed run is safe to restart
//! from scratch.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use metrics::{counter, histogram};
use tokio::fs;
use tracing::info;

use crate::application::artifacts;
use crate::application::error::AppError;
use crate::application::manifest::{self, HashedArtifact, PublishReport, Publisher};
use crate::application::repos::{EventStore, ObjectStore};
use crate::config::SourceSettings;
use crate::domain::calendar::civil_date;
use crate::domain::error::DomainError;
use crate::domain::identity::AuthorDirectory;
use crate::domain::tally::RollupLedger;
use crate::domain::types::Category;
use crate::infra::error::InfraError;

pub const METRIC_EVENTS_EXTRACTED: &str = "conteggio_events_extracted_total";
pub const METRIC_ARTIFACTS_BUILT: &str = "conteggio_artifacts_built_total";
pub const METRIC_PUBLISH_MS: &str = "conteggio_publish_ms";

pub struct RollupPipeline {
    events: Arc<dyn EventStore>,
    source: SourceSettings,
}

impl RollupPipeline {
    pub fn new(events: Arc<dyn EventStore>, source: SourceSettings) -> Self {
        Self { events, source }
    }

    /// Extract, aggregate, and partition, returning the hashed artifact set.
    ///
    /// `as_of` fixes the run's notion of "now"; the current in-progress
    /// period is included in every series.
    pub async fn build_artifacts(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<HashedArtifact>, AppError> {
        self.events.health_check().await?;

        let authors = self.events.list_authors().await?;
        let directory = AuthorDirectory::assign(authors);
        info!(authors = directory.len(), "author directory assigned");

        let today = civil_date(as_of, self.source.timezone);
        let mut ledger = RollupLedger::new(
            self.source.timezone,
            self.source.epoch_start,
            today,
            directory.len(),
        );

        let mut stream = self.events.stream_events();
        while let Some(event) = stream.next().await {
            let event = event?;
            let category = Category::from_code(event.category)?;
            let index = directory
                .index_of(&event.author_key)
                .ok_or_else(|| DomainError::unknown_author(&event.author_key))?;
            ledger.observe(index, event.posted_at, category);
        }
        drop(stream);

        counter!(METRIC_EVENTS_EXTRACTED).increment(ledger.events_seen());
        info!(events = ledger.events_seen(), "extraction complete");

        let artifacts = artifacts::partition(&directory, &ledger, self.source.activity_threshold);
        counter!(METRIC_ARTIFACTS_BUILT).increment(artifacts.len() as u64);
        info!(artifacts = artifacts.len(), "artifact set partitioned");

        Ok(manifest::hash_artifacts(artifacts))
    }

    /// Full run: build the artifact set and publish what changed.
    pub async fn publish(
        &self,
        store: Arc<dyn ObjectStore>,
        as_of: DateTime<Utc>,
    ) -> Result<PublishReport, AppError> {
        let artifacts = self.build_artifacts(as_of).await?;
        let started = Instant::now();
        let report = Publisher::new(store).publish(&artifacts).await?;
        histogram!(METRIC_PUBLISH_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        Ok(report)
    }

    /// Dry run: report which artifacts a publish would upload.
    pub async fn plan(
        &self,
        store: Arc<dyn ObjectStore>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<String>, AppError> {
        let artifacts = self.build_artifacts(as_of).await?;
        Ok(Publisher::new(store).plan(&artifacts).await)
    }

    /// Write the complete artifact set (manifest pair included) to a local
    /// directory, without talking to any object store.
    pub async fn export(&self, dir: &Path, as_of: DateTime<Utc>) -> Result<usize, AppError> {
        let artifacts = self.build_artifacts(as_of).await?;
        fs::create_dir_all(dir).await.map_err(InfraError::from)?;

        for artifact in &artifacts {
            fs::write(dir.join(&artifact.name), &artifact.bytes)
                .await
                .map_err(InfraError::from)?;
        }

        let local = manifest::Manifest::from_artifacts(&artifacts);
        fs::write(dir.join(manifest::FILES_ARTIFACT), local.files_csv())
            .await
            .map_err(InfraError::from)?;
        fs::write(
            dir.join(manifest::FILE_HASHES_ARTIFACT),
            local.file_hashes_csv(),
        )
        .await
        .map_err(InfraError::from)?;

        let written = artifacts.len() + 2;
        info!(artifacts = written, dir = %dir.display(), "artifact set exported");
        Ok(written)
    }
}
