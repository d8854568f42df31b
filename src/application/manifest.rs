//! Content-addressed manifest and the incremental publisher.
//!
//! Publish is a three-step machine: hash every artifact, diff against the
//! previously published manifest, upload only what changed plus the manifest
//! pair itself. A missing or unreadable remote manifest is an empty baseline,
//! not a failure; the worst case is re-uploading everything, which is safe.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::artifacts::Artifact;
use crate::application::repos::{ObjectStore, RepoError};
use crate::util::csv::{self, CsvValue, CsvWriter};

pub const FILES_ARTIFACT: &str = "files.csv";
pub const FILE_HASHES_ARTIFACT: &str = "file_hashes.csv";

pub const METRIC_ARTIFACTS_UPLOADED: &str = "conteggio_artifacts_uploaded_total";
pub const METRIC_UPLOAD_BYTES: &str = "conteggio_upload_bytes_total";

/// An artifact plus its content address.
#[derive(Debug, Clone)]
pub struct HashedArtifact {
    pub name: String,
    pub bytes: Bytes,
    pub sha256: String,
    pub size: u64,
}

/// Compute size and SHA-256 for every artifact in the set.
pub fn hash_artifacts(artifacts: Vec<Artifact>) -> Vec<HashedArtifact> {
    artifacts
        .into_iter()
        .map(|artifact| {
            let sha256 = hex::encode(Sha256::digest(&artifact.bytes));
            let size = artifact.bytes.len() as u64;
            HashedArtifact {
                name: artifact.name,
                bytes: artifact.bytes,
                sha256,
                size,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub sha256: String,
    pub size: u64,
}

/// The ordered `(filename, sha256, size)` listing of all data artifacts.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestParseError {
    #[error(transparent)]
    Csv(#[from] csv::CsvParseError),
    #[error("manifest row {row} has {fields} fields, expected 3")]
    FieldCount { row: usize, fields: usize },
    #[error("manifest row {row} has a non-numeric size `{value}`")]
    Size { row: usize, value: String },
}

impl Manifest {
    pub fn from_artifacts(artifacts: &[HashedArtifact]) -> Self {
        let entries = artifacts
            .iter()
            .map(|artifact| {
                (
                    artifact.name.clone(),
                    ManifestEntry {
                        sha256: artifact.sha256.clone(),
                        size: artifact.size,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Decode a previously published `file_hashes.csv`.
    pub fn parse(text: &str) -> Result<Self, ManifestParseError> {
        let mut entries = BTreeMap::new();
        for (index, row) in csv::parse(text)?.into_iter().enumerate().skip(1) {
            let row_number = index + 1;
            let [name, sha256, size_value] =
                <[String; 3]>::try_from(row).map_err(|row| ManifestParseError::FieldCount {
                    row: row_number,
                    fields: row.len(),
                })?;
            let size = size_value
                .parse::<u64>()
                .map_err(|_| ManifestParseError::Size {
                    row: row_number,
                    value: size_value.clone(),
                })?;
            entries.insert(name, ManifestEntry { sha256, size });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    /// Names present here whose content differs from (or is absent in)
    /// `previous`, in name order.
    pub fn changed_since(&self, previous: &Manifest) -> Vec<String> {
        self.entries
            .iter()
            .filter(|&(name, entry)| previous.entries.get(name.as_str()) != Some(entry))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The name-only manifest artifact body.
    pub fn files_csv(&self) -> Bytes {
        let mut writer = CsvWriter::with_header(&["filename"]);
        for name in self.entries.keys() {
            writer.record(&[CsvValue::Text(name)]);
        }
        Bytes::from(writer.finish())
    }

    /// The name+hash+size manifest artifact body.
    pub fn file_hashes_csv(&self) -> Bytes {
        let mut writer = CsvWriter::with_header(&["filename", "sha256", "size"]);
        for (name, entry) in &self.entries {
            writer.record(&[
                CsvValue::Text(name),
                CsvValue::Text(&entry.sha256),
                CsvValue::Integer(entry.size),
            ]);
        }
        Bytes::from(writer.finish())
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to upload `{name}`")]
    Upload {
        name: String,
        #[source]
        source: RepoError,
    },
}

/// What one publish run did.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub artifact_count: usize,
    pub uploaded: Vec<String>,
    pub unchanged: usize,
    pub bytes_uploaded: u64,
}

/// Uploads changed artifacts and the manifest pair to the object store.
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The manifest published by the previous run, or the empty baseline
    /// when none can be retrieved.
    pub async fn remote_manifest(&self) -> Manifest {
        let bytes = match self.store.fetch(FILE_HASHES_ARTIFACT).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!("no remote manifest found, treating previous publish as empty");
                return Manifest::default();
            }
            Err(err) => {
                warn!(error = %err, "remote manifest fetch failed, treating previous publish as empty");
                return Manifest::default();
            }
        };

        let Ok(text) = std::str::from_utf8(&bytes) else {
            warn!("remote manifest is not valid UTF-8, treating previous publish as empty");
            return Manifest::default();
        };
        match Manifest::parse(text) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(error = %err, "remote manifest is malformed, treating previous publish as empty");
                Manifest::default()
            }
        }
    }

    /// The names that would upload, without uploading anything.
    pub async fn plan(&self, artifacts: &[HashedArtifact]) -> Vec<String> {
        let local = Manifest::from_artifacts(artifacts);
        let remote = self.remote_manifest().await;
        local.changed_since(&remote)
    }

    /// Run the hash→diff→upload machine to completion.
    ///
    /// The first failed upload aborts the run; whatever uploaded before it
    /// stays live and the next run's diff resumes from there.
    pub async fn publish(
        &self,
        artifacts: &[HashedArtifact],
    ) -> Result<PublishReport, PublishError> {
        let local = Manifest::from_artifacts(artifacts);
        let remote = self.remote_manifest().await;
        let changed = local.changed_since(&remote);

        let by_name: BTreeMap<&str, &HashedArtifact> = artifacts
            .iter()
            .map(|artifact| (artifact.name.as_str(), artifact))
            .collect();

        let mut bytes_uploaded = 0u64;
        for name in &changed {
            let artifact = by_name[name.as_str()];
            debug!(artifact = %name, size = artifact.size, "uploading changed artifact");
            self.upload(name, artifact.bytes.clone()).await?;
            bytes_uploaded += artifact.size;
        }

        // The manifest pair always re-uploads: it is what the next run
        // diffs against.
        for (name, bytes) in [
            (FILES_ARTIFACT, local.files_csv()),
            (FILE_HASHES_ARTIFACT, local.file_hashes_csv()),
        ] {
            bytes_uploaded += bytes.len() as u64;
            self.upload(name, bytes).await?;
        }

        info!(
            uploaded = changed.len(),
            unchanged = artifacts.len() - changed.len(),
            bytes = bytes_uploaded,
            "publish complete"
        );

        Ok(PublishReport {
            artifact_count: artifacts.len(),
            unchanged: artifacts.len() - changed.len(),
            uploaded: changed,
            bytes_uploaded,
        })
    }

    async fn upload(&self, name: &str, bytes: Bytes) -> Result<(), PublishError> {
        let size = bytes.len() as u64;
        self.store
            .put(name, bytes)
            .await
            .map_err(|source| PublishError::Upload {
                name: name.to_string(),
                source,
            })?;
        counter!(METRIC_ARTIFACTS_UPLOADED).increment(1);
        counter!(METRIC_UPLOAD_BYTES).increment(size);
        Ok(())
    }
}
