//! Adapter traits describing the external collaborators.
//!
//! The pipeline core only ever sees these two seams: a queryable event
//! source and an opaque named-blob store. Production adapters live in
//! `infra`; tests substitute in-memory implementations.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::domain::types::{AuthorRecord, EventRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("event source error: {message}")]
    Source { message: String },
    #[error("object store error: {message}")]
    Store { message: String },
}

impl RepoError {
    pub fn source(err: impl std::fmt::Display) -> Self {
        Self::Source {
            message: err.to_string(),
        }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }
}

/// The raw-event data source.
///
/// Extraction is streamed: a run may cover millions of rows and memory, not
/// CPU, is the binding resource.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Cheap liveness probe run before extraction so a dead source fails the
    /// run up front instead of mid-stream.
    async fn health_check(&self) -> Result<(), RepoError>;

    /// Every distinct author, ordered by first-ever event (ties by key).
    async fn list_authors(&self) -> Result<Vec<AuthorRecord>, RepoError>;

    /// All events, streamed. Ordering is not significant to aggregation.
    fn stream_events(&self) -> BoxStream<'_, Result<EventRecord, RepoError>>;
}

/// The public object store artifacts are published to.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Retrieve a named blob; `None` when the object does not exist.
    async fn fetch(&self, name: &str) -> Result<Option<Bytes>, RepoError>;

    /// Create or replace a named blob.
    async fn put(&self, name: &str, bytes: Bytes) -> Result<(), RepoError>;
}
