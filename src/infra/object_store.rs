//! Object store adapters: HTTP and local filesystem.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use tokio::fs;
use url::Url;

use crate::application::repos::{ObjectStore, RepoError};

const ARTIFACT_CONTENT_TYPE: &str = "text/csv";

/// Publishes artifacts to an HTTP object store (GET/PUT by name under a
/// base URL).
pub struct HttpObjectStore {
    client: reqwest::Client,
    base: Url,
}

impl HttpObjectStore {
    pub fn new(base: Url, request_timeout: Duration) -> Result<Self, RepoError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(RepoError::store)?;
        Ok(Self { client, base })
    }

    fn object_url(&self, name: &str) -> Result<Url, RepoError> {
        self.base
            .join(name)
            .map_err(|err| RepoError::store(format!("invalid object name `{name}`: {err}")))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn fetch(&self, name: &str) -> Result<Option<Bytes>, RepoError> {
        let response = self
            .client
            .get(self.object_url(name)?)
            .send()
            .await
            .map_err(RepoError::store)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(RepoError::store)?;
        let bytes = response.bytes().await.map_err(RepoError::store)?;
        Ok(Some(bytes))
    }

    async fn put(&self, name: &str, bytes: Bytes) -> Result<(), RepoError> {
        self.client
            .put(self.object_url(name)?)
            .header(CONTENT_TYPE, ARTIFACT_CONTENT_TYPE)
            .body(bytes)
            .send()
            .await
            .map_err(RepoError::store)?
            .error_for_status()
            .map_err(RepoError::store)?;
        Ok(())
    }
}

/// Filesystem-backed object store, used for development and tests and for
/// serving a published set from a static web root.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Root the store at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, RepoError> {
        std::fs::create_dir_all(&root).map_err(RepoError::store)?;
        Ok(Self { root })
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, RepoError> {
        let relative = Path::new(name);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(RepoError::store(format!("invalid object name `{name}`")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn fetch(&self, name: &str) -> Result<Option<Bytes>, RepoError> {
        let path = self.resolve(name)?;
        match fs::read(path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(RepoError::store(err)),
        }
    }

    async fn put(&self, name: &str, bytes: Bytes) -> Result<(), RepoError> {
        let path = self.resolve(name)?;
        fs::write(path, &bytes).await.map_err(RepoError::store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_round_trips_and_reports_missing_objects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsObjectStore::new(dir.path().to_path_buf()).expect("store");

        assert_eq!(store.fetch("missing.csv").await.expect("fetch"), None);

        store
            .put("users.csv", Bytes::from_static(b"\"user_id\"\n"))
            .await
            .expect("put");
        let fetched = store.fetch("users.csv").await.expect("fetch");
        assert_eq!(fetched, Some(Bytes::from_static(b"\"user_id\"\n")));
    }

    #[tokio::test]
    async fn fs_store_rejects_path_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsObjectStore::new(dir.path().to_path_buf()).expect("store");

        assert!(store.fetch("../escape.csv").await.is_err());
        assert!(
            store
                .put("/absolute.csv", Bytes::from_static(b"x"))
                .await
                .is_err()
        );
    }
}
