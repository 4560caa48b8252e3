//! Object storage access for config and credential blobs.
//!
//! The manager only ever reads two blobs per invocation: the service-account
//! credential blob and the YAML extraction config. Credentials are fetched
//! first and handed to the config fetch as an explicit value; nothing is
//! written to disk or to the process environment.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{BarrageError, Result};

/// Address of one blob in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobLocation {
    pub bucket: String,
    pub blob: String,
}

impl BlobLocation {
    pub fn new(bucket: impl Into<String>, blob: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            blob: blob.into(),
        }
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.blob)
    }
}

/// Opaque service-account credential blob.
///
/// The contents never appear in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(Arc<[u8]>);

impl Credentials {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials(<{} bytes redacted>)", self.0.len())
    }
}

/// Read access to object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a blob's contents.
    ///
    /// `credentials` is `None` when the caller relies on ambient access, as
    /// when fetching the credential blob itself.
    async fn fetch(
        &self,
        location: &BlobLocation,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>>;
}

// ============================================================================
// Local filesystem implementation
// ============================================================================

/// Object store backed by a directory: bucket `b`, blob `x/y` lives at
/// `<root>/b/x/y`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, location: &BlobLocation) -> Result<PathBuf> {
        let relative = Path::new(&location.bucket).join(&location.blob);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(BarrageError::Storage(format!(
                "invalid blob location {}",
                location
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn fetch(
        &self,
        location: &BlobLocation,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>> {
        let path = self.path_for(location)?;
        tracing::debug!(
            location = %location,
            path = %path.display(),
            with_credentials = credentials.is_some(),
            "Reading blob from local store"
        );
        tokio::fs::read(&path).await.map_err(|e| {
            BarrageError::Storage(format!("failed to read {}: {}", location, e))
        })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

/// Record of a fetch made against [`InMemoryObjectStore`].
#[derive(Debug, Clone)]
pub struct FetchRecord {
    pub location: BlobLocation,
    pub credentials: Option<Credentials>,
}

/// In-memory object store for testing.
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    blobs: Arc<Mutex<HashMap<BlobLocation, Vec<u8>>>>,
    fetches: Arc<Mutex<Vec<FetchRecord>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, blob: &str, contents: impl Into<Vec<u8>>) {
        self.blobs
            .lock()
            .insert(BlobLocation::new(bucket, blob), contents.into());
    }

    /// All fetches made so far, in order.
    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.fetches.lock().clone()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn fetch(
        &self,
        location: &BlobLocation,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>> {
        self.fetches.lock().push(FetchRecord {
            location: location.clone(),
            credentials: credentials.cloned(),
        });
        self.blobs
            .lock()
            .get(location)
            .cloned()
            .ok_or_else(|| BarrageError::Storage(format!("blob {} does not exist", location)))
    }
}
