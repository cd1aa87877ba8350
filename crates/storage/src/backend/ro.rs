//! Read-only hub wrapper.
//!
//! This module provides a hub implementation that wraps another hub and
//! prevents write operations from executing, while still indicating success
//! on return. Wrapping a sync destination in it gives a dry run.

use async_trait::async_trait;

use crate::{FileInfo, Filehub, HubHandle, Object, backend::FileInfoStream, error::Result, validate_path};

/// Read-only hub.
///
/// Wraps another hub and silently drops all write operations, logging an
/// [`info event`](tracing::Event).
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: HubHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: HubHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Filehub for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> FileInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<FileInfo>> {
        self.inner.list(prefix).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn get(&self, path: &str) -> Result<Object> {
        self.inner.get(path).await
    }

    async fn put(&self, path: &str, data: &[u8], content_type: &str) -> Result<String> {
        let path = validate_path(path)?;
        tracing::info!(hub = self.name(), %path, bytes = data.len(), content_type, "Skipping put during read-only mode");
        Ok(path)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        tracing::info!(hub = self.name(), %path, "Skipping delete during read-only mode");
        Ok(())
    }

    async fn prefix(&self) -> Result<String> {
        self.inner.prefix().await
    }
}
