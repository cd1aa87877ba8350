//! Filehub trait and backend implementations.
//!
//! This module defines the [`Filehub`] trait, which provides a unified
//! interface for storage operations across different backends (local
//! filesystem, S3-compatible services, etc.).

mod local;
#[cfg(feature = "mock")]
mod mock;
mod ro;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Operation};
pub use self::ro::ReadOnlyBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::Result;
use crate::file::{FileInfo, Object};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage hubs.
///
/// All operations are asynchronous and take `&self`, so one hub can serve
/// many concurrent transfers. It's a glorified CRUD interface over whatever
/// the backend happens to be.
///
/// # Path Handling
/// All paths are relative to the hub root, use `/` as the separator and must
/// be validated using [`validate_path`](crate::validate_path) before use.
/// Implementations should enforce this validation.
///
/// # Examples
///
/// ```
/// use filehub_storage::{Filehub, error::Result};
///
/// async fn size_of_hardcoded_file(hub: &dyn Filehub) -> Result<u64> {
///     let path = "path/to/file.html";
///     if hub.exists(path).await? {
///         let object = hub.get(path).await?;
///         Ok(object.data.len() as u64)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait Filehub: Send + Sync {
    /// Name of the configured hub. Each hub's name is **supposed** to be
    /// unique, but nothing in this crate depends on it (used for logging and
    /// as the owner reference on [`FileInfo`]).
    fn name(&self) -> &str;

    /// List all files at or below an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata at or below an optional prefix.
    ///
    /// Yields a flat sequence of leaf entries; directories (or common
    /// prefixes on object stores) are never yielded. Prefix matching is
    /// component based: `docs` matches `docs` and `docs/a.txt` but not
    /// `docs2/a.txt`. A prefix that doesn't exist yields nothing rather than
    /// an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use filehub_storage::{Filehub, error::Result};
    /// # async fn example(hub: &dyn Filehub) -> Result<()> {
    ///
    /// // Process files one at a time
    /// let mut stream = hub.list_stream(Some("docs"));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path, info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Read the complete contents of a file, along with its content type.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use filehub_storage::{Filehub, error::Result};
    /// # async fn example(hub: &dyn Filehub) -> Result<()> {
    /// let object = hub.get("index.html").await?;
    /// println!("Read {} bytes of {}", object.data.len(), object.content_type);
    /// # Ok(())
    /// # }
    /// ```
    async fn get(&self, path: &str) -> Result<Object>;

    /// Create or overwrite a file.
    ///
    /// Returns the canonical location the data was stored at, which may
    /// differ from `path` (an absolute filesystem path, or an object key with
    /// the hub's prefix joined on).
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed.
    /// - Backends without content type metadata ignore `content_type`.
    async fn put(&self, path: &str, data: &[u8], content_type: &str) -> Result<String>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Absolute base locator (a URL) that public references to stored paths
    /// can be built from.
    async fn prefix(&self) -> Result<String>;
}
