//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::content::content_type_from_path;
use crate::error::{ErrorKind, Result};
use crate::path::{is_within, validate as validate_path};
use crate::{FileInfo, Filehub, Object};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Hub operations that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Exists,
    Get,
    Put,
    Delete,
}
impl Operation {
    const ALL: [Operation; 5] = [Self::List, Self::Exists, Self::Get, Self::Put, Self::Delete];

    fn index(self) -> usize {
        match self {
            Self::List => 0,
            Self::Exists => 1,
            Self::Get => 2,
            Self::Put => 3,
            Self::Delete => 4,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    modified: OffsetDateTime,
    content_type: String,
    data: Vec<u8>,
}

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Ideal for unit
/// tests that need a [`Filehub`] without filesystem or network dependencies.
///
/// On top of storage it counts every call per [`Operation`] and can be told
/// to fail specific operations, either for a single path or (for
/// [`Operation::List`]) altogether.
///
/// # Examples
///
/// ```
/// use filehub_storage::Filehub;
/// use filehub_storage::backend::MockBackend;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("site/index.html", b"<html>...</html>"),
/// ]);
/// assert!(backend.exists("site/index.html").await?);
///
/// backend.put("site/about.html", b"data...", "text/html").await?;
/// assert!(backend.exists("site/about.html").await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<String, Entry>>,
    failures: std::sync::RwLock<HashSet<(Operation, Option<String>)>>,
    calls: [AtomicUsize; 5],
}

impl MockBackend {
    /// Create a mock backend pre-populated with files, all modified "now".
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Vec<u8>>)>) -> Self {
        let now = OffsetDateTime::now_utc();
        files.into_iter().fold(Self::empty(), |backend, (path, data)| backend.with_file(path, data, now))
    }

    /// Add a file with an explicit modification time.
    ///
    /// Panics on an invalid path, same as [`with_files`](Self::with_files).
    ///
    /// # Example
    ///
    /// ```
    /// use filehub_storage::backend::MockBackend;
    /// use time::OffsetDateTime;
    ///
    /// let backend = MockBackend::default()
    ///     .with_file("a.txt", b"one", OffsetDateTime::UNIX_EPOCH);
    /// ```
    pub fn with_file(mut self, path: impl AsRef<str>, data: impl Into<Vec<u8>>, modified: OffsetDateTime) -> Self {
        let path = path.as_ref();
        let Ok(validated) = validate_path(path) else {
            // The panic here is DELIBERATE. MockBackend is intended to be
            // used in tests; panics are expected. There is no error result.
            panic!("MockBackend::with_file: invalid path {path}");
        };
        let content_type = content_type_from_path(&validated).to_string();
        let entry = Entry {
            modified,
            content_type,
            data: data.into(),
        };
        self.storage.get_mut().insert(validated, entry);
        self
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make `operation` fail with a [`BackendError`](ErrorKind::BackendError)
    /// for `path`, or for every path when `path` is `None`.
    pub fn fail_on(mut self, operation: Operation, path: Option<&str>) -> Self {
        let path = path.map(|p| validate_path(p).unwrap_or_else(|_| p.to_string()));
        self.failures.get_mut().unwrap_or_else(|e| e.into_inner()).insert((operation, path));
        self
    }

    /// Number of times `operation` has been invoked so far.
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls[operation.index()].load(Ordering::SeqCst)
    }

    /// Total number of invocations across every [`Operation`].
    pub fn total_calls(&self) -> usize {
        Operation::ALL.iter().map(|op| self.calls(*op)).sum()
    }

    /// Current contents of a file, if it exists.
    pub async fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.storage.read().await.get(path).map(|entry| entry.data.clone())
    }

    /// Sorted list of every stored path.
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.storage.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn empty() -> Self {
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(HashMap::new()),
            failures: std::sync::RwLock::new(HashSet::new()),
            calls: Default::default(),
        }
    }

    fn record(&self, operation: Operation, path: Option<&str>) -> Result<()> {
        self.calls[operation.index()].fetch_add(1, Ordering::SeqCst);
        let failures = self.failures.read().unwrap_or_else(|e| e.into_inner());
        let failing = failures.contains(&(operation, None))
            || path.is_some_and(|p| failures.contains(&(operation, Some(p.to_string()))));
        if failing {
            exn::bail!(ErrorKind::BackendError(format!(
                "injected {operation:?} failure on {}",
                path.unwrap_or(self.name.as_str())
            )));
        }
        Ok(())
    }

    fn file_info(&self, path: &str, entry: &Entry) -> FileInfo {
        FileInfo::new(path, entry.data.len() as u64, entry.modified, self.name.as_str())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::empty()
    }
}

#[async_trait]
impl Filehub for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> FileInfoStream<'a> {
        if let Err(e) = self.record(Operation::List, prefix) {
            return Box::pin(futures::stream::once(async { Err(e) }));
        }
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => is_within(path, pfx),
                        None => true,
                    })
                    .map(|(path, entry)| self.file_info(path, entry))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.record(Operation::Exists, Some(path))?;
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn get(&self, path: &str) -> Result<Object> {
        self.record(Operation::Get, Some(path))?;
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let entry = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(Object::new(entry.data.clone(), entry.content_type.clone()))
    }

    async fn put(&self, path: &str, data: &[u8], content_type: &str) -> Result<String> {
        self.record(Operation::Put, Some(path))?;
        let path = validate_path(path)?;
        let entry = Entry {
            modified: OffsetDateTime::now_utc(),
            content_type: content_type.to_string(),
            data: data.to_vec(),
        };
        self.storage.write().await.insert(path.clone(), entry);
        Ok(path)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.record(Operation::Delete, Some(path))?;
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn prefix(&self) -> Result<String> {
        Ok(format!("memory://{}/", self.name))
    }
}
