//! Hub listing and transfer types.

use std::fmt::{Display, Formatter, Result as FmtResult};
use time::OffsetDateTime;

/// Metadata for one stored object, as reported by a hub at list time.
///
/// Created by [`Filehub::list_stream`](crate::Filehub::list_stream) and never
/// mutated afterwards; it lives only as long as the operation that listed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Forward-slash separated path relative to the hub root
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp, as reported by the backend
    pub modified: OffsetDateTime,
    /// Name of the hub that produced this entry
    pub hub: String,
}
impl FileInfo {
    pub fn new(path: impl Into<String>, size: u64, modified: OffsetDateTime, hub: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
            hub: hub.into(),
        }
    }
}
impl Display for FileInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{} {} {}", self.hub, self.path, self.modified, self.size)
    }
}

/// Full contents of an object fetched with [`Filehub::get`](crate::Filehub::get).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub data: Vec<u8>,
    /// Best-effort MIME type; backends that don't store one guess it from
    /// the file extension.
    pub content_type: String,
}
impl Object {
    pub fn new(data: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }
}
