//! Storage hubs for filehub.
//!
//! A [`Filehub`] is a mounted storage root (a local directory tree or a
//! bucket/prefix on an object store) exposing a small CRUD interface. Every
//! hub normalises its listing to a flat sequence of leaf [`FileInfo`]
//! entries so that callers never need to know how the backend is laid out.

pub mod backend;
mod content;
pub mod error;
mod file;
pub mod locator;
mod path;

pub use crate::backend::Filehub;
pub use crate::content::{DEFAULT_CONTENT_TYPE, content_type_from_path};
pub use crate::file::{FileInfo, Object};
pub use crate::locator::Locator;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type HubHandle = Arc<dyn Filehub + Send + Sync>;
