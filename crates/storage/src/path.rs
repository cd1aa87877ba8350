//! Path validation and security utilities.
//!
//! Hub paths are plain strings using `/` as the separator regardless of
//! platform, so that local directories and object store keys compare the
//! same way. This module normalises them and prevents path traversal.

use crate::error::{ErrorKind, Result};

/// Validates a hub path for security and correctness.
/// Ensures that paths don't escape the hub root (no `..` traversal).
///
/// > **Note:** Backslashes are **not** separators; on an object store they're
/// >           just another character in the key. Null bytes are rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use filehub_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("docs/readme.txt").is_ok());
/// assert!(validate_path("a/b/c/file.html").is_ok());
/// assert!(validate_path("a/../file.html").is_ok()); // (never leaves hub root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err()); // (leaves hub root)
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("wrong/../still-wrong/.././correct//./path.html/").unwrap(),
///     "correct/path.html"
/// );
/// ```
pub fn validate(path: impl AsRef<str>) -> Result<String> {
    let raw = path.as_ref();
    if raw.contains('\0') {
        exn::bail!(ErrorKind::InvalidPath(raw.to_string()));
    }
    let mut components: Vec<&str> = Vec::new();
    for component in raw.split('/') {
        match component {
            "" | "." => {},
            ".." => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(raw.to_string()));
                }
            },
            normal => components.push(normal),
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(raw.to_string())),
        false => Ok(components.join("/")),
    }
}

/// Component-based prefix check on already validated paths: `a/b` is within
/// `a` and `a/b`, but not within `a/bc`.
pub(crate) fn is_within(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
