//! Sync Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Storage errors raised while listing
//! stay attached as children of [`ErrorKind::Listing`].

use crate::plan::Action;
use derive_more::{Display, Error};
use filehub_storage::error::Error as StorageError;
use std::fmt::{Display as FmtDisplay, Formatter, Result as FmtResult};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Listing one of the hubs failed, so nothing was attempted.
    #[display("failed listing hub `{_0}`")]
    Listing(#[error(not(source))] String),
    /// A single listing contained the same path twice.
    #[display("duplicate path in listing: {_0}")]
    DuplicatePath(#[error(not(source))] String),
    /// A copy policy string couldn't be parsed.
    #[display("invalid copy policy: {_0}")]
    InvalidPolicy(#[error(not(source))] String),
    /// One or more actions failed; everything else was still attempted.
    #[display("{_0}")]
    Aggregate(#[error(not(source))] Failures),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Listing(_) => true,
            Self::Aggregate(failures) => failures.iter().any(|failure| failure.error.is_retryable()),
            Self::DuplicatePath(_) | Self::InvalidPolicy(_) => false,
        }
    }
}

/// One action that could not be applied, with the storage error behind it.
#[derive(Debug)]
pub struct Failure {
    pub action: Action,
    pub error: StorageError,
}
impl FmtDisplay for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}: {}", self.action, &*self.error)
    }
}

/// Every [`Failure`] from one sync, in the order they were observed.
#[derive(Debug, Default)]
pub struct Failures(Vec<Failure>);
impl Failures {
    pub fn new(failures: Vec<Failure>) -> Self {
        Self(failures)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Failure> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<Failure> {
        self.0
    }
}
impl FmtDisplay for Failures {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}
impl<'a> IntoIterator for &'a Failures {
    type Item = &'a Failure;
    type IntoIter = std::slice::Iter<'a, Failure>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filehub_storage::error::ErrorKind as StorageErrorKind;

    fn failure(action: Action, kind: StorageErrorKind) -> Failure {
        Failure {
            action,
            error: exn::Exn::from(kind),
        }
    }

    #[test]
    fn aggregate_display_joins_with_newlines() {
        let failures = Failures::new(vec![
            failure(Action::Create("a.txt".to_string()), StorageErrorKind::NotFound("a.txt".to_string())),
            failure(Action::Delete("b.txt".to_string()), StorageErrorKind::Network("reset".to_string())),
        ]);
        assert_eq!(
            ErrorKind::Aggregate(failures).to_string(),
            "create `a.txt`: file not found: a.txt\ndelete `b.txt`: network error: reset"
        );
    }

    #[test]
    fn aggregate_retryable_if_any_failure_is() {
        let permanent = Failures::new(vec![failure(
            Action::Create("a".to_string()),
            StorageErrorKind::NotFound("a".to_string()),
        )]);
        assert!(!ErrorKind::Aggregate(permanent).is_retryable());
        let transient = Failures::new(vec![
            failure(Action::Create("a".to_string()), StorageErrorKind::NotFound("a".to_string())),
            failure(Action::Replace("b".to_string()), StorageErrorKind::Network("timeout".to_string())),
        ]);
        assert!(ErrorKind::Aggregate(transient).is_retryable());
    }
}
