//! One-way reconciliation between filehub storage hubs.
//!
//! [`diff`] pairs two listings by path. [`sync`] lists a destination and a
//! source hub, plans the creates, replaces and deletes a [`CopyPolicy`]
//! allows, and applies them phase by phase with bounded concurrency,
//! streaming a [`SyncEvent`] per step. [`copy`] drives that stream to the
//! end and folds every per-file failure into one
//! [`Aggregate`](error::ErrorKind::Aggregate) error.

mod copy;
mod diff;
pub mod error;
mod plan;
mod policy;
mod pool;

pub use crate::copy::{DEFAULT_CONCURRENCY, Summary, SyncEvent, SyncOptions, copy, sync};
pub use crate::diff::{Diff, diff, diff_hubs};
pub use crate::error::{Failure, Failures};
pub use crate::plan::{Action, Plan, is_newer};
pub use crate::policy::CopyPolicy;
