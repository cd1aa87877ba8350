//! Pairing two listings by path.
//!
//! Both sides are sorted by path bytes and merge-joined, so every path that
//! appears in either listing comes out exactly once, classified by which
//! side(s) it was found on.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use filehub_storage::{FileInfo, HubHandle};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// One path and where it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    /// Present on both hubs.
    Both { destination: FileInfo, source: FileInfo },
    /// Only the destination has it.
    DestinationOnly(FileInfo),
    /// Only the source has it.
    SourceOnly(FileInfo),
}

impl Diff {
    pub fn path(&self) -> &str {
        match self {
            Self::Both { source, .. } | Self::SourceOnly(source) => &source.path,
            Self::DestinationOnly(destination) => &destination.path,
        }
    }

    pub fn destination(&self) -> Option<&FileInfo> {
        match self {
            Self::Both { destination, .. } | Self::DestinationOnly(destination) => Some(destination),
            Self::SourceOnly(_) => None,
        }
    }

    pub fn source(&self) -> Option<&FileInfo> {
        match self {
            Self::Both { source, .. } | Self::SourceOnly(source) => Some(source),
            Self::DestinationOnly(_) => None,
        }
    }
}

impl Display for Diff {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let side = match self {
            Self::Both { .. } => "both",
            Self::DestinationOnly(_) => "destination only",
            Self::SourceOnly(_) => "source only",
        };
        write!(f, "{} ({side})", self.path())
    }
}

/// Merge-join two listings into one [`Diff`] per distinct path.
///
/// The output is ordered by path bytes. Neither input needs to be sorted,
/// but a path appearing twice in the same listing is rejected with
/// [`ErrorKind::DuplicatePath`].
pub fn diff(mut destination: Vec<FileInfo>, mut source: Vec<FileInfo>) -> Result<Vec<Diff>> {
    sort_by_path(&mut destination)?;
    sort_by_path(&mut source)?;

    let mut diffs = Vec::with_capacity(destination.len().max(source.len()));
    let mut destination = destination.into_iter().peekable();
    let mut source = source.into_iter().peekable();
    loop {
        let ordering = match (destination.peek(), source.peek()) {
            (Some(dst), Some(src)) => dst.path.as_bytes().cmp(src.path.as_bytes()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };
        let next = match ordering {
            Ordering::Less => destination.next().map(Diff::DestinationOnly),
            Ordering::Greater => source.next().map(Diff::SourceOnly),
            Ordering::Equal => destination
                .next()
                .zip(source.next())
                .map(|(destination, source)| Diff::Both { destination, source }),
        };
        diffs.extend(next);
    }
    Ok(diffs)
}

/// List both hubs under `root` concurrently and [`diff`] the results.
///
/// A root that is empty once slashes are trimmed (`""`, `/`) means the whole
/// hub. A listing failure on either side aborts before anything is compared.
pub async fn diff_hubs(destination: &HubHandle, source: &HubHandle, root: Option<&str>) -> Result<Vec<Diff>> {
    let root = root.map(|r| r.trim_matches('/')).filter(|r| !r.is_empty());
    let (destination_files, source_files) = futures::try_join!(
        async {
            destination
                .list(root)
                .await
                .or_raise(|| ErrorKind::Listing(destination.name().to_string()))
        },
        async {
            source
                .list(root)
                .await
                .or_raise(|| ErrorKind::Listing(source.name().to_string()))
        },
    )?;
    tracing::debug!(
        destination = destination.name(),
        destination_files = destination_files.len(),
        source = source.name(),
        source_files = source_files.len(),
        "Listed hubs"
    );
    diff(destination_files, source_files)
}

fn sort_by_path(files: &mut [FileInfo]) -> Result<()> {
    files.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));
    if let Some(pair) = files.windows(2).find(|pair| pair[0].path == pair[1].path) {
        exn::bail!(ErrorKind::DuplicatePath(pair[0].path.clone()));
    }
    Ok(())
}
