use crate::diff::diff_hubs;
use crate::error::{ErrorKind, Failure, Failures, Result};
use crate::plan::{Action, Plan};
use crate::policy::CopyPolicy;
use crate::pool::bounded;
use async_stream::stream;
use filehub_storage::HubHandle;
use filehub_storage::error::Result as StorageResult;
use futures::{Stream, StreamExt};
use std::num::NonZeroUsize;
use std::pin::pin;
use time::Duration;

/// Default number of actions in flight within a phase.
pub const DEFAULT_CONCURRENCY: NonZeroUsize = match NonZeroUsize::new(8) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Tuning for [`sync`] and [`copy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum actions in flight at once within a phase.
    pub concurrency: NonZeroUsize,
    /// How much newer a source file must be before it replaces the
    /// destination copy.
    pub tolerance: Duration,
}
impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            tolerance: Duration::ZERO,
        }
    }
}
impl SyncOptions {
    /// One action at a time.
    pub fn sequential() -> Self {
        Self {
            concurrency: NonZeroUsize::MIN,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Progress events emitted by [`sync`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`Planned`](Self::Planned), exactly once, unless the policy is empty or
///    listing failed.
/// 3. [`Applied`](Self::Applied) or [`Failed`](Self::Failed), once per planned
///    action. All creates are reported before any replace, and all replaces
///    before any delete.
/// 4. [`Complete`](Self::Complete), exactly once.
///
/// A listing error terminates the stream early, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub enum SyncEvent {
    Started,
    /// Both hubs have been listed and compared.
    Planned { create: usize, replace: usize, delete: usize },
    Applied(Action),
    Failed(Failure),
    Complete,
}

/// Counts of successfully applied actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub created: usize,
    pub replaced: usize,
    pub deleted: usize,
}
impl Summary {
    fn record(&mut self, action: &Action) {
        match action {
            Action::Create(_) => self.created += 1,
            Action::Replace(_) => self.replaced += 1,
            Action::Delete(_) => self.deleted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.replaced + self.deleted
    }
}

/// Stream [`SyncEvent`]s while making `destination` match `source` under
/// `root`, as far as `policy` allows.
///
/// Both hubs are listed concurrently and [diffed](crate::diff()). The
/// resulting [`Plan`] is applied phase by phase, with up to
/// `options.concurrency` actions in flight within a phase. A failed action is
/// reported as [`SyncEvent::Failed`] and does not stop the others; only a
/// listing failure ends the stream with an `Err`.
///
/// An empty policy touches neither hub.
pub fn sync<'a>(
    destination: &'a HubHandle,
    source: &'a HubHandle,
    root: Option<&'a str>,
    policy: CopyPolicy,
    options: SyncOptions,
) -> impl Stream<Item = Result<SyncEvent>> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield Ok(SyncEvent::Started);

        if policy.is_none() {
            tracing::debug!(destination = destination.name(), source = source.name(), "Empty copy policy, skipping");
            yield Ok(SyncEvent::Complete);
            return;
        }

        tracing::info!(
            destination = destination.name(),
            source = source.name(),
            root = root.unwrap_or_default(),
            %policy,
            concurrency = options.concurrency.get(),
            "Starting sync"
        );
        let diffs = match diff_hubs(destination, source, root).await {
            Ok(diffs) => diffs,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        let plan = Plan::new(&diffs, policy, options.tolerance);
        yield Ok(SyncEvent::Planned {
            create: plan.create.len(),
            replace: plan.replace.len(),
            delete: plan.delete.len(),
        });

        for actions in plan.into_phases() {
            let Some(first) = actions.first() else { continue };
            tracing::info!(phase = first.verb(), actions = actions.len(), "Starting phase");
            let work: Vec<_> = actions.into_iter().map(|action| apply(destination, source, action)).collect();
            for await outcome in bounded(work, options.concurrency) {
                yield Ok(match outcome {
                    Ok(action) => SyncEvent::Applied(action),
                    Err(failure) => SyncEvent::Failed(failure),
                });
            }
        }

        yield Ok(SyncEvent::Complete);
    })
}

/// Run [`sync`] to completion.
///
/// Returns the [`Summary`] when every planned action succeeded. Otherwise
/// every action is still attempted and the error is an
/// [`Aggregate`](ErrorKind::Aggregate) holding each failure.
pub async fn copy(
    destination: &HubHandle,
    source: &HubHandle,
    root: Option<&str>,
    policy: CopyPolicy,
    options: SyncOptions,
) -> Result<Summary> {
    let mut summary = Summary::default();
    let mut failures = Vec::new();
    let mut events = pin!(sync(destination, source, root, policy, options));
    while let Some(event) = events.next().await {
        match event? {
            SyncEvent::Applied(action) => summary.record(&action),
            SyncEvent::Failed(failure) => failures.push(failure),
            SyncEvent::Started | SyncEvent::Planned { .. } | SyncEvent::Complete => {},
        }
    }
    if !failures.is_empty() {
        tracing::warn!(
            destination = destination.name(),
            failed = failures.len(),
            succeeded = summary.total(),
            "Sync finished with failures"
        );
        exn::bail!(ErrorKind::Aggregate(Failures::new(failures)));
    }
    tracing::info!(
        destination = destination.name(),
        created = summary.created,
        replaced = summary.replaced,
        deleted = summary.deleted,
        "Sync complete"
    );
    Ok(summary)
}

async fn apply(destination: &HubHandle, source: &HubHandle, action: Action) -> std::result::Result<Action, Failure> {
    let result = match &action {
        Action::Create(path) | Action::Replace(path) => transfer(destination, source, path).await,
        Action::Delete(path) => destination.delete(path).await,
    };
    match result {
        Ok(()) => {
            tracing::debug!(hub = destination.name(), %action, "Applied");
            Ok(action)
        },
        Err(error) => {
            let failure = Failure { action, error };
            tracing::warn!(hub = destination.name(), %failure, "Action failed");
            Err(failure)
        },
    }
}

async fn transfer(destination: &HubHandle, source: &HubHandle, path: &str) -> StorageResult<()> {
    let object = source.get(path).await?;
    let stored = destination.put(path, &object.data, &object.content_type).await?;
    tracing::trace!(hub = destination.name(), %path, %stored, bytes = object.data.len(), "Stored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filehub_storage::Filehub;
    use filehub_storage::backend::{MockBackend, Operation, ReadOnlyBackend};
    use rstest::rstest;
    use std::collections::HashSet;
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn at(seconds: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(seconds).unwrap()
    }

    fn handle(mock: &Arc<MockBackend>) -> HubHandle {
        mock.clone()
    }

    /// dst: a(t=100), b(t=100); src: b(t=200), c(t=50)
    fn scenario() -> (Arc<MockBackend>, Arc<MockBackend>) {
        let destination = MockBackend::default()
            .with_name("dst")
            .with_file("a", "dst-a", at(100))
            .with_file("b", "dst-b", at(100));
        let source = MockBackend::default()
            .with_name("src")
            .with_file("b", "src-b", at(200))
            .with_file("c", "src-c", at(50));
        (Arc::new(destination), Arc::new(source))
    }

    async fn run(
        destination: &Arc<MockBackend>,
        source: &Arc<MockBackend>,
        policy: CopyPolicy,
        options: SyncOptions,
    ) -> Result<Summary> {
        copy(&handle(destination), &handle(source), None, policy, options).await
    }

    #[tokio::test]
    async fn test_empty_policy_touches_nothing() {
        let (destination, source) = scenario();
        let summary = run(&destination, &source, CopyPolicy::NONE, SyncOptions::default()).await.unwrap();
        assert_eq!(summary, Summary::default());
        assert_eq!(destination.total_calls(), 0);
        assert_eq!(source.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_full_scenario() {
        let (destination, source) = scenario();
        let summary = run(&destination, &source, CopyPolicy::ALL, SyncOptions::default()).await.unwrap();
        assert_eq!(
            summary,
            Summary {
                created: 1,
                replaced: 1,
                deleted: 1
            }
        );
        assert_eq!(destination.paths().await, ["b", "c"]);
        assert_eq!(destination.contents("b").await.unwrap(), b"src-b");
        assert_eq!(destination.contents("c").await.unwrap(), b"src-c");
        // Source is only ever read.
        assert_eq!(source.calls(Operation::Put) + source.calls(Operation::Delete), 0);
        assert_eq!(source.contents("b").await.unwrap(), b"src-b");
    }

    #[tokio::test]
    async fn test_create_only() {
        let (destination, source) = scenario();
        let summary = run(&destination, &source, CopyPolicy::CREATE, SyncOptions::default()).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(destination.paths().await, ["a", "b", "c"]);
        assert_eq!(destination.contents("b").await.unwrap(), b"dst-b");
        assert_eq!(destination.calls(Operation::Delete), 0);
        assert_eq!(destination.calls(Operation::Put), 1);
    }

    #[tokio::test]
    async fn test_replace_only() {
        let (destination, source) = scenario();
        let summary = run(&destination, &source, CopyPolicy::REPLACE, SyncOptions::default()).await.unwrap();
        assert_eq!(summary.replaced, 1);
        assert_eq!(destination.paths().await, ["a", "b"]);
        assert_eq!(destination.contents("b").await.unwrap(), b"src-b");
        assert_eq!(source.calls(Operation::Get), 1);
    }

    #[rstest]
    #[case(100, false)]
    #[case(99, false)]
    #[case(101, true)]
    #[tokio::test]
    async fn test_replace_needs_strictly_newer(#[case] source_time: i64, #[case] replaced: bool) {
        let destination = Arc::new(MockBackend::default().with_file("f", "old", at(100)));
        let source = Arc::new(MockBackend::default().with_file("f", "new", at(source_time)));
        let summary = run(&destination, &source, CopyPolicy::REPLACE, SyncOptions::default()).await.unwrap();
        assert_eq!(summary.replaced == 1, replaced);
        let expected: &[u8] = if replaced { b"new" } else { b"old" };
        assert_eq!(destination.contents("f").await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_replace_tolerance() {
        let (destination, source) = scenario();
        let options = SyncOptions::default().with_tolerance(Duration::seconds(100));
        let summary = run(&destination, &source, CopyPolicy::REPLACE, options).await.unwrap();
        assert_eq!(summary, Summary::default());
        assert_eq!(destination.contents("b").await.unwrap(), b"dst-b");
    }

    #[tokio::test]
    async fn test_delete_only() {
        let (destination, source) = scenario();
        let summary = run(&destination, &source, CopyPolicy::DELETE, SyncOptions::default()).await.unwrap();
        assert_eq!(summary.deleted, 1);
        assert_eq!(destination.paths().await, ["b"]);
        assert_eq!(source.calls(Operation::Get), 0);
    }

    #[tokio::test]
    async fn test_root_limits_scope() {
        let destination = Arc::new(MockBackend::default().with_file("keep/x", "x", at(1)).with_file("sub/old", "o", at(1)));
        let source = Arc::new(MockBackend::default().with_file("sub/new", "n", at(1)).with_file("other/y", "y", at(1)));
        let summary = copy(&handle(&destination), &handle(&source), Some("sub"), CopyPolicy::ALL, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(
            summary,
            Summary {
                created: 1,
                replaced: 0,
                deleted: 1
            }
        );
        assert_eq!(destination.paths().await, ["keep/x", "sub/new"]);
    }

    #[rstest]
    #[case("")]
    #[case("/")]
    #[tokio::test]
    async fn test_empty_root_copies_whole_hub(#[case] root: &str) {
        let (destination, source) = scenario();
        let summary = copy(&handle(&destination), &handle(&source), Some(root), CopyPolicy::ALL, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.total(), 3);
        assert_eq!(destination.paths().await, ["b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_get_does_not_stop_other_creates() {
        let destination = Arc::new(MockBackend::default());
        let source = Arc::new(
            MockBackend::default()
                .with_file("x", "x", at(1))
                .with_file("y", "y", at(1))
                .fail_on(Operation::Get, Some("x")),
        );
        let err = run(&destination, &source, CopyPolicy::CREATE, SyncOptions::default()).await.unwrap_err();
        let ErrorKind::Aggregate(failures) = &*err else {
            panic!("expected aggregate error, got {err:?}");
        };
        assert_eq!(failures.len(), 1);
        let failure = failures.iter().next().unwrap();
        assert_eq!(failure.action, Action::Create("x".to_string()));
        assert_eq!(destination.paths().await, ["y"]);
    }

    #[tokio::test]
    async fn test_failures_span_phases() {
        let (destination, source) = scenario();
        let destination = Arc::new(
            Arc::into_inner(destination)
                .unwrap()
                .fail_on(Operation::Put, Some("c"))
                .fail_on(Operation::Delete, Some("a")),
        );
        let err = run(&destination, &source, CopyPolicy::ALL, SyncOptions::default()).await.unwrap_err();
        let ErrorKind::Aggregate(failures) = &*err else {
            panic!("expected aggregate error, got {err:?}");
        };
        let failed: HashSet<Action> = failures.iter().map(|f| f.action.clone()).collect();
        assert_eq!(
            failed,
            HashSet::from([Action::Create("c".to_string()), Action::Delete("a".to_string())])
        );
        // The replace in between still ran.
        assert_eq!(destination.contents("b").await.unwrap(), b"src-b");
        let message = failures.to_string();
        assert!(message.contains("create `c`"));
        assert!(message.contains("delete `a`"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let (destination, source) = scenario();
        let source = Arc::new(Arc::into_inner(source).unwrap().fail_on(Operation::List, None));
        let err = run(&destination, &source, CopyPolicy::ALL, SyncOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Listing(hub) if hub == "src"));
        assert_eq!(source.calls(Operation::Get), 0);
        assert_eq!(destination.calls(Operation::Put) + destination.calls(Operation::Delete), 0);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(16)]
    #[tokio::test]
    async fn test_concurrency_does_not_change_outcome(#[case] concurrency: usize) {
        let mut destination = MockBackend::default().with_name("dst");
        let mut source = MockBackend::default().with_name("src");
        for i in 0..20_i64 {
            let path = format!("dir/{i:02}");
            if i % 3 != 0 {
                source = source.with_file(&path, format!("src-{i}"), at(200 + i));
            }
            if i % 2 == 0 {
                destination = destination.with_file(&path, format!("dst-{i}"), at(200));
            }
        }
        let (destination, source) = (Arc::new(destination), Arc::new(source));
        let options = SyncOptions::default().with_concurrency(NonZeroUsize::new(concurrency).unwrap());
        run(&destination, &source, CopyPolicy::ALL, options).await.unwrap();

        let expected: Vec<String> = (0..20).filter(|i| i % 3 != 0).map(|i| format!("dir/{i:02}")).collect();
        assert_eq!(destination.paths().await, expected);
        for i in (0..20).filter(|i| i % 3 != 0) {
            let path = format!("dir/{i:02}");
            // Equal timestamps (i == 0) never reach here: 0 % 3 == 0.
            assert_eq!(destination.contents(&path).await.unwrap(), format!("src-{i}").into_bytes());
        }
    }

    #[tokio::test]
    async fn test_event_order() {
        let (destination, source) = scenario();
        let (destination, source) = (handle(&destination), handle(&source));
        let events: Vec<SyncEvent> = sync(&destination, &source, None, CopyPolicy::ALL, SyncOptions::sequential())
            .map(|event| event.unwrap())
            .collect()
            .await;
        let labels: Vec<String> = events
            .iter()
            .map(|event| match event {
                SyncEvent::Started => "started".to_string(),
                SyncEvent::Planned { create, replace, delete } => format!("planned {create}/{replace}/{delete}"),
                SyncEvent::Applied(action) => action.to_string(),
                SyncEvent::Failed(failure) => format!("failed {failure}"),
                SyncEvent::Complete => "complete".to_string(),
            })
            .collect();
        assert_eq!(
            labels,
            ["started", "planned 1/1/1", "create `c`", "replace `b`", "delete `a`", "complete"]
        );
    }

    #[tokio::test]
    async fn test_content_type_is_carried_over() {
        let source = Arc::new(MockBackend::default());
        source.put("page.bin", b"<p>", "text/html").await.unwrap();
        let destination = Arc::new(MockBackend::default());
        run(&destination, &source, CopyPolicy::CREATE, SyncOptions::default()).await.unwrap();
        assert_eq!(destination.get("page.bin").await.unwrap().content_type, "text/html");
    }

    #[tokio::test]
    async fn test_read_only_destination_is_a_dry_run() {
        let (destination, source) = scenario();
        let dry: HubHandle = Arc::new(ReadOnlyBackend::new(handle(&destination)));
        let summary = copy(&dry, &handle(&source), None, CopyPolicy::ALL, SyncOptions::default()).await.unwrap();
        assert_eq!(summary.total(), 3);
        assert_eq!(destination.paths().await, ["a", "b"]);
        assert_eq!(destination.contents("b").await.unwrap(), b"dst-b");
    }
}
