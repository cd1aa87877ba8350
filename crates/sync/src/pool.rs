use async_stream::stream;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroUsize;

/// Drive `futures` with at most `limit` of them in flight at once.
///
/// Outputs are yielded in completion order. Waiting futures are started in
/// the order given, one for each future that completes.
pub fn bounded<'a, F>(futures: Vec<F>, limit: NonZeroUsize) -> impl Stream<Item = F::Output> + 'a
where
    F: Future + 'a,
    F::Output: 'a,
{
    let mut waiting: VecDeque<F> = futures.into();
    stream! {
        let mut running = FuturesUnordered::new();
        while running.len() < limit.get() {
            let Some(next) = waiting.pop_front() else { break };
            running.push(next);
        }
        while let Some(output) = running.next().await {
            if let Some(next) = waiting.pop_front() {
                running.push(next);
            }
            yield output;
        }
    }
}
