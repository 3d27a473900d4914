//! Bounded per-object dispatch within one crawl phase.

use std::future::Future;

use futures::future;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Runs `fetch` for every key with at most `limit` calls in flight.
///
/// Uses `futures::stream::buffer_unordered` for controlled parallelism.
/// Once `token` is cancelled no further calls are started; calls already
/// in flight run to completion. Results are sorted by key.
pub(crate) async fn dispatch<K, T, F, Fut>(
    keys: Vec<K>,
    limit: usize,
    token: &CancellationToken,
    fetch: F,
) -> Vec<(K, Result<T>)>
where
    K: Clone + Ord,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let token = token.clone();
    let mut results: Vec<(K, Result<T>)> = stream::iter(keys)
        .take_while(move |_| future::ready(!token.is_cancelled()))
        .map(|key| {
            let retrieval = fetch(key.clone());
            async move { (key, retrieval.await) }
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrawlError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_respects_concurrency_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let results = dispatch((0..20).collect(), 3, &token, |key: u32| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, CrawlError>(key * 2)
            }
        })
        .await;

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        let keys: Vec<u32> = results.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (0..20).collect::<Vec<_>>());
        assert_eq!(*results[5].1.as_ref().unwrap(), 10);
    }

    #[tokio::test]
    async fn test_stops_issuing_after_cancellation() {
        let token = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));

        let results = dispatch((0..10).collect(), 1, &token, |key: u32| {
            let token = token.clone();
            let started = Arc::clone(&started);
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                if key == 2 {
                    token.cancel();
                }
                Ok::<_, CrawlError>(key)
            }
        })
        .await;

        assert_eq!(started.load(Ordering::SeqCst), 3);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }

    #[tokio::test]
    async fn test_already_cancelled_issues_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let results = dispatch(vec![1, 2, 3], 5, &token, |key: u32| async move {
            Ok::<_, CrawlError>(key)
        })
        .await;
        assert!(results.is_empty());
    }
}
