use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};

use crate::cache::CacheStore;

use super::RepoResult;

/// Turn a cache query into a live stream.
///
/// The query runs once immediately and again after every cache change.
/// Versions that pile up while the consumer is busy collapse into a single
/// re-run, so a slow reader only ever sees the latest rows.
pub(crate) fn watch_cache<T, F>(cache: Arc<CacheStore>, query: F) -> BoxStream<'static, RepoResult<T>>
where
    T: Send + 'static,
    F: Fn(&CacheStore) -> RepoResult<T> + Send + Sync + 'static,
{
    let changes = cache.subscribe();
    stream::unfold(
        (cache, changes, query, true),
        |(cache, mut changes, query, first)| async move {
            if !first {
                // The sender lives as long as the cache we hold
                changes.changed().await.ok()?;
            }
            changes.borrow_and_update();
            let item = query(&cache);
            Some((item, (cache, changes, query, false)))
        },
    )
    .boxed()
}
