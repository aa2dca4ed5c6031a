use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// Lag-tolerant receive for the store's observer channels.
///
/// A slow intent or failure observer skips what it missed instead of erroring
/// out. For `watch::Receiver`, `next` waits for a change and returns the latest
/// snapshot.
pub trait ObserverExt<T> {
    /// Next item, or `None` once the store has stopped.
    fn next(&mut self) -> impl Future<Output = Option<Arc<T>>> + Send;
}

impl<T: Send + Sync + 'static> ObserverExt<T> for broadcast::Receiver<Arc<T>> {
    async fn next(&mut self) -> Option<Arc<T>> {
        let mut skipped = 0u64;

        loop {
            match self.recv().await {
                Ok(item) => {
                    if skipped > 0 {
                        warn!(
                            item = std::any::type_name::<T>(),
                            skipped, "Store observer lagged; continuing from the oldest retained item"
                        );
                    }
                    return Some(item);
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    skipped = skipped.saturating_add(n);
                    debug!(
                        item = std::any::type_name::<T>(),
                        skipped = n,
                        total_skipped = skipped,
                        "Store observer lagged"
                    );
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl<T: Send + Sync + 'static> ObserverExt<T> for watch::Receiver<Arc<T>> {
    async fn next(&mut self) -> Option<Arc<T>> {
        match self.changed().await {
            Ok(()) => Some(self.borrow_and_update().clone()),
            Err(_) => None,
        }
    }
}
