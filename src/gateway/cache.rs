use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::{QueueBackend, QueueUrl};
use crate::errors::{BackendError, SqsConsumerError};

/// Process-lifetime map from queue name to resolved queue URL.
///
/// Entries are never evicted. Concurrent misses for the same name may each
/// call the backend; the last write wins and every writer stores the same URL.
#[derive(Debug, Default)]
pub struct QueueUrlCache {
    entries: RwLock<HashMap<String, QueueUrl>>,
}

impl QueueUrlCache {
    pub fn new() -> Self {
        QueueUrlCache::default()
    }

    pub async fn get(&self, queue_name: &str) -> Option<QueueUrl> {
        self.entries.read().await.get(queue_name).cloned()
    }

    pub async fn insert(&self, queue_name: &str, queue_url: QueueUrl) {
        self.entries
            .write()
            .await
            .insert(queue_name.to_string(), queue_url);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns the cached URL for `queue_name`, asking the backend on a miss.
    pub async fn resolve(
        &self,
        queue_name: &str,
        backend: &dyn QueueBackend,
    ) -> Result<QueueUrl, SqsConsumerError> {
        if queue_name.trim().is_empty() {
            return Err(SqsConsumerError::InvalidArgument(
                "queue name should not be blank".to_string(),
            ));
        }

        if let Some(url) = self.get(queue_name).await {
            return Ok(url);
        }

        let url = backend
            .get_queue_url(queue_name)
            .await
            .map_err(|err| match err {
                BackendError::QueueDoesNotExist => SqsConsumerError::QueueNotFound {
                    queue_name: queue_name.to_string(),
                },
                other => SqsConsumerError::backend(queue_name, "GetQueueUrl", other),
            })?;

        debug!(queue = queue_name, url = %url, "Resolved queue URL");
        self.insert(queue_name, url.clone()).await;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{InMemoryBackend, Operation};
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_resolve_hits_backend_once_per_name() {
        let backend = InMemoryBackend::default();
        backend.create_queue("orders", Map::new()).await.unwrap();
        let cache = QueueUrlCache::new();

        let first = cache.resolve("orders", &backend).await.unwrap();
        let second = cache.resolve("orders", &backend).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.calls(Operation::GetQueueUrl), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_blank_name_is_invalid_argument() {
        let backend = InMemoryBackend::default();
        let cache = QueueUrlCache::new();

        let err = cache.resolve("", &backend).await.unwrap_err();
        assert!(matches!(err, SqsConsumerError::InvalidArgument(_)));
        assert_eq!(backend.calls(Operation::GetQueueUrl), 0);
    }

    #[tokio::test]
    async fn test_missing_queue_is_not_cached() {
        let backend = InMemoryBackend::default();
        let cache = QueueUrlCache::new();

        let err = cache.resolve("orders", &backend).await.unwrap_err();
        assert!(matches!(err, SqsConsumerError::QueueNotFound { .. }));
        assert!(cache.is_empty().await);

        backend.create_queue("orders", Map::new()).await.unwrap();
        assert!(cache.resolve("orders", &backend).await.is_ok());
    }

    #[tokio::test]
    async fn test_transport_fault_is_backend_error() {
        let backend = InMemoryBackend::default();
        backend.fail_next(
            Operation::GetQueueUrl,
            BackendError::Transport("timed out".into()),
        );
        let cache = QueueUrlCache::new();

        let err = cache.resolve("orders", &backend).await.unwrap_err();
        assert!(matches!(
            err,
            SqsConsumerError::Backend {
                operation: "GetQueueUrl",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_misses_converge() {
        let backend = Arc::new(InMemoryBackend::default());
        backend.create_queue("orders", Map::new()).await.unwrap();
        let cache = Arc::new(QueueUrlCache::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let backend = Arc::clone(&backend);
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                cache.resolve("orders", backend.as_ref()).await
            }));
        }
        let urls: Vec<QueueUrl> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert!(urls.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(cache.len().await, 1);
        assert!(backend.calls(Operation::GetQueueUrl) >= 1);
    }
}
