//! Session → remote thread mapping.
//!
//! Each local session id is bound to exactly one agent-platform thread, created lazily on first use.
//! Bindings live in a moka cache bounded by entry count and idle time; concurrent first calls for
//! one session share a single creation.

use crate::agents::{AgentApi, AgentsError};
use crate::config::SessionsConfig;
use crate::relay::RelayError;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Unique session identifier (opaque string).
pub type SessionId = String;

/// Session → thread id bindings, bounded by capacity and idle TTL.
#[derive(Clone)]
pub struct MemoryThreadStore {
    cache: Cache<SessionId, String>,
}

impl MemoryThreadStore {
    pub fn new(capacity: u64, idle_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity.max(1))
            .time_to_idle(idle_ttl)
            .build();
        Self { cache }
    }

    pub fn from_config(config: &SessionsConfig) -> Self {
        Self::new(
            config.capacity as u64,
            Duration::from_secs(config.idle_ttl_secs),
        )
    }

    /// Thread bound to the session, if any (and not expired).
    pub async fn get(&self, session_id: &str) -> Option<String> {
        self.cache.get(session_id).await
    }

    /// Bind the session to a thread, replacing any previous binding.
    pub async fn insert(&self, session_id: &str, thread_id: String) {
        self.cache.insert(session_id.to_string(), thread_id).await;
    }

    /// Number of live bindings. Pending evictions and expiries are applied first.
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Resolves session ids to remote threads, creating at most one thread per session.
pub struct ThreadMapper {
    store: MemoryThreadStore,
    api: Arc<dyn AgentApi>,
}

impl ThreadMapper {
    pub fn new(store: MemoryThreadStore, api: Arc<dyn AgentApi>) -> Self {
        Self { store, api }
    }

    pub fn store(&self) -> &MemoryThreadStore {
        &self.store
    }

    /// Return the session's thread, creating it remotely on first use.
    /// Concurrent first calls for one session wait on the same creation; a failed creation is
    /// not cached, so the next call retries.
    pub async fn get_or_create_thread(&self, session_id: &str) -> Result<String, RelayError> {
        if session_id.is_empty() {
            return Err(RelayError::InvalidArgument("session id is required"));
        }
        self.store
            .cache
            .try_get_with_by_ref(session_id, self.create_thread(session_id))
            .await
            .map_err(RelayError::ThreadCreationFailed)
    }

    async fn create_thread(&self, session_id: &str) -> Result<String, AgentsError> {
        match self.api.create_thread().await {
            Ok(thread) => {
                log::info!("session {} bound to thread {}", session_id, thread.id);
                Ok(thread.id)
            }
            Err(e) => {
                log::error!("creating thread for session {} failed: {}", session_id, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Run, Thread, ThreadMessage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Only thread creation is exercised here.
    #[derive(Default)]
    struct CountingApi {
        created: AtomicUsize,
        fail: bool,
        stall: bool,
    }

    #[async_trait]
    impl AgentApi for CountingApi {
        async fn create_thread(&self) -> Result<Thread, AgentsError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            if self.stall && n == 0 {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail {
                return Err(AgentsError::Api("500 boom".to_string()));
            }
            Ok(Thread {
                id: format!("thread_{}", n),
            })
        }

        async fn create_message(&self, _: &str, _: &str, _: &str) -> Result<(), AgentsError> {
            unreachable!()
        }

        async fn create_run(&self, _: &str, _: &str) -> Result<Run, AgentsError> {
            unreachable!()
        }

        async fn get_run(&self, _: &str, _: &str) -> Result<Run, AgentsError> {
            unreachable!()
        }

        async fn list_messages(&self, _: &str) -> Result<Vec<ThreadMessage>, AgentsError> {
            unreachable!()
        }
    }

    fn mapper(api: Arc<CountingApi>) -> ThreadMapper {
        ThreadMapper::new(MemoryThreadStore::new(100, Duration::from_secs(3600)), api)
    }

    #[tokio::test]
    async fn creates_once_per_session() {
        let api = Arc::new(CountingApi::default());
        let mapper = mapper(api.clone());

        let first = mapper.get_or_create_thread("s1").await.unwrap();
        let again = mapper.get_or_create_thread("s1").await.unwrap();
        assert_eq!(first, again);
        assert_eq!(api.created.load(Ordering::SeqCst), 1);

        let other = mapper.get_or_create_thread("s2").await.unwrap();
        assert_ne!(first, other);
        assert_eq!(api.created.load(Ordering::SeqCst), 2);
        assert_eq!(mapper.store().len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_first_use_creates_one_thread() {
        let api = Arc::new(CountingApi::default());
        let mapper = Arc::new(mapper(api.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = mapper.clone();
                tokio::spawn(async move { m.get_or_create_thread("shared").await.unwrap() })
            })
            .collect();
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        assert_eq!(api.created.load(Ordering::SeqCst), 1);
        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(mapper.store().len().await, 1);
    }

    #[tokio::test]
    async fn failed_creation_leaves_session_unmapped() {
        let api = Arc::new(CountingApi {
            fail: true,
            ..Default::default()
        });
        let mapper = mapper(api.clone());

        let err = mapper.get_or_create_thread("s1").await.unwrap_err();
        assert!(matches!(err, RelayError::ThreadCreationFailed(_)));
        assert!(mapper.store().get("s1").await.is_none());

        let _ = mapper.get_or_create_thread("s1").await;
        assert_eq!(api.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn abandoned_creation_is_retried() {
        let api = Arc::new(CountingApi {
            stall: true,
            ..Default::default()
        });
        let mapper = mapper(api.clone());

        // First caller gives up while the platform hangs.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            mapper.get_or_create_thread("s1"),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(mapper.store().is_empty().await);

        let id = mapper.get_or_create_thread("s1").await.unwrap();
        assert_eq!(id, "thread_1");
        assert_eq!(mapper.store().len().await, 1);
    }

    #[tokio::test]
    async fn empty_session_is_rejected() {
        let api = Arc::new(CountingApi::default());
        let mapper = mapper(api.clone());
        assert!(matches!(
            mapper.get_or_create_thread("").await,
            Err(RelayError::InvalidArgument(_))
        ));
        assert_eq!(api.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn capacity_bounds_live_bindings() {
        let store = MemoryThreadStore::new(2, Duration::from_secs(3600));
        for s in ["a", "b", "c", "d", "e"] {
            store.insert(s, format!("t_{}", s)).await;
        }
        assert!(store.len().await <= 2);
    }

    #[tokio::test]
    async fn idle_entries_expire_and_are_not_counted() {
        let store = MemoryThreadStore::new(10, Duration::from_millis(100));
        store.insert("a", "t_a".to_string()).await;
        store.insert("b", "t_b".to_string()).await;
        assert_eq!(store.len().await, 2);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.len().await, 0);
        assert!(store.get("a").await.is_none());
    }
}
