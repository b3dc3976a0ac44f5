//! Opaque connection-id allocation and live session tracking.
//!
//! Ids are allocated once at registration and never reused. The format is
//! `{engine}-{seq}-{nonce}`: the engine prefix keeps ids human-readable in
//! logs, a process-wide atomic counter guarantees uniqueness within the
//! process even for same-instant registrations, and a random nonce guards
//! against collisions across broker restarts.
//!
//! Dispatch never parses the id; the engine is stored alongside the session.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::db::engine::EngineKind;
use crate::error::{BrokerError, BrokerResult};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh connection id for the given engine.
fn allocate_id(engine: EngineKind) -> String {
    let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", engine.id_prefix(), seq, &nonce[..12])
}

/// One tracked session: the engine recorded at connect time plus the client
/// handle behind a per-session mutex. Operations against the same id are
/// serialized by that mutex; different ids proceed concurrently.
struct Entry<C> {
    engine: EngineKind,
    client: Arc<Mutex<C>>,
}

/// Registry of live sessions keyed by opaque connection id.
///
/// Generic over the client handle so the lifecycle logic can be exercised
/// without a reachable database.
pub struct ConnectionRegistry<C> {
    entries: RwLock<HashMap<String, Entry<C>>>,
}

impl<C> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session and return its freshly allocated id.
    pub async fn register(&self, engine: EngineKind, client: C) -> String {
        let id = allocate_id(engine);
        let entry = Entry {
            engine,
            client: Arc::new(Mutex::new(client)),
        };
        self.entries.write().await.insert(id.clone(), entry);
        id
    }

    /// Look up a session by id, returning the engine and a handle to the
    /// serializing mutex.
    pub async fn lookup(&self, id: &str) -> BrokerResult<(EngineKind, Arc<Mutex<C>>)> {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .map(|e| (e.engine, Arc::clone(&e.client)))
            .ok_or_else(|| BrokerError::connection_not_found(id))
    }

    /// Remove a session, returning its client if the id was known.
    ///
    /// Removing an unknown id is not an error; close is idempotent at the
    /// broker level and the caller decides what to report.
    pub async fn remove(&self, id: &str) -> Option<Arc<Mutex<C>>> {
        self.entries.write().await.remove(id).map(|e| e.client)
    }

    /// Drain every tracked session, for shutdown teardown.
    pub async fn drain(&self) -> Vec<(String, Arc<Mutex<C>>)> {
        self.entries
            .write()
            .await
            .drain()
            .map(|(id, e)| (id, e.client))
            .collect()
    }

    /// Number of currently tracked sessions.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(EngineKind::MySql, 42u32).await;
        assert!(id.starts_with("mysql-"));

        let (engine, client) = registry.lookup(&id).await.unwrap();
        assert_eq!(engine, EngineKind::MySql);
        assert_eq!(*client.lock().await, 42);
    }

    #[tokio::test]
    async fn test_lookup_unknown_id() {
        let registry: ConnectionRegistry<u32> = ConnectionRegistry::new();
        let err = registry.lookup("postgres-9-deadbeef0000").await.unwrap_err();
        assert!(matches!(err, BrokerError::ConnectionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(EngineKind::Postgres, ()).await;
        assert!(registry.remove(&id).await.is_some());
        assert!(registry.remove(&id).await.is_none());
        assert!(registry.lookup(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_registration_unique_ids() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..64 {
            let reg = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                reg.register(EngineKind::MySql, ()).await
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            assert!(seen.insert(h.await.unwrap()));
        }
        assert_eq!(registry.len().await, 64);
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let registry = ConnectionRegistry::new();
        registry.register(EngineKind::MySql, 1u8).await;
        registry.register(EngineKind::Postgres, 2u8).await;
        let drained = registry.drain().await;
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty().await);
    }

    #[test]
    fn test_id_format() {
        let id = allocate_id(EngineKind::Postgres);
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "postgres");
        assert!(parts[1].parse::<u64>().is_ok());
        assert_eq!(parts[2].len(), 12);
    }
}
