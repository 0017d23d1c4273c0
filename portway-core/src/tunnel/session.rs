use crate::net::ConnHandle;
use bytes::Bytes;
use dashmap::DashMap;
use kanal::AsyncSender;
use portway_protocol::SessionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Live sessions keyed by their opaque id.
///
/// An id is present exactly while its connection is registered and not yet
/// torn down. `remove` hands the connection handle back to the caller, so
/// removal and teardown happen together from the event loop's point of view.
/// Lookups clone the write queue out of the map; no I/O ever happens under
/// the shard lock.
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    sessions: Arc<DashMap<SessionId, ConnHandle>>,
    next_id: Arc<AtomicU64>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh process-unique session id.
    pub fn allocate(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Register a session; returns the previous handle if the id was taken.
    pub fn insert(&self, id: SessionId, handle: ConnHandle) -> Option<ConnHandle> {
        self.sessions.insert(id, handle)
    }

    /// Remove a session, handing its connection back for teardown.
    pub fn remove(&self, id: SessionId) -> Option<ConnHandle> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Clone of the write queue for `id`, if the session is live.
    pub fn sender(&self, id: SessionId) -> Option<AsyncSender<Bytes>> {
        self.sessions.get(&id).map(|entry| entry.sender())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Take every session out of the table at once (tunnel-loss cascade).
    pub fn drain(&self) -> Vec<(SessionId, ConnHandle)> {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .collect()
    }
}
