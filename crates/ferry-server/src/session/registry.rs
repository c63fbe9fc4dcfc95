//! Session id → session map.
//!
//! The registry exclusively owns the mapping; per-session state is never
//! touched under the map lock, so map mutation cannot block message
//! delivery. Entries are created by receive-path requests bearing an
//! unseen id and removed by the reap sweep (or explicit eviction).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ferry_core::ids::SessionId;
use tokio::sync::RwLock;
use tracing::debug;

use super::Session;

/// Owns every live session, keyed by id.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    /// Atomic counter tracking live sessions (avoids read-locking for
    /// count queries).
    active_count: AtomicUsize,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Look up a session, creating it when the id is unseen.
    ///
    /// Returns the session and whether this call created it.
    pub async fn open_or_get(&self, id: &SessionId) -> (Arc<Session>, bool) {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                return (Arc::clone(session), false);
            }
        }
        let mut sessions = self.sessions.write().await;
        // Double-check after acquiring the write lock (another request
        // may have created the session).
        if let Some(session) = sessions.get(id) {
            return (Arc::clone(session), false);
        }
        let session = Arc::new(Session::new(id.clone()));
        let _ = sessions.insert(id.clone(), Arc::clone(&session));
        let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        debug!(session_id = %id, "session created");
        (session, true)
    }

    /// Look up an existing session. Send-path requests use this and
    /// never create.
    pub async fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).map(Arc::clone)
    }

    /// Remove a session from the map. Live `Arc` references (e.g. a
    /// still-draining receiver) stay valid; the id simply becomes
    /// unseen again.
    pub async fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id);
        if removed.is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            debug!(session_id = %id, "session reaped");
        }
        removed
    }

    /// Snapshot of every live session, for registry-wide sweeps.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions.values().map(Arc::clone).collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// True when no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
