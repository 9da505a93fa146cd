//! [`SessionManager`]: the live sessions of one peer, keyed by id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ---

use super::Session;

// ---

#[derive(Debug, Default)]
pub struct SessionManager {
    // ---
    sessions: Mutex<HashMap<u64, Arc<Session>>>,
}

// ---

impl SessionManager {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---

    pub fn add(&self, session: Arc<Session>) {
        // ---
        let id = session.id();
        if self.lock().insert(id, session).is_some() {
            tracing::warn!(session = id, "session added twice");
        }
    }

    // ---

    /// Drop `session` from the set. Returns `false` if it was not present.
    pub fn remove(&self, session: &Session) -> bool {
        self.lock().remove(&session.id()).is_some()
    }

    // ---

    pub fn get(&self, id: u64) -> Option<Arc<Session>> {
        self.lock().get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of the live sessions, in no particular order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.lock().values().cloned().collect()
    }

    // ---

    /// Ask every live session to close. Sessions leave the set as their
    /// close hooks run.
    pub fn close_all(&self) {
        // ---
        for ses in self.sessions() {
            ses.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use strand_link_sim::ScriptedStream;

    use super::*;
    use crate::{EventQueue, Peer, SessionState};

    #[tokio::test]
    async fn add_get_remove() {
        // ---
        let peer = Peer::new(EventQueue::spawn());
        let mgr = SessionManager::new();

        let a = Session::new(Arc::new(ScriptedStream::hanging(vec![])), Arc::clone(&peer));
        let b = Session::new(Arc::new(ScriptedStream::hanging(vec![])), Arc::clone(&peer));
        assert_ne!(a.id(), b.id());

        mgr.add(Arc::clone(&a));
        mgr.add(Arc::clone(&b));
        assert_eq!(mgr.count(), 2);
        assert_eq!(mgr.get(a.id()).map(|s| s.id()), Some(a.id()));

        assert!(mgr.remove(&a));
        assert!(!mgr.remove(&a), "second remove is a no-op");
        assert!(mgr.get(a.id()).is_none());
        assert_eq!(mgr.sessions().len(), 1);

        mgr.close_all();
        assert_eq!(b.state(), SessionState::Closing);
        assert!(b.outbound().is_closed());
    }
}
