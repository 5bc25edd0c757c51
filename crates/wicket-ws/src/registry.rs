//! Thread-safe registry of live WebSocket sessions.
//!
//! The registry tracks send-only handles to every open session so the host
//! application can enumerate or broadcast to them. Reads take a snapshot;
//! nothing holds the lock while messages are sent.

use std::sync::{Mutex, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::session::{SessionHandle, SessionId};
use crate::upgrade::ServerIo;

/// A registry of currently-open WebSocket sessions.
///
/// Sessions add themselves when accepted and remove themselves through their
/// close callback. All operations lock briefly; [`snapshot`](Self::snapshot)
/// clones the handle list so callers iterate without blocking new sessions.
#[derive(Debug)]
pub struct SessionRegistry<S = ServerIo> {
    sessions: Mutex<Vec<SessionHandle<S>>>,
}

impl<S> SessionRegistry<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Register a session handle.
    ///
    /// A handle with an already-registered ID is rejected and logged; session
    /// IDs are unique, so a duplicate indicates a double registration.
    pub fn add(&self, handle: SessionHandle<S>) {
        let mut sessions = self.lock();
        if sessions.iter().any(|s| s.id() == handle.id()) {
            warn!(session_id = %handle.id(), "session already registered, ignoring");
            return;
        }
        debug!(session_id = %handle.id(), path = handle.path(), "session registered");
        sessions.push(handle);
    }

    /// Remove a session by ID.
    ///
    /// Returns the removed handle, or `None` if the ID is not registered.
    pub fn remove(&self, id: SessionId) -> Option<SessionHandle<S>> {
        let mut sessions = self.lock();
        let index = sessions.iter().position(|s| s.id() == id)?;
        debug!(session_id = %id, "session removed");
        // Registration order is part of the snapshot contract.
        Some(sessions.remove(index))
    }

    /// Get a snapshot of all currently-registered session handles.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionHandle<S>> {
        self.lock().clone()
    }

    /// Get the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SessionHandle<S>>> {
        // A poisoned lock only means another thread panicked mid-operation;
        // the Vec itself is still valid.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Default for SessionRegistry<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::upgrade::complete_upgrade;
    use std::sync::Arc;
    use tokio::io::DuplexStream;

    async fn make_session() -> (Session<DuplexStream>, DuplexStream) {
        let (server_io, client_io) = tokio::io::duplex(4096);
        let stream = complete_upgrade(server_io).await;
        (Session::new(stream, "/ws"), client_io)
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let registry = SessionRegistry::new();
        let (session, _io) = make_session().await;
        let id = session.id();

        registry.add(session.handle());
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());

        let removed = registry.remove(id);
        assert_eq!(removed.map(|h| h.id()), Some(id));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_add_duplicate_ignored() {
        let registry = SessionRegistry::new();
        let (session, _io) = make_session().await;

        registry.add(session.handle());
        registry.add(session.handle());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_id() {
        let registry: SessionRegistry<DuplexStream> = SessionRegistry::new();
        assert!(registry.remove(SessionId::new()).is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let registry = SessionRegistry::new();
        let (first, _a) = make_session().await;
        let (second, _b) = make_session().await;

        registry.add(first.handle());
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);

        registry.add(second.handle());
        // The earlier snapshot does not see later additions.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_preserves_registration_order() {
        let registry = SessionRegistry::new();
        let (first, _a) = make_session().await;
        let (second, _b) = make_session().await;
        let (third, _c) = make_session().await;

        registry.add(first.handle());
        registry.add(second.handle());
        registry.add(third.handle());

        registry.remove(second.id());
        let ids: Vec<_> = registry.snapshot().iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec![first.id(), third.id()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_remove() {
        let registry = Arc::new(SessionRegistry::new());
        let mut tasks = Vec::new();
        let mut ios = Vec::new();

        for _ in 0..16 {
            let (session, io) = make_session().await;
            ios.push(io);
            let registry = Arc::clone(&registry);
            let handle = session.handle();
            let id = session.id();
            tasks.push(tokio::spawn(async move {
                registry.add(handle);
                registry.remove(id);
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
