// Registry of live streaming sessions

use crate::transport::{SessionId, SseTransport, TransportEvent};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// Session storage abstraction
pub trait SessionRegistry: Send + Sync {
    /// Track a newly opened transport under its own session id
    fn insert(&self, transport: Arc<SseTransport>);

    /// Look up a live transport
    fn get(&self, session_id: &SessionId) -> Option<Arc<SseTransport>>;

    /// Drop a transport from the registry without closing it
    fn remove(&self, session_id: &SessionId) -> Option<Arc<SseTransport>>;

    /// Server-initiated close. Returns false for unknown sessions.
    fn close(&self, session_id: &SessionId) -> bool;

    /// Number of live sessions
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Close a session's transport and forget it. Only the first call for a
/// given transport does anything, whichever side initiated the close.
pub fn teardown(registry: &dyn SessionRegistry, transport: &SseTransport) -> bool {
    if !transport.begin_teardown() {
        return false;
    }

    if let Err(e) = transport.close() {
        tracing::debug!(session_id = %transport.session_id(), "Ignoring close error: {}", e);
    }
    registry.remove(transport.session_id());

    tracing::info!(
        session_id = %transport.session_id(),
        live_sessions = registry.len(),
        "Session closed"
    );
    true
}

/// In-memory session registry
#[derive(Default)]
pub struct InMemorySessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SseTransport>>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRegistry for InMemorySessionRegistry {
    fn insert(&self, transport: Arc<SseTransport>) {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(transport.session_id().clone(), transport);
    }

    fn get(&self, session_id: &SessionId) -> Option<Arc<SseTransport>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(session_id)
            .cloned()
    }

    fn remove(&self, session_id: &SessionId) -> Option<Arc<SseTransport>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(session_id)
    }

    fn close(&self, session_id: &SessionId) -> bool {
        match self.get(session_id) {
            Some(transport) => {
                teardown(self, &transport);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Tears the session down when the streaming connection goes away.
///
/// Owned by the response stream, so it drops when the agent disconnects or
/// when the stream ends after a server-side close.
pub struct SessionGuard {
    transport: Arc<SseTransport>,
    registry: Arc<dyn SessionRegistry>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        teardown(self.registry.as_ref(), &self.transport);
    }
}

/// A registered session, ready to be streamed
pub struct OpenSession {
    pub transport: Arc<SseTransport>,
    pub events: mpsc::Receiver<TransportEvent>,
    pub guard: SessionGuard,
}

/// Allocate a transport bound to `message_path` and register it
pub fn open_session(registry: Arc<dyn SessionRegistry>, message_path: &str) -> OpenSession {
    let (transport, events) = SseTransport::open(message_path);
    registry.insert(transport.clone());

    tracing::info!(
        session_id = %transport.session_id(),
        live_sessions = registry.len(),
        "Session opened"
    );

    OpenSession {
        transport: transport.clone(),
        events,
        guard: SessionGuard {
            transport,
            registry,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SessionState;

    fn registry() -> Arc<dyn SessionRegistry> {
        Arc::new(InMemorySessionRegistry::new())
    }

    #[test]
    fn test_open_registers_session() {
        let registry = registry();
        let session = open_session(registry.clone(), "/messages");

        let id = session.transport.session_id().clone();
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dropping_guard_removes_session() {
        let registry = registry();
        let OpenSession {
            transport, guard, ..
        } = open_session(registry.clone(), "/messages");
        let id = transport.session_id().clone();

        drop(guard);

        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
        assert_eq!(transport.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_server_close_ends_stream_and_teardown_runs_once() {
        let registry = registry();
        let OpenSession {
            transport,
            mut events,
            guard,
        } = open_session(registry.clone(), "/messages");
        let id = transport.session_id().clone();

        assert!(registry.close(&id));
        assert!(registry.get(&id).is_none());

        // Endpoint event is still buffered, then the stream ends
        assert_eq!(events.recv().await.unwrap().name(), "endpoint");
        assert!(events.recv().await.is_none());

        // The guard dropping afterwards finds nothing left to do
        assert!(!teardown(registry.as_ref(), &transport));
        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_unknown_session() {
        let registry = registry();
        assert!(!registry.close(&SessionId::new("missing")));
    }

    #[test]
    fn test_teardown_only_removes_its_own_session() {
        let registry = registry();
        let first = open_session(registry.clone(), "/messages");
        let second = open_session(registry.clone(), "/messages");
        let second_id = second.transport.session_id().clone();

        drop(first);

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&second_id).is_some());
    }
}
