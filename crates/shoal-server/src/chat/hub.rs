//! In-process session registry with targeted emit and broadcast.
//!
//! The hub knows nothing about the directory or the bus — it is a plain
//! `session_id → Session` map behind a readers/writer lock. The lock is
//! held for map mutation or snapshot only, never across a dispatch, so a
//! slow session can never stall registration.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::envelope::Envelope;
use super::session::Session;

pub struct SessionHub {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        SessionHub { sessions: RwLock::new(HashMap::new()) }
    }

    /// Insert a session under its id.
    pub async fn register(&self, session: Arc<Session>) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    /// Remove a session by id. Idempotent on missing keys.
    pub async fn deregister(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    /// Dispatch an envelope to one session's outbound queue. Returns
    /// whether the session was present. The read lock is released before
    /// dispatching.
    pub async fn emit(&self, session_id: &str, envelope: Envelope) -> bool {
        let session = { self.sessions.read().await.get(session_id).cloned() };
        match session {
            Some(session) => session.emit(envelope),
            None => false,
        }
    }

    /// Queue a close frame with a policy code on one session. Returns
    /// whether the session was present.
    pub async fn emit_close(&self, session_id: &str, code: u16, reason: &str) -> bool {
        let session = { self.sessions.read().await.get(session_id).cloned() };
        match session {
            Some(session) => session.emit_close(code, reason),
            None => false,
        }
    }

    /// Dispatch an envelope to every session. Returns `(total, sent)` —
    /// how many sessions were registered and how many accepted the message.
    /// The session set is snapshotted under the lock, then dispatched
    /// outside it.
    pub async fn broadcast(&self, envelope: &Envelope) -> (usize, usize) {
        let snapshot: Vec<Arc<Session>> =
            { self.sessions.read().await.values().cloned().collect() };
        let total = snapshot.len();
        let mut sent = 0;
        for session in snapshot {
            if session.emit(envelope.clone()) {
                sent += 1;
            }
        }
        (total, sent)
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Shutdown sweep: drain the map and close every session, waiting for
    /// each to drain its reader and writer.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Session>> =
            { self.sessions.write().await.drain().map(|(_, s)| s).collect() };
        for session in drained {
            session.close().await;
        }
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::session::Outbound;

    #[tokio::test]
    async fn register_and_emit() {
        let hub = SessionHub::new();
        let (session, mut outbound) = Session::stub("john");
        let sid = session.id.clone();
        hub.register(session).await;

        assert!(hub.emit(&sid, Envelope::text("alice", "john", "hi")).await);
        let item = outbound.recv().await.unwrap();
        assert!(matches!(item, Outbound::Envelope(e) if e.text.as_deref() == Some("hi")));
    }

    #[tokio::test]
    async fn emit_to_unknown_session_is_a_no_op() {
        let hub = SessionHub::new();
        assert!(!hub.emit("no-such-session", Envelope::text("a", "b", "x")).await);
    }

    #[tokio::test]
    async fn deregister_is_idempotent() {
        let hub = SessionHub::new();
        let (session, _outbound) = Session::stub("john");
        let sid = session.id.clone();
        hub.register(session).await;

        hub.deregister(&sid).await;
        hub.deregister(&sid).await;
        assert!(hub.is_empty().await);
    }

    #[tokio::test]
    async fn register_deregister_pairs_leave_hub_empty() {
        let hub = SessionHub::new();
        let (s1, _o1) = Session::stub("john");
        let (s2, _o2) = Session::stub("alice");
        let (id1, id2) = (s1.id.clone(), s2.id.clone());

        hub.register(s1).await;
        hub.register(s2).await;
        assert_eq!(hub.len().await, 2);

        hub.deregister(&id2).await;
        hub.deregister(&id1).await;
        assert!(hub.is_empty().await);
    }

    #[tokio::test]
    async fn broadcast_counts_total_and_sent() {
        let hub = SessionHub::new();
        let (s1, mut o1) = Session::stub("john");
        let (s2, _o2) = Session::stub("alice");
        s2.close().await; // refuses emits
        hub.register(s1).await;
        hub.register(s2).await;

        let (total, sent) = hub.broadcast(&Envelope::text("x", "y", "all")).await;
        assert_eq!(total, 2);
        assert_eq!(sent, 1);
        assert!(o1.recv().await.is_some());
    }

    #[tokio::test]
    async fn emit_close_reaches_session() {
        let hub = SessionHub::new();
        let (session, mut outbound) = Session::stub("john");
        let sid = session.id.clone();
        hub.register(session).await;

        assert!(hub.emit_close(&sid, 1011, "boom").await);
        let item = outbound.recv().await.unwrap();
        assert_eq!(item, Outbound::Close { code: 1011, reason: "boom".into() });
    }

    #[tokio::test]
    async fn close_all_empties_and_closes() {
        let hub = SessionHub::new();
        let (s1, _o1) = Session::stub("john");
        let s1_handle = s1.clone();
        hub.register(s1).await;

        hub.close_all().await;
        assert!(hub.is_empty().await);
        assert!(s1_handle.is_closed());
    }
}
