//! Session management — tracks live client connections and their bound address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

/// Identifier for one transport connection. Never reused within a process.
pub type SessionId = u64;

/// Pre-serialized outbound frame, shared across every session it is sent to.
pub type Frame = Arc<str>;

/// Sending half of a session's outbound queue. The transport drains the other end.
pub type Outbound = mpsc::Sender<Frame>;

/// Server-side state for one live connection.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub remote: SocketAddr,
    /// Address this session most recently registered, if still registered.
    pub bound: Option<String>,
    pub outbound: Outbound,
    pub connected_at: Instant,
}

/// The session table. Owned by the gateway task.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<SessionId, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly accepted connection. Returns false if the id is taken.
    pub fn open(&mut self, id: SessionId, remote: SocketAddr, outbound: Outbound) -> bool {
        if self.sessions.contains_key(&id) {
            return false;
        }
        self.sessions.insert(
            id,
            Session {
                id,
                remote,
                bound: None,
                outbound,
                connected_at: Instant::now(),
            },
        );
        true
    }

    /// Forget a connection. Returns the session so the caller can clean up its address.
    pub fn close(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Bind `address` to `id`, replacing any previous binding on that session.
    ///
    /// Any other session holding the same address loses it: the most recent
    /// registrant owns the address.
    pub fn bind(&mut self, id: SessionId, address: &str) {
        for session in self.sessions.values_mut() {
            if session.id != id && session.bound.as_deref() == Some(address) {
                session.bound = None;
            }
        }
        if let Some(session) = self.sessions.get_mut(&id) {
            session.bound = Some(address.to_string());
        }
    }

    /// Clear every binding to `address`.
    pub fn unbind_address(&mut self, address: &str) {
        for session in self.sessions.values_mut() {
            if session.bound.as_deref() == Some(address) {
                session.bound = None;
            }
        }
    }

    /// Outbound queues of every live session, paired with their ids.
    pub fn recipients(&self) -> impl Iterator<Item = (SessionId, &Outbound)> {
        self.sessions.values().map(|s| (s.id, &s.outbound))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn bound_count(&self) -> usize {
        self.sessions.values().filter(|s| s.bound.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
