//! Broadcast channel — fans one outbound message out to every live session.
//!
//! The message is serialized once and the same frame is queued on each
//! session's outbound channel with `try_send`. A full or closed queue drops
//! the frame for that session only; nothing here ever awaits.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;

use rally_core::wire::ServerMessage;

use crate::peer::Peer;
use crate::session::{Frame, Outbound, SessionId, SessionTable};

/// Per-call delivery outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Session queue was full; the session is skipped for this message.
    pub dropped: usize,
    /// Session was already going away.
    pub closed: usize,
}

/// Cumulative counters, surfaced through the status API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub broadcasts: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub closed: u64,
}

#[derive(Debug, Default)]
pub struct Broadcaster {
    stats: BroadcastStats,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a peer list, paired with the requester's tag, to every live session.
    pub fn broadcast_peers(
        &mut self,
        sessions: &SessionTable,
        tag: &str,
        snapshot: &[Peer],
    ) -> DeliveryReport {
        let message = ServerMessage::Peers {
            tag: tag.to_string(),
            peers: snapshot.iter().map(|p| p.address.clone()).collect(),
        };
        self.broadcast(sessions, &message)
    }

    /// Serialize `message` once and queue it on every session live right now.
    pub fn broadcast(&mut self, sessions: &SessionTable, message: &ServerMessage) -> DeliveryReport {
        let frame = match encode(message) {
            Some(f) => f,
            None => return DeliveryReport::default(),
        };

        let mut report = DeliveryReport::default();
        for (id, outbound) in sessions.recipients() {
            match offer(id, outbound, frame.clone()) {
                Offer::Queued => report.delivered += 1,
                Offer::Full => report.dropped += 1,
                Offer::Closed => report.closed += 1,
            }
        }

        self.stats.broadcasts += 1;
        self.stats.delivered += report.delivered as u64;
        self.stats.dropped += report.dropped as u64;
        self.stats.closed += report.closed as u64;

        tracing::debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            closed = report.closed,
            "broadcast sent"
        );
        report
    }

    pub fn stats(&self) -> BroadcastStats {
        self.stats
    }
}

/// Queue `message` on a single session. Used for error replies.
pub fn send_to(id: SessionId, outbound: &Outbound, message: &ServerMessage) -> bool {
    match encode(message) {
        Some(frame) => matches!(offer(id, outbound, frame), Offer::Queued),
        None => false,
    }
}

enum Offer {
    Queued,
    Full,
    Closed,
}

fn offer(id: SessionId, outbound: &Outbound, frame: Frame) -> Offer {
    match outbound.try_send(frame) {
        Ok(()) => Offer::Queued,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(session = id, "outbound queue full, dropping frame for session");
            Offer::Full
        }
        Err(TrySendError::Closed(_)) => {
            tracing::trace!(session = id, "session already closed, skipping");
            Offer::Closed
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Frame> {
    match message.encode() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode outbound message");
            None
        }
    }
}
