//! Connection gateway — the single task that owns the registry and session table.
//!
//! Transport tasks never touch shared state. They submit [`GatewayCommand`]s
//! through a [`GatewayHandle`]; the gateway applies them one at a time in
//! arrival order. Per-session ordering follows from each session submitting
//! on the same queue, and a close is applied before anything queued after it,
//! so a closed session's address can never show up in a later snapshot.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};

use rally_core::config::GatewayConfig;
use rally_core::wire::{ClientEvent, ServerMessage, WireError};

use crate::broadcast::{send_to, BroadcastStats, Broadcaster};
use crate::peer::{Peer, PeerRegistry};
use crate::session::{Outbound, SessionId, SessionTable};

/// Input to the gateway task.
#[derive(Debug)]
pub enum GatewayCommand {
    /// A transport connection was accepted.
    Open {
        session: SessionId,
        remote: SocketAddr,
        outbound: Outbound,
    },
    /// A text frame arrived on a session.
    Frame { session: SessionId, payload: String },
    /// A frame the transport could not turn into text.
    Reject { session: SessionId, error: WireError },
    /// The transport connection closed.
    Close { session: SessionId },
    /// Read-only view of the current state.
    Status { reply: oneshot::Sender<GatewayStatus> },
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway task is not running")]
    Stopped,
}

/// Snapshot of gateway state for the status API.
#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub sessions: Vec<SessionInfo>,
    pub peers: Vec<Peer>,
    pub broadcast: BroadcastStats,
    pub uptime: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub remote: SocketAddr,
    pub bound: Option<String>,
    pub connected: Duration,
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Cloneable submission side of the gateway queue.
#[derive(Clone)]
pub struct GatewayHandle {
    tx: mpsc::Sender<GatewayCommand>,
    next_session: Arc<AtomicU64>,
}

impl GatewayHandle {
    /// Allocate a session id and register the connection with the gateway.
    pub async fn open(
        &self,
        remote: SocketAddr,
        outbound: Outbound,
    ) -> Result<SessionId, GatewayError> {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.submit(GatewayCommand::Open {
            session,
            remote,
            outbound,
        })
        .await?;
        Ok(session)
    }

    pub async fn frame(&self, session: SessionId, payload: String) -> Result<(), GatewayError> {
        self.submit(GatewayCommand::Frame { session, payload }).await
    }

    /// Queue an error reply behind any frames already submitted by `session`.
    pub async fn reject(&self, session: SessionId, error: WireError) -> Result<(), GatewayError> {
        self.submit(GatewayCommand::Reject { session, error }).await
    }

    pub async fn close(&self, session: SessionId) -> Result<(), GatewayError> {
        self.submit(GatewayCommand::Close { session }).await
    }

    pub async fn status(&self) -> Result<GatewayStatus, GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.submit(GatewayCommand::Status { reply }).await?;
        rx.await.map_err(|_| GatewayError::Stopped)
    }

    async fn submit(&self, cmd: GatewayCommand) -> Result<(), GatewayError> {
        self.tx.send(cmd).await.map_err(|_| GatewayError::Stopped)
    }
}

// ── Gateway ──────────────────────────────────────────────────────────────────

pub struct Gateway {
    config: GatewayConfig,
    registry: PeerRegistry,
    sessions: SessionTable,
    broadcaster: Broadcaster,
    started_at: Instant,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            registry: PeerRegistry::new(),
            sessions: SessionTable::new(),
            broadcaster: Broadcaster::new(),
            started_at: Instant::now(),
        }
    }

    /// Create the command queue. The receiver goes to [`Gateway::run`].
    pub fn channel(&self) -> (GatewayHandle, mpsc::Receiver<GatewayCommand>) {
        let (tx, rx) = mpsc::channel(self.config.event_queue_depth.max(1));
        let handle = GatewayHandle {
            tx,
            next_session: Arc::new(AtomicU64::new(1)),
        };
        (handle, rx)
    }

    /// Process commands until every handle is dropped or shutdown fires.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<GatewayCommand>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(
            announce_changes = self.config.announce_changes,
            "gateway starting"
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(
                        sessions = self.sessions.len(),
                        peers = self.registry.len(),
                        "gateway shutting down"
                    );
                    return;
                }

                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => {
                        tracing::info!("all gateway handles dropped, exiting");
                        return;
                    }
                }
            }
        }
    }

    /// Apply one command. Never fails: every error is contained to its session.
    pub fn handle(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::Open {
                session,
                remote,
                outbound,
            } => {
                if self.sessions.open(session, remote, outbound) {
                    tracing::info!(session, %remote, "session opened");
                } else {
                    tracing::warn!(session, "duplicate session id, ignoring open");
                }
            }
            GatewayCommand::Frame { session, payload } => self.on_frame(session, &payload),
            GatewayCommand::Reject { session, error } => self.reject(session, &error),
            GatewayCommand::Close { session } => self.on_close(session),
            GatewayCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn on_frame(&mut self, session: SessionId, payload: &str) {
        if self.sessions.get(session).is_none() {
            tracing::warn!(session, "frame for unknown session, dropping");
            return;
        }
        match ClientEvent::decode(payload, self.config.max_address_len) {
            Ok(event) => self.apply(session, event),
            Err(e) => self.reject(session, &e),
        }
    }

    /// Drive the registry from a validated event.
    pub fn apply(&mut self, session: SessionId, event: ClientEvent) {
        match event {
            ClientEvent::Register { address } => {
                let reg = self.registry.register(&address);
                self.sessions.bind(session, &address);
                tracing::info!(session, address = %address, new = reg.inserted, "peer registered");
                if reg.inserted {
                    self.announce(ServerMessage::PeerJoined { address });
                }
            }
            ClientEvent::Deregister { address } => {
                let removed = self.registry.deregister(&address);
                self.sessions.unbind_address(&address);
                tracing::info!(session, address = %address, removed, "peer deregistered");
                if removed {
                    self.announce(ServerMessage::PeerLeft { address });
                }
            }
            ClientEvent::ListRequest { tag } => {
                let snapshot = self.registry.snapshot();
                let report = self
                    .broadcaster
                    .broadcast_peers(&self.sessions, &tag, &snapshot);
                tracing::info!(
                    session,
                    tag = %tag,
                    peers = snapshot.len(),
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "peer list broadcast"
                );
            }
        }
    }

    /// Report a malformed event to its sender only. Registry is untouched.
    pub fn reject(&mut self, session: SessionId, err: &WireError) {
        tracing::debug!(session, error = %err, "rejecting malformed event");
        if let Some(s) = self.sessions.get(session) {
            send_to(session, &s.outbound, &ServerMessage::rejection(err));
        }
    }

    fn on_close(&mut self, session: SessionId) {
        let Some(closed) = self.sessions.close(session) else {
            tracing::debug!(session, "close for unknown session");
            return;
        };
        tracing::info!(
            session,
            remote = %closed.remote,
            connected_secs = closed.connected_at.elapsed().as_secs(),
            "session closed"
        );

        if let Some(address) = closed.bound {
            if self.registry.deregister(&address) {
                tracing::info!(session, address = %address, "peer removed on disconnect");
                self.announce(ServerMessage::PeerLeft { address });
            }
        }
    }

    fn announce(&mut self, message: ServerMessage) {
        if self.config.announce_changes {
            self.broadcaster.broadcast(&self.sessions, &message);
        }
    }

    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            sessions: self
                .sessions
                .iter()
                .map(|s| SessionInfo {
                    id: s.id,
                    remote: s.remote,
                    bound: s.bound.clone(),
                    connected: s.connected_at.elapsed(),
                })
                .collect(),
            peers: self.registry.snapshot(),
            broadcast: self.broadcaster.stats(),
            uptime: self.started_at.elapsed(),
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }
}
