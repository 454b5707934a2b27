//! Rally integration test harness.
//!
//! Each test starts its own relay in-process on 127.0.0.1:0 and talks to it
//! with real WebSocket clients, so tests never share state or ports.
//!
//!   cargo test --test integration

mod failures;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use rally_api::ApiState;
use rally_core::config::GatewayConfig;
use rally_core::wire::{ClientEvent, ServerMessage};
use rally_services::{Gateway, GatewayHandle};

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long a client waits for a frame before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A relay running inside the test process.
pub struct Relay {
    pub addr: SocketAddr,
    pub gateway: GatewayHandle,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Relay {
    pub async fn start() -> Result<Self> {
        Self::start_with(GatewayConfig::default()).await
    }

    pub async fn start_with(config: GatewayConfig) -> Result<Self> {
        let (shutdown, _) = broadcast::channel(1);

        let outbound_queue_depth = config.outbound_queue_depth;
        let gateway = Gateway::new(config);
        let (handle, commands) = gateway.channel();
        let gateway_task = tokio::spawn(gateway.run(commands, shutdown.subscribe()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind test listener")?;
        let addr = listener.local_addr()?;
        let state = ApiState {
            gateway: handle.clone(),
            outbound_queue_depth,
        };
        let server_shutdown = shutdown.subscribe();
        let server_task = tokio::spawn(async move {
            if let Err(e) = rally_api::serve_listener(state, listener, server_shutdown).await {
                eprintln!("relay server failed: {e:#}");
            }
        });

        Ok(Self {
            addr,
            gateway: handle,
            shutdown,
            tasks: vec![gateway_task, server_task],
        })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn session_count(&self) -> Result<usize> {
        Ok(self.gateway.status().await?.sessions.len())
    }

    pub async fn peer_addresses(&self) -> Result<Vec<String>> {
        let status = self.gateway.status().await?;
        Ok(status.peers.into_iter().map(|p| p.address).collect())
    }

    /// Block until the gateway has applied exactly `n` live sessions.
    pub async fn wait_for_sessions(&self, n: usize) -> Result<()> {
        let start = Instant::now();
        while start.elapsed() < RECV_TIMEOUT {
            if self.session_count().await? == n {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bail!("expected {n} sessions within {RECV_TIMEOUT:?}")
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        for task in self.tasks {
            let _ = tokio::time::timeout(RECV_TIMEOUT, task).await;
        }
    }
}

/// A WebSocket client speaking the relay protocol.
pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    pub async fn connect(relay: &Relay) -> Result<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(relay.ws_url())
            .await
            .context("websocket connect")?;
        Ok(Self { ws })
    }

    pub async fn send(&mut self, event: &ClientEvent) -> Result<()> {
        self.send_raw(&event.encode()?).await
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.ws.send(Message::Text(text.to_string().into())).await?;
        Ok(())
    }

    pub async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.ws.send(Message::Binary(bytes.into())).await?;
        Ok(())
    }

    pub async fn register(&mut self, address: &str) -> Result<()> {
        self.send(&ClientEvent::Register {
            address: address.to_string(),
        })
        .await
    }

    pub async fn deregister(&mut self, address: &str) -> Result<()> {
        self.send(&ClientEvent::Deregister {
            address: address.to_string(),
        })
        .await
    }

    pub async fn list_request(&mut self, tag: &str) -> Result<()> {
        self.send(&ClientEvent::ListRequest {
            tag: tag.to_string(),
        })
        .await
    }

    /// Next text frame from the relay, decoded.
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for frame")?
                .context("connection ended")??;
            if msg.is_text() {
                return Ok(ServerMessage::decode(msg.to_text()?)?);
            }
        }
    }

    /// Next frame, which must be a peer list. Returns (tag, sorted peers).
    pub async fn recv_peers(&mut self) -> Result<(String, Vec<String>)> {
        match self.recv().await? {
            ServerMessage::Peers { tag, mut peers } => {
                peers.sort();
                Ok((tag, peers))
            }
            other => bail!("expected peers, got {other:?}"),
        }
    }

    /// True if nothing arrives within `wait`.
    pub async fn is_silent_for(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.ws.next()).await.is_err()
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// A client can connect and the gateway sees the session.
#[tokio::test]
async fn test_relay_accepts_connections() {
    let relay = Relay::start().await.unwrap();

    let client = Client::connect(&relay).await.unwrap();
    relay.wait_for_sessions(1).await.unwrap();

    client.close().await.unwrap();
    relay.wait_for_sessions(0).await.unwrap();

    relay.stop().await;
}
