//! HTTP handlers — the WebSocket bridge and the read-only status API.

pub mod status;
pub mod ws;

use axum::http::StatusCode;

use rally_services::{GatewayError, GatewayHandle};

#[derive(Clone)]
pub struct ApiState {
    pub gateway: GatewayHandle,
    /// Capacity of each session's outbound queue.
    pub outbound_queue_depth: usize,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn unavailable(e: GatewayError) -> (StatusCode, String) {
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
}

// Re-export handler functions for use in router setup.
pub use status::{handle_peers, handle_status};
pub use ws::handle_ws;
