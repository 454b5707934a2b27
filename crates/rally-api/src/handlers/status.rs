//! /status and /peers handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::{unavailable, ApiState};

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub sessions: Vec<SessionInfo>,
    pub peers: usize,
    pub bound_sessions: usize,
    pub broadcasts: u64,
    pub deliveries_dropped: u64,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub session_id: u64,
    pub remote: String,
    pub address: Option<String>,
    pub connected_secs: u64,
}

pub async fn handle_status(
    State(state): State<ApiState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let status = state.gateway.status().await.map_err(unavailable)?;

    let bound_sessions = status.sessions.iter().filter(|s| s.bound.is_some()).count();
    let sessions = status
        .sessions
        .into_iter()
        .map(|s| SessionInfo {
            session_id: s.id,
            remote: s.remote.to_string(),
            address: s.bound,
            connected_secs: s.connected.as_secs(),
        })
        .collect();

    Ok(Json(StatusResponse {
        sessions,
        peers: status.peers.len(),
        bound_sessions,
        broadcasts: status.broadcast.broadcasts,
        deliveries_dropped: status.broadcast.dropped,
        uptime_secs: status.uptime.as_secs(),
    }))
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Serialize)]
pub struct PeerInfo {
    pub address: String,
    pub registered_at_unix: u64,
}

pub async fn handle_peers(
    State(state): State<ApiState>,
) -> Result<Json<PeersResponse>, (StatusCode, String)> {
    let status = state.gateway.status().await.map_err(unavailable)?;

    let peers = status
        .peers
        .iter()
        .map(|p| PeerInfo {
            address: p.address.clone(),
            registered_at_unix: p.registered_at_unix(),
        })
        .collect();

    Ok(Json(PeersResponse { peers }))
}
