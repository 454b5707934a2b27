//! rally-api — HTTP surface of the relay: the `/ws` client endpoint and a
//! read-only JSON status API.

pub mod handlers;

use std::net::SocketAddr;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/peers", get(handlers::handle_peers));

    Router::new()
        .route("/ws", get(handlers::handle_ws))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(cors)
}

/// Bind `addr` and serve until shutdown fires.
pub async fn serve(
    state: ApiState,
    addr: &str,
    shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve_listener(state, listener, shutdown).await
}

/// Serve on an already-bound listener. Tests bind port 0 and read the address back.
pub async fn serve_listener(
    state: ApiState,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "relay listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    })
    .await?;
    Ok(())
}
