//! rallyd — Rally peer rendezvous relay.

use anyhow::Result;

use rally_api::ApiState;
use rally_core::config::RallyConfig;
use rally_services::Gateway;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = RallyConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = RallyConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RallyConfig::default()
    });

    if let Some(arg) = std::env::args().nth(1) {
        match arg.parse() {
            Ok(port) => config.network.port = port,
            Err(_) => anyhow::bail!("expected a port number, got '{arg}'"),
        }
    }
    tracing::info!(
        listen = %config.listen_addr(),
        announce_changes = config.gateway.announce_changes,
        outbound_queue_depth = config.gateway.outbound_queue_depth,
        "rallyd starting"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let gateway = Gateway::new(config.gateway.clone());
    let (handle, commands) = gateway.channel();
    let gateway_task = tokio::spawn(gateway.run(commands, shutdown_tx.subscribe()));

    let state = ApiState {
        gateway: handle,
        outbound_queue_depth: config.gateway.outbound_queue_depth,
    };
    let listen = config.listen_addr();
    let server_task = {
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { rally_api::serve(state, &listen, shutdown).await })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = gateway_task       => tracing::error!("gateway exited: {:?}", r),
        r = server_task        => match r {
            Ok(Err(e)) => {
                tracing::error!(error = %e, "server failed");
                return Err(e);
            }
            other => tracing::error!("server exited: {:?}", other),
        },
    }

    Ok(())
}
