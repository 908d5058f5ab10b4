//! keyprop control plane
//!
//! Accepts API-key create, update, and revoke requests and propagates each
//! change to every gateway currently hosting the API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use keyprop_broadcast::{Broadcaster, CancellationToken};
use keyprop_control_plane::{
    api, audit::TracingAuditSink, config, registry::StaticRegistry, service::KeyPropagationService,
    state::AppState, transport,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to KEYPROP_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting keyprop control plane");
    info!(
        listen_addr = %config.listen_addr,
        transport = %config.transport,
        registry_file = %config.registry_file.display(),
        "Configuration loaded"
    );

    let registry = match StaticRegistry::load(&config.registry_file) {
        Ok(registry) => {
            info!(apis = registry.len(), "Registry loaded");
            Arc::new(registry)
        }
        Err(e) => {
            error!(error = %e, "Failed to load registry");
            return Err(e.into());
        }
    };

    let transport = transport::build_transport(
        config.transport,
        config.gateway_token.as_ref(),
        config.retry.clone(),
    )?;
    let transport_kind = transport.kind();

    let broadcaster = Broadcaster::new(
        transport,
        Arc::new(TracingAuditSink::new()),
        config.broadcast_config(),
    );
    let service = KeyPropagationService::new(registry.clone(), registry, broadcaster);

    // Cancelled on shutdown; in-flight broadcasts settle as cancelled.
    let shutdown = CancellationToken::new();
    let state = AppState::new(service, transport_kind, shutdown.clone());
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let mut server_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                    info!("HTTP server shutting down");
                })
                .await
        }
    });

    let exited = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        result = &mut server_handle => Some(result),
    };

    let result = match exited {
        Some(result) => result,
        None => {
            info!("Received shutdown signal");
            shutdown.cancel();

            // In-flight requests finish once their broadcasts settle.
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, server_handle).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("HTTP server did not shut down in time");
                    Ok(Ok(()))
                }
            }
        }
    };

    match result {
        Ok(Ok(())) => info!("Server exited normally"),
        Ok(Err(e)) => error!(error = %e, "Server error"),
        Err(e) => error!(error = %e, "Server task panicked"),
    }

    info!("Control plane shutdown complete");
    Ok(())
}
