//! Callbridge relay server.
//!
//! Reads the environment, sets up logging and the outbound clients, then
//! serves the REST glue and the `/media-stream` relay until Ctrl+C or SIGTERM.

use anyhow::Context;
use axum::{Router, http::Method};
use callbridge_api::{config::Config, router::create_router, state::AppState};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Resolves on the first shutdown signal the process receives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable.");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown requested; draining open connections.");
}

fn build_app(state: AppState) -> Router {
    // The trigger form may live on another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    create_router(Arc::new(state)).layer(cors)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let bind_address = config.bind_address;
    info!(
        server_url = %config.server_url,
        default_agent = config.default_agent_id.as_deref().unwrap_or("-"),
        outbound_calls = config.twilio.is_some(),
        "Configuration loaded."
    );

    let state = AppState::from_config(config).context("Failed to build outbound clients")?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!(%bind_address, "Relay listening.");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Relay stopped.");
    Ok(())
}
