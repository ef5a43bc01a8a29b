//! PKI API
//!
//! Entry point for the multi-issuer bearer-token service. Issuers are set up
//! before the listener is bound, so no request is ever served against a
//! partially built registry.

use anyhow::Context;
use pki_api::auth::{discovery, TokenVerifier};
use pki_api::config::Config;
use pki_api::observability::metrics::init_metrics_recorder;
use pki_api::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pki_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PKI API");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuers = config.issuers.len(),
        http_timeout_seconds = config.http_timeout.as_secs(),
        jwt_clock_skew_seconds = config.jwt_clock_skew.as_secs(),
        "Configuration loaded successfully"
    );

    if config.allow_insecure_issuers {
        warn!("AUTH_ALLOW_INSECURE_ISSUERS is set, http:// issuers are accepted");
    }

    let metrics_handle = init_metrics_recorder()
        .map_err(anyhow::Error::msg)
        .context("Failed to install metrics recorder")?;

    let client = discovery::http_client(config.http_timeout)
        .context("Failed to build HTTP client for issuer discovery")?;

    // Set up issuers before accepting traffic
    let pending = config.pending_issuers();
    info!(count = pending.len(), "Setting up issuers");
    let (registry, failures) = pending.setup(&client).await;

    for failure in &failures {
        error!(
            issuer = %failure.source.issuer(),
            error = %failure.error,
            "Issuer excluded from registry"
        );
    }

    if registry.is_empty() {
        warn!("No usable issuers, every bearer token will be rejected");
    } else {
        info!(
            issuers = registry.len(),
            failed = failures.len(),
            "Issuer registry ready"
        );
    }

    let verifier = Arc::new(TokenVerifier::new(
        Arc::new(registry),
        config.jwt_clock_skew,
    ));

    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    let state = Arc::new(AppState {
        config,
        verifier,
        failed_issuers: failures.len(),
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{bind_address}'"))?;

    info!("PKI API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_seconds))
    .await?;

    info!("PKI API shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    }
}
