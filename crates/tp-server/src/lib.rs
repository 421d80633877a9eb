//! tp-server: HTTP front end and download pipeline.
//!
//! This crate ties the other tp-* crates into a running server. It provides:
//!
//! - Axum-based HTTP API (`/stream-mp3`, `/health`) with request IDs and
//!   rate limiting
//! - The download pipeline: admission gate, stream relay, outcome reporter
//!   and response envelope
//! - Collaborator traits with default adapters (SQLite audit log, ip-api
//!   geolocation, YouTube URL validation)
//! - Graceful shutdown via signal handling; in-flight downloads are
//!   cancelled and their process trees killed

pub mod audit;
pub mod context;
pub mod error;
pub mod geo;
pub mod middleware;
pub mod pipeline;
pub mod router;
pub mod routes;
pub mod validate;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tp_core::config::Config;

use crate::audit::{AuditSink, SqliteAuditSink};
use crate::context::AppContext;
use crate::geo::{GeoResolver, IpApiResolver, NoopGeoResolver};

/// Start the tunepipe server.
///
/// Initializes the audit database, discovers yt-dlp, builds the
/// [`AppContext`] and serves HTTP until a shutdown signal arrives.
pub async fn start(config: Config) -> tp_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db = tp_db::pool::open_pool(&config.server.db_path)?;
    tracing::info!("Audit database ready at {}", config.server.db_path.display());

    let tools = tp_av::ToolRegistry::discover(&config.tools);
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let audit: Arc<dyn AuditSink> = Arc::new(SqliteAuditSink::new(db));
    let geo: Arc<dyn GeoResolver> = if config.geo.enabled {
        Arc::new(IpApiResolver::new(
            config.geo.endpoint.clone(),
            std::time::Duration::from_secs(config.geo.timeout_secs),
        )?)
    } else {
        Arc::new(NoopGeoResolver)
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| tp_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(config, tools, audit, geo);
    let shutdown = ctx.shutdown.clone();
    let app = router::build_router(ctx.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| tp_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!(
        capacity = ctx.gate.capacity(),
        timeout_secs = ctx.request_timeout.as_secs(),
        "Starting server on {addr}"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal(shutdown.clone()).await;
        // In-flight downloads see this through their deadlines.
        shutdown.cancel();
    })
    .await
    .map_err(|e| tp_core::Error::Internal(format!("Server error: {e}")))?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or for `cancel`.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
