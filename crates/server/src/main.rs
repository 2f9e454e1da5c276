use anyhow::Result;
use axum::serve;
use std::{net::SocketAddr, time::Duration};
use tokio::{signal, sync::broadcast};
use tollgate_core::{config::AppConfig, services::CredentialServices};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long background tasks get to stop once the listener has drained.
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the workspace crates log at `logging.level` and
/// everything else at `warn`.
fn init_logging(config: &AppConfig) {
    let default_directives = ["tollgate_core", "server", "cli", "tests"]
        .iter()
        .fold(String::from("warn"), |acc, target| format!("{acc},{target}={}", config.logging.level));
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json().with_current_span(true)).init(),
        _ => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;
    init_logging(&config);

    info!(
        bind_address = %config.server.bind_address,
        bind_port = config.server.bind_port,
        access_token_ttl_minutes = config.auth.access_token_ttl_minutes,
        refresh_token_max_age_days = config.auth.refresh_token_max_age_days,
        "Configuration loaded"
    );

    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!("Invalid bind address: {e}"))?;

    let services = CredentialServices::builder()
        .with_config(config)
        .build()
        .await
        .map_err(|e| anyhow::anyhow!("Service initialization failed: {e}"))?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let purge_handle = services.purger.start_with_shutdown(shutdown_tx.subscribe());

    let app = server::create_app(services);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Credential server listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    let _ = shutdown_tx.send(());
    let abort_handle = purge_handle.abort_handle();
    if tokio::time::timeout(Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS), purge_handle)
        .await
        .is_err()
    {
        warn!("Refresh token purge task did not stop in time, aborting");
        abort_handle.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable, only Ctrl+C will stop the server");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Ctrl+C handler failed");
            }
        }
        () = terminate => {}
    }

    info!("shutdown signal received, draining connections");
}
