/*!
 * GATEWATCH EXPORTER - Point d'entrée du processus d'exposition
 *
 * RÔLE : Charge la config (`.env` + YAML), ouvre le listener et sert les
 * scrapes jusqu'à Ctrl-C ou SIGTERM.
 */

use anyhow::{Context, Result};
use gatewatch_exporter::config::load_config;
use gatewatch_exporter::ExpositionServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("📡 Gatewatch exporter v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config().await;
    let server = ExpositionServer::bind(&config)
        .await
        .context("Failed to start exposition server")?;

    server
        .run(shutdown_signal())
        .await
        .context("Exposition server failed")?;

    info!("👋 Gatewatch exporter stopped");
    Ok(())
}

/// Ctrl-C, ou SIGTERM sous unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
}
