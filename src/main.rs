use std::sync::Arc;

use tinderbox::{config::Config, db, objects::LocalObjectStore, AppState};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tinderbox=info,tower_http=info")),
        )
        .init();

    let config = Arc::new(Config::load()?);
    let db_pool = db::connect(&config.database_url, config.database_max_connections).await?;
    let objects = Arc::new(LocalObjectStore::new(&config.upload_dir, &config.upload_url_prefix).await?);

    let app = tinderbox::app(AppState { db_pool, objects, config: config.clone() })?;

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => {
                error!("cannot listen for Ctrl+C: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM, shutting down");
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
