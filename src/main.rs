use guestbook_server::{AppState, app, config::Config, db::Pool, errors::Result, model};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("guestbook_server=info,tower_http=info")),
        )
        .compact()
        .init();

    // Nothing is served unless the environment is complete.
    let config = Config::from_env()?;

    let pool = Pool::initialize(&config.database_url, config.pool_min, config.pool_max).await?;
    if config.create_schema {
        model::ensure_schema(&pool).await?;
    }

    let address = config.bind_addr;
    let state = AppState::new(pool, &config)?;
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Server listening on {address}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
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
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
