use mindquest_relay::{AppState, Config, app, db};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    if config.session_token.is_none() {
        tracing::warn!("SESSION_TOKEN is unset, any caller can open a session as anyone");
    }
    let db_pool = db::connect(&config.database_url, 16).await?;
    let bind_addr = config.bind_addr.clone();

    let app = app(AppState::new(db_pool, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("relay listening on {bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("relay stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mindquest_relay=info,tower_http=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
