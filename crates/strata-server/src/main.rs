use std::path::Path;
use strata_server::{net, ServerConfig, ServerCore};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Strata server...");

    let config = ServerConfig::load(Path::new("config/server.toml"))?;
    info!(
        "Config loaded: bind={}:{}, max_players={}, view_distance={}, workers={}",
        config.bind, config.port, config.max_players, config.view_distance, config.workers
    );

    let addr = format!("{}:{}", config.bind, config.port);
    let core = ServerCore::new(config);

    // A failed bind is a startup error: abort with a non-zero exit.
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let tasks = net::start(core.clone(), listener);

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    core.begin_shutdown();

    // Wait for the reactor, workers and sender to observe the flag.
    for task in tasks {
        let _ = task.await;
    }
    for conn in core.connection_snapshot() {
        conn.shutdown().await;
        core.remove_connection(conn.id);
    }
    info!("Server shut down cleanly");

    Ok(())
}
