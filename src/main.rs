//! webridge - erssi fe-web to WeeChat relay protocol bridge.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use webridge::{upstream, Bridge, ClientCommand, Config, RelayServer, Translator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env provides the lowest-priority defaults; flags and env win.
    dotenvy::dotenv().ok();
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .with_target(true)
        .init();

    // The upstream TLS stack needs a process-level crypto provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!(
        url = %config.upstream_url,
        listen = %config.listen_addr,
        "Starting webridge"
    );

    let server = RelayServer::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let registry = server.registry();

    let connection = upstream::connect(&config.upstream_url, &config.password)
        .await
        .with_context(|| format!("failed to connect to {}", config.upstream_url))?;

    let translator = Arc::new(Translator::new());
    let bridge = Arc::new(Bridge::new(
        translator,
        registry,
        connection.outgoing.clone(),
    ));

    let (command_tx, command_rx) = mpsc::channel::<ClientCommand>(64);
    tokio::spawn(async move {
        if let Err(e) = server.run(command_tx).await {
            error!(component = "server", error = %e, "Accept loop failed");
        }
    });

    let bridge_task = tokio::spawn(bridge.run(connection.events, command_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = bridge_task => {
            info!("Bridge stopped");
        }
    }

    info!("Goodbye");
    Ok(())
}
