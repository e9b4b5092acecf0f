//! REZOBridge process shell: starts discovery and the local media server,
//! then runs until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rezocontrol::{DeviceRegistry, DiscoveryManager};
use rezomediaserver::{LocalMediaServer, LoftyTagReader, MediaServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = rezoconfig::get_config();
    let udn = config.server_udn().context("Cannot establish server UDN")?;

    let registry = Arc::new(DeviceRegistry::new());
    let discovery = Arc::new(
        DiscoveryManager::new(Arc::clone(&registry)).context("Cannot bind SSDP listener")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let discovery_task = tokio::spawn({
        let discovery = Arc::clone(&discovery);
        let shutdown_rx = shutdown_rx.clone();
        async move { discovery.run(shutdown_rx).await }
    });

    // Kick off an initial probe; later probes come from the HTTP layer.
    discovery.trigger_search().await.ok();

    let server = LocalMediaServer::start(
        MediaServerConfig {
            udn,
            friendly_name: config.friendly_name(),
            root: config.media_root(),
            port: config.http_port(),
            advertise: true,
        },
        Arc::new(LoftyTagReader),
    )
    .await
    .context("Cannot start local media server")?;

    info!(addr = %server.local_addr(), "REZOBridge running; Ctrl-C to stop");
    tokio::signal::ctrl_c().await.ok();

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    server.shutdown().await;
    let _ = discovery_task.await;
    registry.shutdown();

    Ok(())
}
