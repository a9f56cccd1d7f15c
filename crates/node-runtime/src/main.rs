//! # Node Runtime
//!
//! Entry point for a storage node.
//!
//! ## Startup Sequence
//!
//! 1. Telemetry from `NODE_LOG_LEVEL` / `RUST_LOG`, `NODE_JSON_LOGS`
//! 2. Node configuration from `NODE_*` variables, validated
//! 3. One engine and one store per configured store spec
//! 4. Serve until Ctrl+C, then shut down gracefully

use anyhow::{Context, Result};
use tracing::info;

use node_runtime::{Node, NodeConfig, NodeServices};
use node_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_telemetry(&telemetry).context("failed to initialize telemetry")?;

    let config = NodeConfig::from_env().context("failed to load node configuration")?;
    let node = Node::start(config)
        .await
        .context("failed to start node")?;

    let descriptor = node.descriptor();
    info!(
        node_id = %descriptor.node_id,
        address = %descriptor.address,
        locality = %descriptor.locality,
        replication_factor = node.config().default_replication_factor,
        "[node] node is running, press Ctrl+C to stop"
    );
    for store in node.store_descriptors().context("failed to read store capacity")? {
        info!(
            store_id = %store.store_id,
            attrs = %store.attrs,
            capacity = store.capacity.capacity,
            available = store.capacity.available,
            "[node] serving store"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    node.shutdown().await;
    Ok(())
}
