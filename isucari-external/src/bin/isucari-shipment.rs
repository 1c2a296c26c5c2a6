//! Standalone shipment simulator.
//!
//! Usage: `isucari-shipment [config.toml]`

use anyhow::Result;
use isucari_core::ConfigLoader;
use isucari_external::{Gate, ShipmentService, SimulatorServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = std::env::args().nth(1) {
        loader = loader.with_file(path);
    }
    let config = loader.load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let gate = Arc::new(Gate::new(config.allowed_ips()?));
    gate.set_delay(Duration::from_millis(config.external.standalone_delay_ms));

    let service = Arc::new(ShipmentService::new(Duration::from_millis(
        config.external.shipment_done_delay_ms,
    )));
    let shippings = config.data.data_dir.join("result").join("shippings_json.txt");
    if shippings.exists() {
        service.load_shippings(&shippings)?;
    } else {
        warn!(path = %shippings.display(), "no initial shippings");
    }

    let mut server = SimulatorServer::new(
        "shipment",
        SocketAddr::from(([0, 0, 0, 0], config.external.shipment_port)),
        service.router(),
        gate,
    );
    let addr = server.start().await?;
    info!(%addr, "shipment simulator listening");

    tokio::signal::ctrl_c().await?;
    server.stop().await?;
    Ok(())
}
