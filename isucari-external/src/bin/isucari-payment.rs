//! Standalone payment simulator.
//!
//! Usage: `isucari-payment [config.toml]`

use anyhow::Result;
use isucari_core::{ConfigLoader, FailureAggregator};
use isucari_external::{Gate, PaymentService, SimulatorServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
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

    let failures = Arc::new(FailureAggregator::new());
    let service = Arc::new(PaymentService::new(
        Duration::from_millis(config.external.card_token_ttl_ms),
        Arc::clone(&failures),
    ));

    let mut server = SimulatorServer::new(
        "payment",
        SocketAddr::from(([0, 0, 0, 0], config.external.payment_port)),
        service.router(),
        gate,
    );
    let addr = server.start().await?;
    info!(%addr, "payment simulator listening");

    tokio::signal::ctrl_c().await?;
    server.stop().await?;

    let counts = failures.counts();
    info!(critical = counts.critical, "payment simulator exiting");
    Ok(())
}
