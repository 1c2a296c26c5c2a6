//! Full benchmark run against a target application.
//!
//! Usage: `isucari-bench [config.toml]`
//!
//! Logs go to stderr; the only line on stdout is the JSON verdict.

use anyhow::Result;
use isucari_bench::{run_bench, BenchContext};
use isucari_core::{AssetStore, ConfigLoader, FailureAggregator};
use isucari_external::Simulators;
use isucari_session::TargetUrls;
use std::sync::Arc;
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

    let failures = Arc::new(FailureAggregator::new());
    let mut simulators = Simulators::new(&config, Arc::clone(&failures))?;
    let (payment, shipment) = simulators.start().await?;
    info!(%payment, %shipment, "simulators listening");

    let static_dir = config.data.static_dir.as_deref();
    let store = match config.data.seed {
        Some(seed) => AssetStore::load_with_seed(&config.data.data_dir, static_dir, seed)?,
        None => AssetStore::load(&config.data.data_dir, static_dir)?,
    };
    let urls = TargetUrls::from_config(&config)?;

    let ctx = Arc::new(BenchContext::new(
        config,
        Arc::new(store),
        Arc::new(urls),
        Arc::clone(&simulators.payment),
        Arc::clone(&simulators.shipment),
        failures,
    ));
    let output = run_bench(ctx, &simulators).await;
    println!("{}", serde_json::to_string(&output)?);

    simulators.stop().await?;
    Ok(())
}
