//! # isucari Bench
//!
//! Correctness-verifying load generator for the isucari marketplace. A run
//! initializes the target, verifies it once, drives it with scripted users
//! for a fixed time while checking every answer against the ground truth,
//! and finally reconciles its sales report with the payment service.
//!
//! ## Architecture
//!
//! - [`context`]: Shared run state (store, session pools, simulators, price ladder)
//! - [`scenario`]: Scenario engine and pagination verifier
//! - [`runner`]: Phase sequencing of one run
//! - [`score`]: Verdict and score
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use isucari_bench::{run_bench, BenchContext};
//! use isucari_core::{AssetStore, ConfigLoader, FailureAggregator};
//! use isucari_external::Simulators;
//! use isucari_session::TargetUrls;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ConfigLoader::new().load()?;
//! let failures = Arc::new(FailureAggregator::new());
//! let mut simulators = Simulators::new(&config, Arc::clone(&failures))?;
//! simulators.start().await?;
//!
//! let store = Arc::new(AssetStore::load(&config.data.data_dir, config.data.static_dir.as_deref())?);
//! let urls = Arc::new(TargetUrls::from_config(&config)?);
//! let ctx = Arc::new(BenchContext::new(
//!     config,
//!     store,
//!     urls,
//!     Arc::clone(&simulators.payment),
//!     Arc::clone(&simulators.shipment),
//!     failures,
//! ));
//! let output = run_bench(ctx, &simulators).await;
//! println!("{}", serde_json::to_string(&output)?);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod runner;
pub mod scenario;
pub mod score;

pub use context::{BenchContext, Deadline, PriceLadder};
pub use runner::{initialize, run_bench};
pub use score::BenchOutput;
