//! # isucari Core
//!
//! Shared foundation of the isucari benchmarker: the error taxonomy, the
//! failure aggregator, configuration loading, and the ground-truth store the
//! scenarios verify the target against.
//!
//! ## Architecture
//!
//! - [`error`]: Error variants and their scoring kind
//! - [`fails`]: Thread-safe failure aggregator
//! - [`config`]: Run configuration and its layered loader
//! - [`types`]: Ground-truth records and marketplace constants
//! - [`asset`]: The ground-truth store
//! - [`ids`]: Per-crawl id deduplication
//! - [`constants`]: Values shared with the simulators and the target
//! - [`prelude`]: Common imports

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod asset;
pub mod config;
pub mod constants;
pub mod error;
pub mod fails;
pub mod ids;
pub mod prelude;
pub mod types;

pub use asset::{md5_hex, AssetData, AssetStore, UserRole};
pub use config::{BenchConfig, ConfigLoader, CrawlSlack};
pub use error::{Error, FailureKind, Result};
pub use fails::{unique_messages, FailureAggregator, FailureCounts};
pub use ids::{DuplicateId, IdsStore};
pub use types::{AppCategory, AppItem, AppTransactionEvidence, AppUser, StaticFile};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
