//! # Prelude
//!
//! Commonly used types of the isucari core library.

pub use crate::{
    asset::{md5_hex, AssetData, AssetStore, UserRole},
    config::{BenchConfig, ConfigLoader, CrawlSlack},
    constants::messages,
    error::{Error, FailureKind, Result},
    fails::{FailureAggregator, FailureCounts},
    ids::IdsStore,
    types::{
        evidence_status, item_status, limits, AppCategory, AppItem, AppTransactionEvidence,
        AppUser,
    },
};
