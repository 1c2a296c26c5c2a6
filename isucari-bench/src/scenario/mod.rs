//! # Scenario Engine
//!
//! Scripted users driving the target. Every scenario loop runs one unit per
//! interval until the deadline; a unit's failure is recorded and the loop
//! goes on with the next iteration.
//!
//! ## Architecture
//!
//! - [`crawl`]: Pagination verifier and item inspection
//! - [`action`]: Listing and transaction flows
//! - [`wrong`]: Requests the target must reject
//! - [`verify`]: One-shot verification pass
//! - [`check`]: Correctness loops during validation
//! - [`load`]: Throughput loops during validation
//! - [`campaign`]: Popular-listing races
//! - [`final_check`]: Payment reports against the target's reports

pub mod action;
pub mod campaign;
pub mod check;
pub mod crawl;
pub mod final_check;
pub mod load;
pub mod verify;
pub mod wrong;

use crate::context::{BenchContext, Deadline};
use futures::future::join_all;
use isucari_core::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Run `unit` every `interval` until `deadline`, recording its failures.
pub async fn every<F, Fut>(ctx: &BenchContext, deadline: Deadline, interval: Duration, mut unit: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    while !deadline.is_expired() {
        let started = Instant::now();
        if let Err(e) = unit().await {
            ctx.failures.add(&e);
        }
        if !deadline.wait_interval(started, interval).await {
            break;
        }
    }
}

/// Wait for `tasks`; a task that panicked is recorded as an internal failure.
pub async fn join_tasks(ctx: &BenchContext, tasks: Vec<JoinHandle<()>>) {
    for result in join_all(tasks).await {
        if let Err(e) = result {
            warn!(error = %e, "scenario task failed");
            ctx.failures.add(&isucari_core::Error::internal(format!("scenario task failed: {e}")));
        }
    }
}

/// Validation phase: check loops, load loops and, when enabled, the
/// campaign, all until `deadline`. Returns at the deadline even if requests
/// are still in flight.
pub async fn run(ctx: Arc<BenchContext>, deadline: Deadline, campaign: i64) {
    info!(campaign, remaining = ?deadline.remaining(), "validation started");
    let mut tasks = vec![
        tokio::spawn(check::check(Arc::clone(&ctx), deadline)),
        tokio::spawn(load::load(Arc::clone(&ctx), deadline)),
    ];
    if campaign > 0 {
        tasks.push(tokio::spawn(campaign::campaign(Arc::clone(&ctx), deadline)));
    }

    tokio::select! {
        () = join_tasks(&ctx, tasks) => {},
        () = tokio::time::sleep_until(deadline.at()) => {},
    }
    info!(failures = ctx.failures.len(), "validation finished");
}
