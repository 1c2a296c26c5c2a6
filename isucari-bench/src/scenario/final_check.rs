//! Reconciliation of the target's sales report with what the payment
//! service actually charged.

use crate::context::BenchContext;
use isucari_core::{Error, Result};
use isucari_external::PaymentReport;
use isucari_session::TransactionEvidence;
use std::collections::HashMap;
use tracing::info;

/// Fetch `/reports.json` and match every reported sale against a payment.
/// Returns the raw score: the sum of all matched prices. Mismatches land in
/// `ctx.final_failures`.
pub async fn final_check(ctx: &BenchContext) -> i64 {
    match fetch_reports(ctx).await {
        Ok(evidences) => {
            let mut failures = Vec::new();
            let score = reconcile(&evidences, ctx.payment.reports(), &mut failures);
            for failure in &failures {
                ctx.final_failures.add(failure);
            }
            info!(reported = evidences.len(), score, failures = failures.len(), "final check finished");
            score
        },
        Err(e) => {
            ctx.final_failures.add(&e);
            0
        },
    }
}

async fn fetch_reports(ctx: &BenchContext) -> Result<Vec<TransactionEvidence>> {
    let session = ctx.new_session()?;
    session.reports().await
}

/// Pair reported sales with payments by item id. Every matched price counts
/// toward the returned score; unmatched entries on either side are
/// application failures.
pub fn reconcile(
    evidences: &[TransactionEvidence],
    mut payments: HashMap<i64, PaymentReport>,
    failures: &mut Vec<Error>,
) -> i64 {
    let mut score = 0;
    for evidence in evidences {
        let Some(report) = payments.get(&evidence.item_id) else {
            failures.push(Error::application(format!(
                "no payment for transaction evidence {} (item_id: {})",
                evidence.id, evidence.item_id
            )));
            continue;
        };
        if report.price != evidence.item_price {
            failures.push(Error::application(format!(
                "price of transaction evidence {} (item_id: {}) is {}; payment was {}",
                evidence.id, evidence.item_id, evidence.item_price, report.price
            )));
            continue;
        }
        score += report.price;
        payments.remove(&evidence.item_id);
    }

    let mut missing: Vec<_> = payments.into_iter().collect();
    missing.sort_unstable_by_key(|(item_id, _)| *item_id);
    for (item_id, report) in missing {
        failures.push(Error::application(format!(
            "item {item_id} was paid ({} yen) but is missing from the report",
            report.price
        )));
    }
    score
}
