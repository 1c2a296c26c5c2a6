//! Popular-listing campaign.
//!
//! A popular seller lists an expensive item and a crowd of buyers races for
//! it. Exactly one of them may win. Every clean round raises the price of
//! regular listings, which is where a fast target earns its extra score.

use crate::context::{BenchContext, Deadline};
use crate::scenario::action::{finish_transaction, record_purchase, sell};
use crate::scenario::join_tasks;
use isucari_core::constants::{CORRECT_CARD_NUMBER, FAILED_CARD_NUMBER};
use isucari_core::{Error, Result};
use isucari_session::{BuyOutcome, PoolGuard, Session};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const WARM_UP_WORKERS: usize = 10;
const INITIAL_LOGINS_PER_WORKER: usize = 50;
const ROUND_LOGINS_PER_WORKER: usize = 20;
const LOGIN_INTERVAL: Duration = Duration::from_millis(100);

/// Buyers beyond the crowd that must stay idle for a round to start.
const POOL_HEADROOM: usize = 10;
/// Racer failures a round tolerates before it stops counting as clean.
const MAX_RACE_ERRORS: usize = 2;
/// Amount a clean round adds to the listing price.
const PRICE_STEP: i64 = 20;

/// Fill the buyer pool, then run one popular listing per interval until
/// `deadline`.
pub async fn campaign(ctx: Arc<BenchContext>, deadline: Deadline) {
    let mut tasks = warm_up(&ctx, deadline, INITIAL_LOGINS_PER_WORKER);

    let start = Duration::from_millis(ctx.config.timing.campaign_start_ms);
    let interval = Duration::from_millis(ctx.config.timing.campaign_interval_ms);
    if deadline.sleep(start).await {
        // Each round brings a bigger crowd and a more expensive item.
        let (mut crowd, mut price) = (80, 1000);
        loop {
            let started = Instant::now();
            if popular_listing(&ctx, crowd, price).await {
                info!(crowd, price, "popular listing succeeded");
                ctx.prices.add(PRICE_STEP);
                tasks.extend(warm_up(&ctx, deadline, ROUND_LOGINS_PER_WORKER));
            }
            crowd += 20;
            price += 100;
            if !deadline.wait_interval(started, interval).await {
                break;
            }
        }
    }
    join_tasks(&ctx, tasks).await;
}

/// Log buyers in at a steady pace and park them in the buyer pool.
fn warm_up(ctx: &Arc<BenchContext>, deadline: Deadline, logins_per_worker: usize) -> Vec<JoinHandle<()>> {
    (0..WARM_UP_WORKERS)
        .map(|_| {
            let ctx = Arc::clone(ctx);
            tokio::spawn(async move {
                for _ in 0..logins_per_worker {
                    let started = Instant::now();
                    match login_buyer(&ctx).await {
                        Ok(session) => ctx.buyers.enqueue(session),
                        Err(e) => ctx.failures.add(&e),
                    }
                    if !deadline.wait_interval(started, LOGIN_INTERVAL).await {
                        break;
                    }
                }
            })
        })
        .collect()
}

async fn login_buyer(ctx: &BenchContext) -> Result<Session> {
    let user = ctx.store.random_buyer()?;
    ctx.login(&user).await
}

/// One campaign round with `crowd` racing buyers. Returns whether the round
/// was clean enough to raise the listing price.
pub async fn popular_listing(ctx: &Arc<BenchContext>, crowd: usize, price: i64) -> bool {
    let idle = ctx.buyers.len();
    if idle < crowd + POOL_HEADROOM {
        warn!(idle, crowd, "not enough logged-in buyers; skipping popular listing");
        return false;
    }
    match run_race(ctx, crowd, price).await {
        Ok(clean) => clean,
        Err(e) => {
            ctx.failures.add(&e);
            false
        },
    }
}

async fn run_race(ctx: &Arc<BenchContext>, crowd: usize, price: i64) -> Result<bool> {
    let popular = ctx.buyer().await?;
    let item_id = sell(ctx, &popular, price).await?.item.id;
    debug!(item_id, crowd, price, "popular listing on sale");

    let (winners, mut winner_rx) = mpsc::channel(1);
    let errors = Arc::new(AtomicUsize::new(0));
    let mut racers = JoinSet::new();
    for _ in 0..crowd {
        racers.spawn(race(Arc::clone(ctx), item_id, price, winners.clone(), Arc::clone(&errors)));
    }
    drop(winners);

    // All senders are gone once every racer finished, so `None` means nobody won.
    let Some(buyer) = winner_rx.recv().await else {
        drain_racers(ctx, &mut racers).await;
        return Err(Error::critical(format!("all users failed to buy item {item_id}")));
    };

    let drain = {
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move {
            while let Some(extra) = winner_rx.recv().await {
                ctx.failures.add(&Error::critical(format!(
                    "item {item_id} was sold out but user {} could buy it as well",
                    extra.user_id
                )));
            }
            drain_racers(&ctx, &mut racers).await;
        })
    };

    let finished = finish_transaction(ctx, &popular, &buyer, item_id).await;
    drop(buyer);
    if let Err(e) = drain.await {
        ctx.failures.add(&Error::internal(format!("campaign drain task failed: {e}")));
    }
    finished?;
    Ok(errors.load(Ordering::SeqCst) <= MAX_RACE_ERRORS)
}

async fn drain_racers(ctx: &BenchContext, racers: &mut JoinSet<()>) {
    while let Some(joined) = racers.join_next().await {
        if let Err(e) = joined {
            ctx.failures.add(&Error::internal(format!("campaign racer failed: {e}")));
        }
    }
}

/// One buyer of the crowd. One in ten pays with the card that is declined.
async fn race(
    ctx: Arc<BenchContext>,
    item_id: i64,
    price: i64,
    winners: mpsc::Sender<PoolGuard<Session>>,
    errors: Arc<AtomicUsize>,
) {
    let declined = rand::thread_rng().gen_range(0..10) == 0;
    let card = if declined { FAILED_CARD_NUMBER } else { CORRECT_CARD_NUMBER };
    let token = ctx.payment.force_set(card, item_id, price);

    let result: Result<()> = async {
        let buyer = ctx.buyer().await?;
        if declined {
            return buyer.buy_with_failed_on_campaign(item_id, &token).await;
        }
        let outcome = buyer.buy_may_fail(item_id, &token).await?;
        if let Some(evidence_id) = winning_evidence(item_id, outcome)? {
            debug!(item_id, evidence_id, buyer_id = buyer.user_id, "campaign item bought");
            record_purchase(&ctx, &buyer, item_id);
            // A closed channel only means the round already gave up.
            let _ = winners.send(buyer).await;
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        ctx.failures.add(&e);
        errors.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transaction evidence of a won race. A 200 without an evidence id is not a
/// win.
fn winning_evidence(item_id: i64, outcome: BuyOutcome) -> Result<Option<i64>> {
    match outcome {
        BuyOutcome::Bought(0) => Err(Error::application(format!(
            "POST /buy (item_id: {item_id}): transaction_evidence_id is 0"
        ))),
        BuyOutcome::Bought(evidence_id) => Ok(Some(evidence_id)),
        BuyOutcome::SoldOut => Ok(None),
    }
}
