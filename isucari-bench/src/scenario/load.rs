//! Throughput loops of the validation phase. Every loop lists an item, walks
//! some listings the way a shopper would and buys the item.

use crate::context::{BenchContext, Deadline};
use crate::scenario::action::{buy_complete, buy_complete_with_verify, sell_in_parent};
use crate::scenario::crawl::{verify_listing, CrawlMode, Listing};
use crate::scenario::{every, join_tasks};
use isucari_core::types::limits;
use isucari_core::{Error, Result, UserRole};
use isucari_session::Session;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Share of first-page items that must fall below the buyer's favourite root
/// category for the new-items page to count as recommended.
const RECOMMENDED_SHARE: f64 = 0.8;

/// Run the load loops until `deadline`.
pub async fn load(ctx: Arc<BenchContext>, deadline: Deadline) {
    let interval = Duration::from_millis(ctx.config.timing.load_interval_ms);
    let mut tasks = Vec::new();
    spawn_loops(&mut tasks, &ctx, deadline, interval, 1, browse_new_or_categories);
    spawn_loops(&mut tasks, &ctx, deadline, interval, 2, browse_category_and_transactions);
    spawn_loops(&mut tasks, &ctx, deadline, interval, 2, browse_users);
    spawn_loops(&mut tasks, &ctx, deadline, interval, 1, browse_new_items);
    join_tasks(&ctx, tasks).await;
}

fn spawn_loops<F, Fut>(
    tasks: &mut Vec<tokio::task::JoinHandle<()>>,
    ctx: &Arc<BenchContext>,
    deadline: Deadline,
    interval: Duration,
    parallelism: usize,
    unit: F,
) where
    F: Fn(Arc<BenchContext>) -> Fut + Copy + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    for _ in 0..parallelism {
        let ctx = Arc::clone(ctx);
        tasks.push(tokio::spawn(async move {
            every(&ctx, deadline, interval, || unit(Arc::clone(&ctx))).await;
        }));
    }
}

/// Whether the first page of new items is dominated by the root category
/// the buyer likes to buy from.
///
/// # Errors
/// Returns an application failure for a short first page or an item without
/// category.
async fn is_recommended(ctx: &BenchContext, buyer: &Session) -> Result<bool> {
    let page = buyer.new_items(None).await?;
    if page.items.len() != limits::ITEMS_PER_PAGE {
        return Err(Error::application(format!(
            "GET /new_items.json: expected {} items on the first page; got {}",
            limits::ITEMS_PER_PAGE,
            page.items.len()
        )));
    }
    let parent_id = ctx.user_of(buyer)?.buy_parent_category_id;
    let mut matching = 0_u32;
    for item in &page.items {
        let category = item
            .category
            .as_ref()
            .ok_or_else(|| Error::application(format!("GET /new_items.json: item {} has no category", item.id)))?;
        if category.parent_id == parent_id {
            matching += 1;
        }
    }
    Ok(f64::from(matching) / limits::ITEMS_PER_PAGE as f64 > RECOMMENDED_SHARE)
}

async fn browse_new_or_categories(ctx: Arc<BenchContext>) -> Result<()> {
    let s1 = ctx.active_seller().await?;
    let s2 = ctx.buyer().await?;
    let s3 = ctx.active_seller().await?;

    let recommended = is_recommended(&ctx, &s2).await?;
    let price = ctx.prices.get();
    let parent_id = ctx.user_of(&s2)?.buy_parent_category_id;
    let listed = sell_in_parent(&ctx, &s1, price, parent_id).await?;

    if recommended {
        verify_listing(&ctx, &s2, Listing::NewItems, CrawlMode::Load, 10, 20).await?;
    } else {
        let roots: Vec<i64> = ctx.store.root_categories().iter().map(|c| c.id).collect();
        for root in roots {
            verify_listing(&ctx, &s2, Listing::Category(root), CrawlMode::Load, 10, 20).await?;
        }
    }
    buy_complete(&ctx, &s1, &s2, listed.item.id, price).await?;

    if recommended {
        let listed = sell_in_parent(&ctx, &s3, price, parent_id).await?;
        verify_listing(&ctx, &s2, Listing::NewItems, CrawlMode::Load, 1, 10).await?;
        buy_complete(&ctx, &s3, &s2, listed.item.id, price).await?;
    }
    Ok(())
}

async fn browse_category_and_transactions(ctx: Arc<BenchContext>) -> Result<()> {
    let s1 = ctx.active_seller().await?;
    let s2 = ctx.buyer().await?;

    let price = ctx.prices.get();
    let parent_id = ctx.user_of(&s2)?.buy_parent_category_id;
    let listed = sell_in_parent(&ctx, &s1, price, parent_id).await?;
    let item = s1.item(listed.item.id).await?;
    let root = item
        .category
        .as_ref()
        .map(|c| c.parent_id)
        .ok_or_else(|| Error::application(format!("GET /items/{}.json: category is missing", item.id)))?;

    verify_listing(&ctx, &s2, Listing::Category(root), CrawlMode::Load, 30, 20).await?;
    verify_listing(&ctx, &s1, Listing::Transactions, CrawlMode::Load, 10, 20).await?;
    verify_listing(&ctx, &s2, Listing::Transactions, CrawlMode::Load, 0, 0).await?;
    verify_listing(&ctx, &s1, Listing::Transactions, CrawlMode::Load, 10, 20).await?;
    buy_complete(&ctx, &s1, &s2, item.id, price).await
}

async fn browse_users(ctx: Arc<BenchContext>) -> Result<()> {
    let s1 = ctx.active_seller().await?;
    let s2 = ctx.buyer().await?;
    let s3 = ctx.buyer().await?;

    let price = ctx.prices.get();
    let parent_id = ctx.user_of(&s2)?.buy_parent_category_id;
    let listed = sell_in_parent(&ctx, &s1, price, parent_id).await?;

    for user_id in ctx.store.random_user_ids(UserRole::ActiveSeller, 3) {
        verify_listing(&ctx, &s2, Listing::User(user_id), CrawlMode::Load, 0, 20).await?;
    }
    for _ in 0..4 {
        verify_listing(&ctx, &s1, Listing::User(s3.user_id), CrawlMode::Load, 0, 0).await?;
        verify_listing(&ctx, &s3, Listing::User(s2.user_id), CrawlMode::Load, 0, 0).await?;
    }
    buy_complete_with_verify(&ctx, &s1, &s2, listed.item.id, price).await
}

async fn browse_new_items(ctx: Arc<BenchContext>) -> Result<()> {
    let s1 = ctx.active_seller().await?;
    let s2 = ctx.buyer().await?;

    let price = ctx.prices.get();
    let parent_id = ctx.user_of(&s2)?.buy_parent_category_id;
    let listed = sell_in_parent(&ctx, &s1, price, parent_id).await?;
    verify_listing(&ctx, &s2, Listing::NewItems, CrawlMode::Load, 30, 50).await?;
    buy_complete_with_verify(&ctx, &s1, &s2, listed.item.id, price).await
}
