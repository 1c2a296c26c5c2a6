//! Correctness loops of the validation phase. They run at a slow fixed pace
//! and look at the target from angles the load loops do not.

use crate::context::{BenchContext, Deadline};
use crate::scenario::action::{
    bump, buy_complete_with_verify, edit_price, expect_bumped, expect_sell_count_grew, sell_in_parent,
};
use crate::scenario::crawl::{find_in_category, find_item, verify_listing, CrawlMode, Listing};
use crate::scenario::wrong::{irregular_sell_and_buy, login_with_wrong_password};
use crate::scenario::{every, join_tasks};
use isucari_core::{AppUser, Error, Result, UserRole};
use std::sync::Arc;
use std::time::Duration;

const WRONG_PASSWORD_INTERVAL: Duration = Duration::from_secs(8);
const BROWSE_INTERVAL: Duration = Duration::from_secs(10);
const BUMP_INTERVAL: Duration = Duration::from_secs(5);
const SELL_AND_BUY_INTERVAL: Duration = Duration::from_secs(10);

/// Run the four check loops until `deadline`.
pub async fn check(ctx: Arc<BenchContext>, deadline: Deadline) {
    let user3 = match ctx.store.random_buyer() {
        Ok(user) => Arc::new(user),
        Err(e) => {
            ctx.failures.add(&e);
            return;
        },
    };

    let mut tasks = Vec::with_capacity(4);
    {
        let (ctx, user3) = (Arc::clone(&ctx), Arc::clone(&user3));
        tasks.push(tokio::spawn(async move {
            every(&ctx, deadline, WRONG_PASSWORD_INTERVAL, || login_with_wrong_password(&ctx, &user3)).await;
        }));
    }
    {
        let (ctx, user3) = (Arc::clone(&ctx), Arc::clone(&user3));
        tasks.push(tokio::spawn(async move {
            every(&ctx, deadline, BROWSE_INTERVAL, || browse(&ctx, &user3)).await;
        }));
    }
    {
        let ctx = Arc::clone(&ctx);
        tasks.push(tokio::spawn(async move {
            every(&ctx, deadline, BUMP_INTERVAL, || bump_and_browse(&ctx)).await;
        }));
    }
    {
        let ctx = Arc::clone(&ctx);
        tasks.push(tokio::spawn(async move {
            every(&ctx, deadline, SELL_AND_BUY_INTERVAL, || sell_and_buy(&ctx)).await;
        }));
    }
    join_tasks(&ctx, tasks).await;
}

/// Category pages, user pages of sellers and buyers, then the requests
/// that must be rejected.
async fn browse(ctx: &BenchContext, user3: &AppUser) -> Result<()> {
    let s1 = ctx.buyer().await?;
    let s2 = ctx.buyer().await?;

    let root = ctx.store.random_root_category().ok_or_else(|| Error::internal("no root category in the dataset"))?;
    verify_listing(ctx, &s1, Listing::Category(root.id), CrawlMode::Check, 10, 15).await?;

    for user_id in ctx.store.random_user_ids(UserRole::ActiveSeller, 5) {
        verify_listing(ctx, &s1, Listing::User(user_id), CrawlMode::Check, 0, 5).await?;
    }
    verify_listing(ctx, &s1, Listing::User(s2.user_id), CrawlMode::Check, 0, 0).await?;
    verify_listing(ctx, &s2, Listing::User(s1.user_id), CrawlMode::Check, 0, 0).await?;

    irregular_sell_and_buy(ctx, &s1, &s2, user3).await
}

/// Bump the first listing of a seller that never bumped before and find it
/// on every listing it must have moved up on.
async fn bump_and_browse(ctx: &BenchContext) -> Result<()> {
    // A listing cannot be bumped again right away, so every round uses a new seller.
    let user = ctx.store.random_active_seller()?;
    let s1 = ctx.sellers.adopt(ctx.login(&user).await?);

    let item_id = ctx
        .store
        .user_first_item(s1.user_id)
        .ok_or_else(|| Error::internal(format!("user {} has no item on sale", s1.user_id)))?;
    let bumped = bump(ctx, &s1, item_id).await?;

    let found = find_item(&s1, Listing::NewItems, item_id, 3).await?;
    expect_bumped(&found, &bumped, "GET /new_items.json")?;
    let found = find_in_category(ctx, &s1, &bumped, 3).await?;
    expect_bumped(&found, &bumped, "GET /new_items/{root_category_id}.json")?;
    let found = find_item(&s1, Listing::User(s1.user_id), item_id, 3).await?;
    expect_bumped(&found, &bumped, &format!("GET /users/{}.json", s1.user_id))?;

    let root = ctx
        .store
        .get_category(bumped.category_id)
        .map(|c| c.parent_id)
        .filter(|parent| *parent != 0)
        .ok_or_else(|| Error::internal(format!("item {item_id} has no leaf category")))?;
    verify_listing(ctx, &s1, Listing::Category(root), CrawlMode::Check, 2, 5).await
}

/// Sell at the ladder price, find the listing everywhere, raise its price
/// and buy it with full verification.
async fn sell_and_buy(ctx: &BenchContext) -> Result<()> {
    let s1 = ctx.active_seller().await?;
    let s2 = ctx.buyer().await?;

    let price = ctx.prices.get();
    let num_sell_before = ctx.user_of(&s1)?.num_sell_items;
    let parent_id = ctx.user_of(&s2)?.buy_parent_category_id;
    let listed = sell_in_parent(ctx, &s1, price, parent_id).await?;
    let item = &listed.item;

    let found = find_item(&s1, Listing::User(s1.user_id), item.id, 2).await?;
    expect_sell_count_grew(&found, num_sell_before)?;
    find_in_category(ctx, &s1, item, 3).await?;
    find_item(&s1, Listing::Transactions, item.id, 5).await?;

    edit_price(ctx, &s1, item.id, price + 10).await?;
    buy_complete_with_verify(ctx, &s1, &s2, item.id, price + 10).await
}
