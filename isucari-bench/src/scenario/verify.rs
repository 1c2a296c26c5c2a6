//! One-shot verification pass run before any load is applied.
//!
//! Nine independent units run concurrently; each reports its own failures,
//! so one broken endpoint does not hide the others.

use crate::context::BenchContext;
use crate::scenario::action::{
    bump, buy_complete_with_verify, check_uploaded_image, edit_price, expect_bumped, expect_sell_count_grew,
    sell_in_parent,
};
use crate::scenario::crawl::{find_in_category, find_item, verify_listing, CrawlMode, Listing};
use crate::scenario::wrong::{irregular_sell_and_buy, login_with_wrong_password};
use isucari_core::{AppUser, Error, Result, UserRole};
use tracing::info;

const VERIFY_PRICE: i64 = 100;
const EDITED_PRICE: i64 = 110;

/// Run the verification pass; failures land in `ctx.failures`.
pub async fn verify(ctx: &BenchContext) {
    let user3 = match ctx.store.random_buyer() {
        Ok(user) => user,
        Err(e) => {
            ctx.failures.add(&e);
            return;
        },
    };

    let results = tokio::join!(
        sell_and_buy(ctx),
        new_items_and_bump(ctx),
        category_and_edit(ctx),
        transactions(ctx),
        own_pages(ctx),
        active_seller_pages(ctx),
        login_with_wrong_password(ctx, &user3),
        wrong_inputs(ctx, &user3),
        static_files(ctx),
    );
    for result in [results.0, results.1, results.2, results.3, results.4, results.5, results.6, results.7, results.8]
    {
        ctx.failures.add_result(&result);
    }
    info!(failures = ctx.failures.len(), "verification pass finished");
}

async fn sell_and_buy(ctx: &BenchContext) -> Result<()> {
    let s1 = ctx.active_seller().await?;
    let s2 = ctx.buyer().await?;

    let num_sell_before = ctx.user_of(&s1)?.num_sell_items;
    let parent_id = ctx.user_of(&s2)?.buy_parent_category_id;
    let listed = sell_in_parent(ctx, &s1, VERIFY_PRICE, parent_id).await?;

    let found = find_item(&s1, Listing::User(s1.user_id), listed.item.id, 1).await?;
    expect_sell_count_grew(&found, num_sell_before)?;
    check_uploaded_image(&s1, listed.item.id, &listed.image).await?;
    buy_complete_with_verify(ctx, &s1, &s2, listed.item.id, VERIFY_PRICE).await
}

async fn new_items_and_bump(ctx: &BenchContext) -> Result<()> {
    let s1 = ctx.active_seller().await?;
    let s2 = ctx.buyer().await?;

    verify_listing(ctx, &s2, Listing::NewItems, CrawlMode::Verify, 2, 10).await?;

    let item_id = ctx
        .store
        .user_first_item(s1.user_id)
        .ok_or_else(|| Error::internal(format!("user {} has no item on sale", s1.user_id)))?;
    let bumped = bump(ctx, &s1, item_id).await?;
    let found = find_in_category(ctx, &s2, &bumped, 1).await?;
    expect_bumped(&found, &bumped, "GET /new_items/{root_category_id}.json")?;
    let found = find_item(&s2, Listing::User(s1.user_id), item_id, 1).await?;
    expect_bumped(&found, &bumped, &format!("GET /users/{}.json", s1.user_id))
}

async fn category_and_edit(ctx: &BenchContext) -> Result<()> {
    let s1 = ctx.active_seller().await?;
    let s2 = ctx.buyer().await?;

    let root = ctx.store.random_root_category().ok_or_else(|| Error::internal("no root category in the dataset"))?;
    let crawled = verify_listing(ctx, &s2, Listing::Category(root.id), CrawlMode::Verify, 2, 10).await;
    ctx.failures.add_result(&crawled);

    let item_id = ctx
        .store
        .user_first_item(s1.user_id)
        .ok_or_else(|| Error::internal(format!("user {} has no item on sale", s1.user_id)))?;
    edit_price(ctx, &s1, item_id, EDITED_PRICE).await
}

async fn transactions(ctx: &BenchContext) -> Result<()> {
    let s1 = ctx.active_seller().await?;
    let s2 = ctx.buyer().await?;

    verify_listing(ctx, &s1, Listing::Transactions, CrawlMode::Verify, 3, 27).await?;

    let parent_id = ctx.user_of(&s2)?.buy_parent_category_id;
    let listed = sell_in_parent(ctx, &s1, VERIFY_PRICE, parent_id).await?;
    let item = &listed.item;
    for session in [&*s1, &*s2] {
        find_item(session, Listing::User(s1.user_id), item.id, 1).await?;
        find_in_category(ctx, session, item, 1).await?;
    }
    find_item(&s1, Listing::Transactions, item.id, 1).await?;

    verify_listing(ctx, &s1, Listing::Transactions, CrawlMode::Verify, 2, 5).await?;
    buy_complete_with_verify(ctx, &s1, &s2, item.id, VERIFY_PRICE).await
}

async fn own_pages(ctx: &BenchContext) -> Result<()> {
    let s1 = ctx.buyer().await?;
    let s2 = ctx.active_seller().await?;

    verify_listing(ctx, &s1, Listing::User(s1.user_id), CrawlMode::Verify, 0, 0).await?;
    verify_listing(ctx, &s2, Listing::User(s2.user_id), CrawlMode::Verify, 0, 10).await?;
    for user_id in ctx.store.random_user_ids(UserRole::Buyer, 3) {
        let result = verify_listing(ctx, &s1, Listing::User(user_id), CrawlMode::Verify, 0, 0).await;
        ctx.failures.add_result(&result);
    }
    Ok(())
}

async fn active_seller_pages(ctx: &BenchContext) -> Result<()> {
    let s1 = ctx.buyer().await?;
    for user_id in ctx.store.random_user_ids(UserRole::ActiveSeller, 3) {
        let result = verify_listing(ctx, &s1, Listing::User(user_id), CrawlMode::Verify, 0, 5).await;
        ctx.failures.add_result(&result);
    }
    Ok(())
}

async fn wrong_inputs(ctx: &BenchContext, user3: &AppUser) -> Result<()> {
    let s1 = ctx.buyer().await?;
    let s2 = ctx.buyer().await?;
    irregular_sell_and_buy(ctx, &s1, &s2, user3).await
}

async fn static_files(ctx: &BenchContext) -> Result<()> {
    let session = ctx.new_session()?;
    for file in ctx.store.static_files() {
        match session.download_md5(&file.url_path).await {
            Ok(md5) if md5 == file.md5 => {},
            Ok(_) => ctx.failures.add(&Error::application(format!("GET {}: content is wrong", file.url_path))),
            Err(e) => ctx.failures.add(&e),
        }
    }
    Ok(())
}
