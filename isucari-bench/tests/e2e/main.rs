//! Scenarios driven against an in-process marketplace and the real payment
//! and shipment simulators.

mod fixture;
mod mock_target;

use fixture::{harness, LAST_BUYER, SEEDED_SELLER};
use isucari_bench::scenario::action::{
    bump, buy_complete_with_verify, check_uploaded_image, edit_price, expect_bumped, sell,
};
use isucari_bench::scenario::campaign::popular_listing;
use isucari_bench::scenario::crawl::{find_in_category, find_item, verify_listing, CrawlMode, Listing};
use isucari_bench::scenario::final_check::final_check;
use isucari_bench::scenario::wrong::{irregular_sell_and_buy, login_with_wrong_password};
use isucari_bench::{initialize, run_bench};
use isucari_core::constants::messages;
use isucari_core::FailureKind;
use isucari_session::StatusCode;
use mock_target::Quirks;
use std::sync::Arc;

#[tokio::test]
async fn test_purchase_walks_every_state_and_is_scored() -> anyhow::Result<()> {
    let h = harness(0, Quirks::default()).await?;
    let seller = h.login(1).await?;
    let buyer = h.login(10).await?;

    let listed = sell(&h.ctx, &seller, 1200).await?;
    check_uploaded_image(&seller, listed.item.id, &listed.image).await?;
    buy_complete_with_verify(&h.ctx, &seller, &buyer, listed.item.id, 1200).await?;

    assert_eq!(h.market.item_status(listed.item.id).as_deref(), Some("sold_out"));
    assert!(h.ctx.failures.is_empty(), "{:?}", h.ctx.failures.messages());

    assert_eq!(final_check(&h.ctx).await, 1200);
    assert!(h.ctx.final_failures.is_empty(), "{:?}", h.ctx.final_failures.messages());
    h.shutdown().await
}

#[tokio::test]
async fn test_wrong_inputs_are_rejected() -> anyhow::Result<()> {
    let h = harness(0, Quirks::default()).await?;
    let s1 = h.login(1).await?;
    let s2 = h.login(11).await?;
    let user3 = h.ctx.store.get_user(12).ok_or_else(|| anyhow::anyhow!("user 12"))?;

    login_with_wrong_password(&h.ctx, &user3).await?;
    irregular_sell_and_buy(&h.ctx, &s1, &s2, &user3).await?;

    assert!(h.ctx.failures.is_empty(), "{:?}", h.ctx.failures.messages());
    assert_eq!(final_check(&h.ctx).await, h.ctx.prices.get());
    h.shutdown().await
}

#[tokio::test]
async fn test_rejected_login_must_not_leave_a_session() -> anyhow::Result<()> {
    let h = harness(0, Quirks { session_on_wrong_password: true, ..Quirks::default() }).await?;
    let user = h.ctx.store.get_user(12).ok_or_else(|| anyhow::anyhow!("user 12"))?;

    let err = login_with_wrong_password(&h.ctx, &user).await.unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::Application));
    assert!(err.to_string().contains("must not start a session"), "{err}");
    h.shutdown().await
}

#[tokio::test]
async fn test_sale_without_forced_payment_fails_final_check() -> anyhow::Result<()> {
    let h = harness(0, Quirks::default()).await?;
    let seller = h.login(1).await?;
    let buyer = h.login(13).await?;
    let item_id = sell(&h.ctx, &seller, 300).await?.item.id;

    let declined = buyer.failing_card_token().await?;
    buyer.buy_with_failed(item_id, &declined, StatusCode::BAD_REQUEST, messages::CARD_DECLINED).await?;
    let token = buyer.valid_card_token().await?;
    buyer.buy(item_id, &token).await?;

    assert_eq!(final_check(&h.ctx).await, 0);
    let (messages, counts) = h.ctx.final_failures.snapshot();
    assert_eq!(counts.application, 1);
    assert!(messages[0].starts_with("no payment for transaction evidence"), "{messages:?}");
    h.shutdown().await
}

#[tokio::test]
async fn test_listings_match_the_ground_truth() -> anyhow::Result<()> {
    let h = harness(0, Quirks::default()).await?;
    let viewer = h.login(20).await?;

    verify_listing(&h.ctx, &viewer, Listing::User(SEEDED_SELLER), CrawlMode::Verify, 0, 2).await?;
    verify_listing(&h.ctx, &viewer, Listing::Category(1), CrawlMode::Verify, 0, 2).await?;
    verify_listing(&h.ctx, &viewer, Listing::NewItems, CrawlMode::Check, 0, 1).await?;

    let err = verify_listing(&h.ctx, &viewer, Listing::User(SEEDED_SELLER), CrawlMode::Verify, 0, 3)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("too few items"), "{err}");
    h.shutdown().await
}

#[tokio::test]
async fn test_bump_and_edit_show_up_everywhere() -> anyhow::Result<()> {
    let h = harness(0, Quirks::default()).await?;
    let seller = h.login(2).await?;

    let first = sell(&h.ctx, &seller, 500).await?.item;
    sell(&h.ctx, &seller, 600).await?;
    let bumped = bump(&h.ctx, &seller, first.id).await?;

    let newest = find_item(&seller, Listing::NewItems, first.id, 1).await?;
    expect_bumped(&newest, &bumped, "GET /new_items.json")?;
    let in_category = find_in_category(&h.ctx, &seller, &bumped, 1).await?;
    expect_bumped(&in_category, &bumped, "GET /new_items/{id}.json")?;

    edit_price(&h.ctx, &seller, first.id, 510).await?;
    let edited = h.ctx.store.get_item(seller.user_id, first.id).ok_or_else(|| anyhow::anyhow!("edited item"))?;
    assert_eq!(edited.price, 510);

    let err = edit_price(&h.ctx, &seller, first.id, 99).await.unwrap_err();
    assert!(err.to_string().contains("POST /items/edit"), "{err}");
    h.shutdown().await
}

#[tokio::test]
async fn test_campaign_has_a_single_winner() -> anyhow::Result<()> {
    let h = harness(1, Quirks::default()).await?;
    for id in 20..=LAST_BUYER {
        let session = h.login(id).await?;
        h.ctx.buyers.enqueue(session);
    }

    assert!(popular_listing(&h.ctx, 50, 1000).await);
    assert!(h.ctx.failures.is_empty(), "{:?}", h.ctx.failures.messages());
    let buys = h.market.buy_counts();
    assert_eq!(buys.bought, 1, "{buys:?}");
    assert_eq!(buys.not_for_sale + buys.declined, 49, "{buys:?}");
    assert_eq!(final_check(&h.ctx).await, 1000);
    h.shutdown().await
}

#[tokio::test]
async fn test_campaign_without_a_winner_is_critical() -> anyhow::Result<()> {
    let h = harness(1, Quirks { refuse_purchases: true, ..Quirks::default() }).await?;
    for id in 40..=70 {
        let session = h.login(id).await?;
        h.ctx.buyers.enqueue(session);
    }

    assert!(!popular_listing(&h.ctx, 20, 1000).await);
    let (messages, counts) = h.ctx.failures.snapshot();
    assert_eq!(counts.critical, 1, "{messages:?}");
    assert!(messages[0].starts_with("all users failed to buy item"), "{messages:?}");
    assert_eq!(h.market.buy_counts().bought, 0);
    h.shutdown().await
}

#[tokio::test]
async fn test_campaign_skips_without_enough_buyers() -> anyhow::Result<()> {
    let h = harness(1, Quirks::default()).await?;
    for id in 40..45 {
        let session = h.login(id).await?;
        h.ctx.buyers.enqueue(session);
    }

    assert!(!popular_listing(&h.ctx, 20, 1000).await);
    assert!(h.ctx.failures.is_empty());
    assert!(h.ctx.payment.reports().is_empty());
    h.shutdown().await
}

#[tokio::test]
async fn test_item_sold_twice_is_critical() -> anyhow::Result<()> {
    let h = harness(1, Quirks { double_sale: true, ..Quirks::default() }).await?;
    for id in 40..=70 {
        let session = h.login(id).await?;
        h.ctx.buyers.enqueue(session);
    }

    popular_listing(&h.ctx, 20, 1000).await;
    assert!(h.ctx.failures.counts().critical > 0);
    assert!(
        h.ctx.failures.messages().iter().any(|m| m.contains("could buy it as well")),
        "{:?}",
        h.ctx.failures.messages()
    );
    h.shutdown().await
}

#[tokio::test]
async fn test_initialize_reports_campaign_and_language() -> anyhow::Result<()> {
    let h = harness(2, Quirks::default()).await?;
    let response = initialize(&h.ctx).await?;
    assert_eq!(response.campaign, 2);
    assert_eq!(response.language, "rust");
    h.shutdown().await
}

#[tokio::test]
async fn test_out_of_range_campaign_fails_the_run() -> anyhow::Result<()> {
    let h = harness(9, Quirks::default()).await?;
    let output = run_bench(Arc::clone(&h.ctx), &h.simulators).await;

    assert!(!output.pass);
    assert_eq!(output.score, 0);
    assert_eq!(output.messages, vec!["POST /initialize: campaign rate must be between 0 and 4".to_string()]);
    h.shutdown().await
}
