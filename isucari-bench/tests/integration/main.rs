//! Pagination verifier and scoring against hand-built listings.

use axum::extract::{Path, Query};
use axum::routing::get;
use axum::{Json, Router};
use isucari_bench::scenario::crawl::{crawl, verify_listing, CrawlMode, Listing};
use isucari_bench::score::settle;
use isucari_bench::BenchContext;
use isucari_core::types::limits;
use isucari_core::{AppCategory, AppItem, AppUser, AssetData, AssetStore, BenchConfig, Error, FailureAggregator};
use isucari_external::{PaymentService, ShipmentService};
use isucari_session::{Session, TargetUrls, DEFAULT_API_TIMEOUT};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const TOP_ID: i64 = 1_000_000;

async fn spawn(app: Router) -> anyhow::Result<Arc<TargetUrls>> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let base = format!("http://{addr}");
    Ok(Arc::new(TargetUrls::new(&base, "isucari.test", &base, &base)?))
}

fn store() -> AssetStore {
    let data = AssetData {
        users: vec![AppUser { id: 5, account_name: "seller".into(), num_sell_items: 1, ..AppUser::default() }],
        items: vec![AppItem {
            id: 77,
            seller_id: 5,
            status: "on_sale".into(),
            name: "teapot".into(),
            price: 100,
            description: "cast iron".into(),
            category_id: 10,
            created_at: 50,
            ..AppItem::default()
        }],
        categories: vec![
            AppCategory { id: 1, parent_id: 0, category_name: "kitchen".into(), ..AppCategory::default() },
            AppCategory { id: 10, parent_id: 1, category_name: "pots".into(), ..AppCategory::default() },
        ],
        ..AssetData::default()
    };
    AssetStore::from_parts(data, 1)
}

fn context(urls: Arc<TargetUrls>) -> BenchContext {
    let failures = Arc::new(FailureAggregator::new());
    BenchContext::new(
        BenchConfig::default(),
        Arc::new(store()),
        urls,
        Arc::new(PaymentService::new(Duration::from_secs(300), Arc::clone(&failures))),
        Arc::new(ShipmentService::new(Duration::from_secs(5))),
        failures,
    )
}

fn item(id: i64, created_at: i64) -> Value {
    json!({"id": id, "seller_id": 5, "status": "on_sale", "name": format!("item {id}"), "price": 100,
           "category_id": 10, "created_at": created_at})
}

/// A listing that never ends: every page is full and points to another.
fn endless() -> Router {
    Router::new().route(
        "/new_items.json",
        get(|Query(q): Query<HashMap<String, i64>>| async move {
            let last = q.get("item_id").copied().unwrap_or(TOP_ID + 1);
            let items: Vec<Value> = (1..=48).map(|n| item(last - n, last - n)).collect();
            Json(json!({"has_next": true, "items": items}))
        }),
    )
}

#[tokio::test]
async fn test_crawl_stops_at_the_page_cap() -> anyhow::Result<()> {
    let urls = spawn(endless()).await?;
    let ctx = context(Arc::clone(&urls));
    let session = Session::new(urls, DEFAULT_API_TIMEOUT)?;

    let crawled = crawl(&ctx, &session, Listing::NewItems, CrawlMode::Load, 0).await?;
    assert_eq!(crawled.pages, limits::MAX_CRAWL_PAGES);
    assert!(!crawled.bounded);
    assert_eq!(crawled.ids.len(), limits::MAX_CRAWL_PAGES * limits::ITEMS_PER_PAGE);
    Ok(())
}

#[tokio::test]
async fn test_crawl_honors_max_page() -> anyhow::Result<()> {
    let urls = spawn(endless()).await?;
    let ctx = context(Arc::clone(&urls));
    let session = Session::new(urls, DEFAULT_API_TIMEOUT)?;

    let crawled = crawl(&ctx, &session, Listing::NewItems, CrawlMode::Load, 3).await?;
    assert_eq!(crawled.pages, 3);
    assert!(crawled.bounded);
    assert_eq!(crawled.ids.len(), 144);
    Ok(())
}

#[tokio::test]
async fn test_short_last_page_ends_the_crawl() -> anyhow::Result<()> {
    let app = Router::new().route(
        "/new_items.json",
        get(|| async { Json(json!({"has_next": false, "items": [item(3, 30), item(2, 20)]})) }),
    );
    let urls = spawn(app).await?;
    let ctx = context(Arc::clone(&urls));
    let session = Session::new(urls, DEFAULT_API_TIMEOUT)?;

    let crawled = crawl(&ctx, &session, Listing::NewItems, CrawlMode::Load, 5).await?;
    assert_eq!(crawled.pages, 1);
    assert!(!crawled.bounded);
    assert_eq!(crawled.ids.len(), 2);
    Ok(())
}

async fn crawl_error(app: Router, listing: Listing, mode: CrawlMode) -> anyhow::Result<Error> {
    let urls = spawn(app).await?;
    let ctx = context(Arc::clone(&urls));
    let session = Session::new(urls, DEFAULT_API_TIMEOUT)?;
    match crawl(&ctx, &session, listing, mode, 0).await {
        Ok(_) => anyhow::bail!("crawl unexpectedly passed"),
        Err(e) => Ok(e),
    }
}

#[tokio::test]
async fn test_duplicate_item_is_reported() -> anyhow::Result<()> {
    let app = Router::new().route(
        "/new_items.json",
        get(|| async {
            let mut items: Vec<Value> = (1..=47).map(|id| item(100 - id, 10)).collect();
            items.push(item(99, 10));
            Json(json!({"has_next": true, "items": items}))
        }),
    );
    let err = crawl_error(app, Listing::NewItems, CrawlMode::Load).await?;
    assert_eq!(err.to_string(), "GET /new_items.json: item 99 is listed twice");
    Ok(())
}

#[tokio::test]
async fn test_partial_page_with_next_is_rejected() -> anyhow::Result<()> {
    let app = Router::new().route(
        "/new_items.json",
        get(|| async { Json(json!({"has_next": true, "items": [item(3, 30)]})) }),
    );
    let err = crawl_error(app, Listing::NewItems, CrawlMode::Load).await?;
    assert!(err.to_string().contains("expected 48 items per page; got 1"), "{err}");
    Ok(())
}

#[tokio::test]
async fn test_unsorted_page_is_rejected() -> anyhow::Result<()> {
    let app = Router::new().route(
        "/new_items.json",
        get(|| async { Json(json!({"has_next": false, "items": [item(3, 30), item(2, 40)]})) }),
    );
    let err = crawl_error(app, Listing::NewItems, CrawlMode::Load).await?;
    assert!(err.to_string().contains("not sorted by created_at"), "{err}");
    Ok(())
}

fn user_page(name: &'static str) -> Router {
    Router::new().route(
        "/users/:file",
        get(move |Path(file): Path<String>| async move {
            let user_id: i64 = file.trim_end_matches(".json").parse().unwrap_or_default();
            Json(json!({
                "user": {"id": user_id, "account_name": "seller", "num_sell_items": 1},
                "has_next": false,
                "items": [{
                    "id": 77, "seller_id": user_id, "status": "on_sale", "name": name, "price": 100,
                    "category_id": 10, "created_at": 50,
                    "category": {"id": 10, "parent_id": 1, "category_name": "pots", "parent_category_name": "kitchen"},
                }],
            }))
        }),
    )
}

#[tokio::test]
async fn test_listing_field_mismatch_is_reported() -> anyhow::Result<()> {
    let err = crawl_error(user_page("kettle"), Listing::User(5), CrawlMode::Check).await?;
    assert_eq!(err.to_string(), "GET /users/5.json: name of item 77 differs");
    Ok(())
}

#[tokio::test]
async fn test_user_page_matches_ground_truth() -> anyhow::Result<()> {
    let urls = spawn(user_page("teapot")).await?;
    let ctx = context(Arc::clone(&urls));
    let session = Session::new(urls, DEFAULT_API_TIMEOUT)?;

    verify_listing(&ctx, &session, Listing::User(5), CrawlMode::Check, 0, 0).await?;
    Ok(())
}

#[tokio::test]
async fn test_failures_flow_into_the_verdict() {
    let run = FailureAggregator::new();
    for _ in 0..3 {
        run.add(&Error::application("GET /new_items.json: item 1 is listed twice"));
    }
    for _ in 0..250 {
        run.add(&Error::trivial("POST /login: request timed out"));
    }
    let finals = FailureAggregator::new();

    let output = settle(100_000, run.snapshot(), finals.snapshot(), 0, "rust");
    assert!(output.pass);
    assert_eq!(output.score, 100_000 - 3 * 500 - 5000);
    assert_eq!(output.messages.len(), 2);

    run.add(&Error::critical("double payment detected (item_id: 1)"));
    let output = settle(100_000, run.snapshot(), finals.snapshot(), 0, "rust");
    assert!(!output.pass);
    assert_eq!(output.score, 0);
}
