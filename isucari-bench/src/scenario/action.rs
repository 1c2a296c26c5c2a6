//! Multi-step actions shared by the scenarios: listing an item and walking a
//! purchase through buy, ship, pickup, delivery and completion while the
//! ground truth and the payment reports follow along.

use crate::context::BenchContext;
use crate::scenario::crawl::{find_item, Listing};
use isucari_core::constants::CORRECT_CARD_NUMBER;
use isucari_core::types::{evidence_status, item_status};
use isucari_core::{md5_hex, AppItem, Error, Result};
use isucari_external::ShipmentStatus;
use isucari_session::{ItemDetail, SellForm, Session};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A listing the benchmarker created, with the image it uploaded.
#[derive(Debug, Clone)]
pub struct Listed {
    /// Ground-truth record
    pub item: AppItem,
    /// Uploaded file
    pub image: PathBuf,
}

/// List an item at `price` in a random leaf category.
///
/// # Errors
/// Returns a failure if the target rejects the listing.
pub async fn sell(ctx: &BenchContext, session: &Session, price: i64) -> Result<Listed> {
    let category = ctx
        .store
        .random_child_category()
        .ok_or_else(|| Error::internal("no leaf category in the dataset"))?;
    sell_in_category(ctx, session, price, category.id).await
}

/// List an item at `price` below the root category `parent_id`, falling back
/// to any leaf when the root has none.
///
/// # Errors
/// Returns a failure if the target rejects the listing.
pub async fn sell_in_parent(ctx: &BenchContext, session: &Session, price: i64, parent_id: i64) -> Result<Listed> {
    match ctx.store.random_child_category_of(parent_id) {
        Some(category) => sell_in_category(ctx, session, price, category.id).await,
        None => sell(ctx, session, price).await,
    }
}

/// List an item with generated text in `category_id` and record it.
///
/// # Errors
/// Returns a failure if the target rejects the listing.
pub async fn sell_in_category(
    ctx: &BenchContext,
    session: &Session,
    price: i64,
    category_id: i64,
) -> Result<Listed> {
    let image = ctx.store.next_image().ok_or_else(|| Error::internal("no upload image available"))?.to_path_buf();
    let name = ctx.store.gen_text(8, false);
    let description = ctx.store.gen_text(200, true);
    let form = SellForm { image: &image, name: &name, price, description: &description, category_id };
    let item_id = session.sell(&form).await?;

    ctx.store.set_item(session.user_id, item_id, &name, price, &description, category_id);
    let item = ctx
        .store
        .get_item(session.user_id, item_id)
        .ok_or_else(|| Error::internal(format!("item {item_id} vanished from the ground truth")))?;
    debug!(item_id, seller_id = session.user_id, price, "listed item");
    Ok(Listed { item, image })
}

/// Fail unless the seller shown with a fresh listing has more listings than
/// `before`.
///
/// # Errors
/// Returns an application failure for a stale count.
pub fn expect_sell_count_grew(found: &ItemDetail, before: i64) -> Result<()> {
    match &found.seller {
        Some(seller) if seller.num_sell_items > before => Ok(()),
        _ => Err(Error::application(format!(
            "GET /users/{}.json: num_sell_items is not updated",
            found.seller_id
        ))),
    }
}

/// Download the image of `item_id` and compare it with the uploaded file.
///
/// # Errors
/// Returns an application failure if the content differs.
pub async fn check_uploaded_image(session: &Session, item_id: i64, uploaded: &Path) -> Result<()> {
    let bytes = tokio::fs::read(uploaded)
        .await
        .map_err(|e| Error::Io { message: format!("{}: {e}", uploaded.display()) })?;
    let expected = md5_hex(&bytes);
    let item = session.item(item_id).await?;
    let actual = session.download_md5(&item.image_url).await?;
    if actual != expected {
        return Err(Error::application(format!("GET {}: uploaded image content is wrong", item.image_url)));
    }
    Ok(())
}

/// Change the price of a listing and mirror it.
///
/// # Errors
/// Returns a failure if the target rejects the edit or stores another price.
pub async fn edit_price(ctx: &BenchContext, seller: &Session, item_id: i64, price: i64) -> Result<()> {
    let stored = seller.item_edit(item_id, price).await?;
    if stored != price {
        return Err(Error::application(format!(
            "POST /items/edit (item_id: {item_id}): item_price is {stored}; expected {price}"
        )));
    }
    ctx.store.set_item_price(seller.user_id, item_id, price);
    Ok(())
}

/// Bump a listing and mirror its new listing time.
///
/// # Errors
/// Returns a failure if the target rejects the bump.
pub async fn bump(ctx: &BenchContext, seller: &Session, item_id: i64) -> Result<AppItem> {
    let created_at = seller.bump(item_id).await?;
    ctx.store
        .set_item_created_at(seller.user_id, item_id, created_at)
        .ok_or_else(|| Error::internal(format!("item {item_id} of user {} is not in the ground truth", seller.user_id)))
}

/// Fail unless a listing shows the bumped time.
///
/// # Errors
/// Returns an application failure for a stale `created_at`.
pub fn expect_bumped(found: &ItemDetail, item: &AppItem, source: &str) -> Result<()> {
    if found.created_at == item.created_at {
        Ok(())
    } else {
        Err(Error::application(format!("{source}: created_at of bumped item {} is not updated", item.id)))
    }
}

/// Buy `item_id` at `price` with the card that always succeeds.
///
/// # Errors
/// Returns a failure if the purchase is rejected.
pub async fn buy(ctx: &BenchContext, buyer: &Session, item_id: i64, price: i64) -> Result<i64> {
    let token = ctx.payment.force_set(CORRECT_CARD_NUMBER, item_id, price);
    let evidence_id = buyer.buy(item_id, &token).await?;
    record_purchase(ctx, buyer, item_id);
    Ok(evidence_id)
}

/// Mirror a successful purchase.
pub fn record_purchase(ctx: &BenchContext, buyer: &Session, item_id: i64) {
    ctx.store.user_buy_item(buyer.user_id);
    ctx.payment.reports_set_status(item_id, evidence_status::WAIT_SHIPPING);
}

/// Fetch the pickup QR code, let the carrier pick the parcel up and check
/// that the target served the QR code the shipment service rendered.
///
/// # Errors
/// Returns an application failure for an unknown reservation or a wrong QR
/// code.
pub async fn pick_up(ctx: &BenchContext, seller: &Session, item_id: i64, reserve_id: &str, qr_path: &str) -> Result<()> {
    let md5 = seller.download_md5(qr_path).await?;
    if !ctx.shipment.force_set_status(reserve_id, ShipmentStatus::Shipping) {
        return Err(Error::application(format!(
            "POST /ship (item_id: {item_id}): reserve_id {reserve_id} is unknown to the shipment service"
        )));
    }
    if !ctx.shipment.check_qr_md5(reserve_id, &md5) {
        return Err(Error::application(format!("GET {qr_path}: QR code image is wrong")));
    }
    Ok(())
}

/// `ship_done` and its report status.
///
/// # Errors
/// Returns a failure if the target rejects it.
pub async fn ship_done(ctx: &BenchContext, seller: &Session, item_id: i64) -> Result<()> {
    seller.ship_done(item_id).await?;
    ctx.payment.reports_set_status(item_id, evidence_status::WAIT_DONE);
    Ok(())
}

/// Let the carrier deliver the parcel.
///
/// # Errors
/// Returns an application failure for an unknown reservation.
pub fn deliver(ctx: &BenchContext, item_id: i64, reserve_id: &str) -> Result<()> {
    if ctx.shipment.force_set_status(reserve_id, ShipmentStatus::Done) {
        Ok(())
    } else {
        Err(Error::application(format!(
            "POST /ship_done (item_id: {item_id}): reserve_id {reserve_id} is unknown to the shipment service"
        )))
    }
}

/// `complete` and its report status.
///
/// # Errors
/// Returns a failure if the target rejects it.
pub async fn complete(ctx: &BenchContext, buyer: &Session, item_id: i64) -> Result<()> {
    buyer.complete(item_id).await?;
    ctx.payment.reports_set_status(item_id, evidence_status::DONE);
    Ok(())
}

/// Everything after a successful `/buy`: ship, pickup, ship_done, delivery,
/// complete.
///
/// # Errors
/// Returns the first failure.
pub async fn finish_transaction(ctx: &BenchContext, seller: &Session, buyer: &Session, item_id: i64) -> Result<()> {
    let (reserve_id, qr_path) = seller.ship(item_id).await?;
    pick_up(ctx, seller, item_id, &reserve_id, &qr_path).await?;
    ship_done(ctx, seller, item_id).await?;
    deliver(ctx, item_id, &reserve_id)?;
    complete(ctx, buyer, item_id).await
}

/// Step of a transaction after which its state is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// After `/buy`
    Bought,
    /// After `/ship`
    Shipped,
    /// After `/ship_done`
    ShipDone,
    /// After `/complete`
    Completed,
}

impl Stage {
    /// Expected `(item status, evidence status, shipping status)`.
    #[must_use]
    pub const fn expected(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Bought => (item_status::TRADING, evidence_status::WAIT_SHIPPING, ShipmentStatus::Initial.as_str()),
            Self::Shipped => {
                (item_status::TRADING, evidence_status::WAIT_SHIPPING, ShipmentStatus::WaitPickup.as_str())
            },
            Self::ShipDone => (item_status::TRADING, evidence_status::WAIT_DONE, ShipmentStatus::Shipping.as_str()),
            Self::Completed => (item_status::SOLD_OUT, evidence_status::DONE, ShipmentStatus::Done.as_str()),
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Bought => "after buy",
            Self::Shipped => "after ship",
            Self::ShipDone => "after ship_done",
            Self::Completed => "after complete",
        }
    }
}

fn check_stage(item: &ItemDetail, source: &str, stage: Stage) -> Result<()> {
    let (status, evidence, shipping) = stage.expected();
    if item.status != status || item.transaction_evidence_status != evidence || item.shipping_status != shipping {
        return Err(Error::application_with(
            format!("{source}: item {} is in the wrong state {}", item.id, stage.label()),
            format!(
                "expected {status}/{evidence}/{shipping}; got {}/{}/{}",
                item.status, item.transaction_evidence_status, item.shipping_status
            ),
        ));
    }
    if item.transaction_evidence_id == 0 {
        return Err(Error::application(format!("{source}: transaction_evidence_id of item {} is empty", item.id)));
    }
    Ok(())
}

/// Check the state of `item_id` from both sides of the transaction, through
/// the item endpoint and the transactions listing.
///
/// # Errors
/// Returns an application failure if any view disagrees with `stage`.
pub async fn expect_stage(seller: &Session, buyer: &Session, item_id: i64, stage: Stage) -> Result<()> {
    for session in [buyer, seller] {
        let listed = find_item(session, Listing::Transactions, item_id, 0).await?;
        check_stage(&listed, "GET /users/transactions.json", stage)?;
        let item = session.item(item_id).await?;
        check_stage(&item, &format!("GET /items/{item_id}.json"), stage)?;
        if item.buyer_id != buyer.user_id {
            return Err(Error::application(format!("GET /items/{item_id}.json: buyer_id is wrong")));
        }
    }
    Ok(())
}

/// Buy and complete `item_id`, checking both sides after every step.
///
/// # Errors
/// Returns the first failure.
pub async fn buy_complete_with_verify(
    ctx: &BenchContext,
    seller: &Session,
    buyer: &Session,
    item_id: i64,
    price: i64,
) -> Result<()> {
    buy(ctx, buyer, item_id, price).await?;
    expect_stage(seller, buyer, item_id, Stage::Bought).await?;

    let (reserve_id, qr_path) = seller.ship(item_id).await?;
    expect_stage(seller, buyer, item_id, Stage::Shipped).await?;
    pick_up(ctx, seller, item_id, &reserve_id, &qr_path).await?;

    ship_done(ctx, seller, item_id).await?;
    expect_stage(seller, buyer, item_id, Stage::ShipDone).await?;

    deliver(ctx, item_id, &reserve_id)?;
    complete(ctx, buyer, item_id).await?;
    expect_stage(seller, buyer, item_id, Stage::Completed).await
}

async fn expect_user_page_status(seller: &Session, item_id: i64, status: &str) -> Result<()> {
    let found = find_item(seller, Listing::User(seller.user_id), item_id, 1).await?;
    if found.status != status {
        return Err(Error::application(format!(
            "GET /users/{}.json: item {item_id} is {}; expected {status}",
            seller.user_id, found.status
        )));
    }
    Ok(())
}

/// Buy and complete `item_id`, checking the status on the seller's page only.
///
/// # Errors
/// Returns the first failure.
pub async fn buy_complete(ctx: &BenchContext, seller: &Session, buyer: &Session, item_id: i64, price: i64) -> Result<()> {
    buy(ctx, buyer, item_id, price).await?;
    expect_user_page_status(seller, item_id, item_status::TRADING).await?;
    finish_transaction(ctx, seller, buyer, item_id).await?;
    expect_user_page_status(seller, item_id, item_status::SOLD_OUT).await
}
