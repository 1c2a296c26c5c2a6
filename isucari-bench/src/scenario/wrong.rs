//! Wrong inputs: requests the target must reject, interleaved with a
//! purchase that has to go through regardless.

use crate::context::BenchContext;
use crate::scenario::action::{
    check_uploaded_image, complete, deliver, pick_up, record_purchase, sell, ship_done,
};
use isucari_core::constants::{messages, CORRECT_CARD_NUMBER, FAILED_CARD_NUMBER};
use isucari_core::types::limits;
use isucari_core::{AppUser, Error, Result};
use isucari_session::{SellForm, Session, StatusCode};

/// A wrong password must be answered 401.
///
/// # Errors
/// Returns an application failure for any other answer.
pub async fn login_with_wrong_password(ctx: &BenchContext, user: &AppUser) -> Result<()> {
    let session = ctx.new_session()?;
    let password = format!("{}-wrong", user.password);
    session.login_with_wrong_password(&user.account_name, &password).await
}

/// Exercise every rejection of the sell, buy and ship flow while `s1` sells an
/// item that `user3` buys.
///
/// # Errors
/// Returns the first failure.
pub async fn irregular_sell_and_buy(ctx: &BenchContext, s1: &Session, s2: &Session, user3: &AppUser) -> Result<()> {
    let image = ctx.store.next_image().ok_or_else(|| Error::internal("no upload image available"))?;
    let name = ctx.store.gen_text(8, false);
    let description = ctx.store.gen_text(200, true);
    let category = ctx
        .store
        .random_child_category()
        .ok_or_else(|| Error::internal("no leaf category in the dataset"))?;
    let mut form = SellForm { image, name: &name, price: limits::ITEM_MIN_PRICE, description: &description, category_id: category.id };

    s1.sell_with_wrong_csrf_token(&form).await?;
    form.price = limits::ITEM_MIN_PRICE - 1;
    s1.sell_with_wrong_price(&form).await?;
    form.price = limits::ITEM_MAX_PRICE + 1;
    s1.sell_with_wrong_price(&form).await?;

    let price = ctx.prices.get();
    let listed = sell(ctx, s1, price).await?;
    let item_id = listed.item.id;
    check_uploaded_image(s1, item_id, &listed.image).await?;

    s1.buy_with_failed(item_id, "", StatusCode::FORBIDDEN, messages::CANNOT_BUY_OWN_ITEM).await?;
    let failing = ctx.payment.force_set(FAILED_CARD_NUMBER, item_id, price);
    s2.buy_with_failed(item_id, &failing, StatusCode::BAD_REQUEST, messages::CARD_DECLINED).await?;
    let token = ctx.payment.force_set(CORRECT_CARD_NUMBER, item_id, price);
    s2.buy_with_wrong_csrf_token(item_id, &token).await?;

    let s3 = ctx.login(user3).await?;
    let token = ctx.payment.force_set(CORRECT_CARD_NUMBER, item_id, price);
    let evidence_id = s3.buy(item_id, &token).await?;
    record_purchase(ctx, &s3, item_id);

    let token = ctx.payment.force_set(CORRECT_CARD_NUMBER, item_id, price);
    s2.buy_with_failed(item_id, &token, StatusCode::FORBIDDEN, messages::ITEM_NOT_FOR_SALE).await?;
    s1.item_edit_with_not_on_sale(item_id, price + 10).await?;

    s1.download_qr_with_failed(&format!("/transactions/{evidence_id}.png"), StatusCode::FORBIDDEN).await?;
    s1.ship_with_wrong_csrf_token(item_id).await?;
    s3.ship_with_failed(item_id, StatusCode::FORBIDDEN, messages::FORBIDDEN).await?;

    let (reserve_id, qr_path) = s1.ship(item_id).await?;
    s3.download_qr_with_failed(&qr_path, StatusCode::FORBIDDEN).await?;
    s1.download_md5(&qr_path).await?;
    s1.ship_done_with_failed(item_id, StatusCode::FORBIDDEN, messages::SHIPMENT_NOT_PICKED_UP).await?;

    pick_up(ctx, s1, item_id, &reserve_id, &qr_path).await?;
    s3.ship_done_with_failed(item_id, StatusCode::FORBIDDEN, messages::FORBIDDEN).await?;
    s1.ship_done_with_wrong_csrf_token(item_id).await?;
    ship_done(ctx, s1, item_id).await?;

    deliver(ctx, item_id, &reserve_id)?;
    complete(ctx, &s3, item_id).await
}
