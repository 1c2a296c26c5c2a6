//! Deliberately invalid requests and the rejections they must produce.

use crate::session::{check_status, decode, expect_rejection, Session};
use crate::types::{LoginRequest, SettingsResponse};
use crate::webapp::SellForm;
use isucari_core::constants::messages;
use isucari_core::{Error, Result};
use reqwest::StatusCode;

/// A CSRF token the target cannot have issued.
fn forged_csrf_token() -> String {
    hex::encode(rand::random::<[u8; 20]>())
}

impl Session {
    /// `POST /login` with a wrong password must be answered 401 and must not
    /// log the session in.
    ///
    /// # Errors
    /// Returns a failure for any other answer, or when `/settings` shows a
    /// logged-in user afterwards.
    pub async fn login_with_wrong_password(&self, account_name: &str, password: &str) -> Result<()> {
        let label = "POST /login";
        let request = self.post_json("/login", &LoginRequest { account_name, password })?;
        let response = self.send(label, request).await?;
        expect_rejection(label, response, StatusCode::UNAUTHORIZED, None).await?;
        self.expect_logged_out(label).await
    }

    /// `GET /settings` must not report a user for this session. Any answer
    /// other than 200 counts as logged out.
    async fn expect_logged_out(&self, label: &str) -> Result<()> {
        let settings_label = "GET /settings";
        let response = self.send(settings_label, self.get("/settings")).await?;
        if response.status() != StatusCode::OK {
            return Ok(());
        }
        let settings: SettingsResponse = decode(settings_label, response).await?;
        match settings.user {
            Some(user) if user.id != 0 => Err(Error::application(format!(
                "{label}: a rejected login must not start a session (user_id: {})",
                user.id
            ))),
            _ => Ok(()),
        }
    }

    /// `POST /sell` with a forged CSRF token must be answered 422.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn sell_with_wrong_csrf_token(&self, form: &SellForm<'_>) -> Result<()> {
        let label = "POST /sell";
        let request = self.sell_request(form, &forged_csrf_token()).await?;
        let response = self.send(label, request).await?;
        check_status(label, response, StatusCode::UNPROCESSABLE_ENTITY).await?;
        Ok(())
    }

    /// `POST /sell` with an out-of-range price must be answered 400 with the
    /// price range message.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn sell_with_wrong_price(&self, form: &SellForm<'_>) -> Result<()> {
        let label = "POST /sell";
        let request = self.sell_request(form, &self.csrf_token).await?;
        let response = self.send(label, request).await?;
        expect_rejection(label, response, StatusCode::BAD_REQUEST, Some(messages::PRICE_OUT_OF_RANGE)).await
    }

    /// `POST /buy` with a forged CSRF token must be answered 422.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn buy_with_wrong_csrf_token(&self, item_id: i64, token: &str) -> Result<()> {
        let label = format!("POST /buy (item_id: {item_id})");
        let response = self.send_buy_with_csrf(&label, item_id, token, &forged_csrf_token()).await?;
        check_status(&label, response, StatusCode::UNPROCESSABLE_ENTITY).await?;
        Ok(())
    }

    /// `POST /buy` that must be rejected with `status` and `message`.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn buy_with_failed(
        &self,
        item_id: i64,
        token: &str,
        status: StatusCode,
        message: &str,
    ) -> Result<()> {
        let label = format!("POST /buy (item_id: {item_id})");
        let response = self.send_buy(&label, item_id, token).await?;
        expect_rejection(&label, response, status, Some(message)).await
    }

    /// `POST /buy` by a losing campaign racer: either 403 "item is not for
    /// sale" or 400 for a declined card.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn buy_with_failed_on_campaign(&self, item_id: i64, token: &str) -> Result<()> {
        let label = format!("POST /buy (item_id: {item_id})");
        let response = self.send_buy(&label, item_id, token).await?;
        match response.status() {
            StatusCode::BAD_REQUEST => {
                expect_rejection(&label, response, StatusCode::BAD_REQUEST, Some(messages::CARD_DECLINED)).await
            }
            _ => {
                expect_rejection(&label, response, StatusCode::FORBIDDEN, Some(messages::ITEM_NOT_FOR_SALE))
                    .await
            }
        }
    }

    /// `POST /ship` with a forged CSRF token must be answered 422.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn ship_with_wrong_csrf_token(&self, item_id: i64) -> Result<()> {
        let label = format!("POST /ship (item_id: {item_id})");
        let response = self.send_item_action(&label, "/ship", item_id, &forged_csrf_token()).await?;
        check_status(&label, response, StatusCode::UNPROCESSABLE_ENTITY).await?;
        Ok(())
    }

    /// `POST /ship` that must be rejected with `status` and `message`.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn ship_with_failed(&self, item_id: i64, status: StatusCode, message: &str) -> Result<()> {
        let label = format!("POST /ship (item_id: {item_id})");
        let response = self.send_item_action(&label, "/ship", item_id, &self.csrf_token).await?;
        expect_rejection(&label, response, status, Some(message)).await
    }

    /// `GET` of a QR path that must be answered with `status`.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn download_qr_with_failed(&self, path: &str, status: StatusCode) -> Result<()> {
        let label = format!("GET {path}");
        let response = self.send(&label, self.get(path)).await?;
        check_status(&label, response, status).await?;
        Ok(())
    }

    /// `POST /ship_done` with a forged CSRF token must be answered 422.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn ship_done_with_wrong_csrf_token(&self, item_id: i64) -> Result<()> {
        let label = format!("POST /ship_done (item_id: {item_id})");
        let response = self.send_item_action(&label, "/ship_done", item_id, &forged_csrf_token()).await?;
        check_status(&label, response, StatusCode::UNPROCESSABLE_ENTITY).await?;
        Ok(())
    }

    /// `POST /ship_done` that must be rejected with `status` and `message`.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn ship_done_with_failed(&self, item_id: i64, status: StatusCode, message: &str) -> Result<()> {
        let label = format!("POST /ship_done (item_id: {item_id})");
        let response = self.send_item_action(&label, "/ship_done", item_id, &self.csrf_token).await?;
        expect_rejection(&label, response, status, Some(message)).await
    }

    /// `POST /items/edit` of a sold item must be answered 403.
    ///
    /// # Errors
    /// Returns a failure for any other answer.
    pub async fn item_edit_with_not_on_sale(&self, item_id: i64, price: i64) -> Result<()> {
        let label = format!("POST /items/edit (item_id: {item_id})");
        let response = self.send_item_edit(&label, item_id, price).await?;
        expect_rejection(&label, response, StatusCode::FORBIDDEN, Some(messages::EDIT_NOT_ON_SALE)).await
    }
}
