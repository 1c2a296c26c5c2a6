//! Regular actions against the target application.
//!
//! Every action checks the status code and decodes the body; semantic checks
//! of the returned data belong to the scenarios.

use crate::session::{check_status, decode, expect_rejection, Session};
use crate::types::{
    BuyRequest, BuyResponse, InitializeRequest, InitializeResponse, ItemDetail, ItemEditRequest,
    ItemEditResponse, ItemRequest, LoginRequest, NewItemsPage, PageCursor, SellResponse,
    SettingsResponse, ShipResponse, TransactionEvidence, TransactionsPage, User, UserItemsPage,
};
use isucari_core::constants::messages;
use isucari_core::{Error, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Outcome of a purchase attempt that may legitimately lose a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyOutcome {
    /// Bought; carries the transaction evidence id
    Bought(i64),
    /// Someone else was faster
    SoldOut,
}

/// Form fields of a listing.
#[derive(Debug, Clone)]
pub struct SellForm<'a> {
    /// Image file uploaded as `upload.jpg`
    pub image: &'a Path,
    /// Item name
    pub name: &'a str,
    /// Price
    pub price: i64,
    /// Description
    pub description: &'a str,
    /// Leaf category id
    pub category_id: i64,
}

impl Session {
    /// `POST /initialize` with the simulator URLs.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200 with valid JSON.
    pub async fn initialize(&self, timeout: Duration) -> Result<InitializeResponse> {
        let label = "POST /initialize";
        let payment = self.urls().payment_url.to_string();
        let shipment = self.urls().shipment_url.to_string();
        let request = self
            .post_json(
                "/initialize",
                &InitializeRequest {
                    payment_service_url: payment.trim_end_matches('/'),
                    shipment_service_url: shipment.trim_end_matches('/'),
                },
            )?
            .timeout(timeout);
        let response = self.send(label, request).await?;
        let response = check_status(label, response, StatusCode::OK).await?;
        decode(label, response).await
    }

    /// `POST /login`, then `GET /settings` to pick up the CSRF token.
    ///
    /// # Errors
    /// Returns a failure for a non-200 answer or unusable settings.
    pub async fn login(&mut self, account_name: &str, password: &str) -> Result<User> {
        let label = "POST /login";
        let request = self.post_json("/login", &LoginRequest { account_name, password })?;
        let response = self.send(label, request).await?;
        let response = check_status(label, response, StatusCode::OK).await?;
        let user: User = decode(label, response).await?;
        self.set_settings().await?;
        debug!(user_id = self.user_id, "logged in");
        Ok(user)
    }

    /// `GET /settings`; stores the user id and CSRF token.
    ///
    /// # Errors
    /// Returns a failure for a non-200 answer, an empty token or a missing user.
    pub async fn set_settings(&mut self) -> Result<()> {
        let label = "GET /settings";
        let response = self.send(label, self.get("/settings")).await?;
        let response = check_status(label, response, StatusCode::OK).await?;
        let settings: SettingsResponse = decode(label, response).await?;
        if settings.csrf_token.is_empty() {
            return Err(Error::application(format!("{label}: csrf token is empty")));
        }
        let user_id = settings.user.map_or(0, |u| u.id);
        if user_id == 0 {
            return Err(Error::application(format!("{label}: user is empty")));
        }
        self.user_id = user_id;
        self.csrf_token = settings.csrf_token;
        Ok(())
    }

    pub(crate) async fn sell_request(&self, form: &SellForm<'_>, csrf_token: &str) -> Result<RequestBuilder> {
        let image = tokio::fs::read(form.image).await.map_err(|e| Error::Io {
            message: format!("{}: {e}", form.image.display()),
        })?;
        let part = Part::bytes(image)
            .file_name("upload.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| Error::internal(format!("invalid mime type: {e}")))?;
        let multipart = Form::new()
            .part("image", part)
            .text("csrf_token", csrf_token.to_string())
            .text("name", form.name.to_string())
            .text("description", form.description.to_string())
            .text("price", form.price.to_string())
            .text("category_id", form.category_id.to_string());
        Ok(self.post("/sell").multipart(multipart))
    }

    /// `POST /sell`; returns the new item id.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200 with an id.
    pub async fn sell(&self, form: &SellForm<'_>) -> Result<i64> {
        let label = "POST /sell";
        let request = self.sell_request(form, &self.csrf_token).await?;
        let response = self.send(label, request).await?;
        let response = check_status(label, response, StatusCode::OK).await?;
        let sold: SellResponse = decode(label, response).await?;
        Ok(sold.id)
    }

    /// `POST /buy`; returns the transaction evidence id.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200.
    pub async fn buy(&self, item_id: i64, token: &str) -> Result<i64> {
        let label = format!("POST /buy (item_id: {item_id})");
        let response = self.send_buy(&label, item_id, token).await?;
        let response = check_status(&label, response, StatusCode::OK).await?;
        let bought: BuyResponse = decode(&label, response).await?;
        Ok(bought.transaction_evidence_id)
    }

    /// `POST /buy` where losing a race with another buyer is acceptable.
    ///
    /// # Errors
    /// Returns a failure for anything but 200 or 403 "item is not for sale".
    pub async fn buy_may_fail(&self, item_id: i64, token: &str) -> Result<BuyOutcome> {
        let label = format!("POST /buy (item_id: {item_id})");
        let response = self.send_buy(&label, item_id, token).await?;
        if response.status() == StatusCode::FORBIDDEN {
            expect_rejection(&label, response, StatusCode::FORBIDDEN, Some(messages::ITEM_NOT_FOR_SALE))
                .await?;
            return Ok(BuyOutcome::SoldOut);
        }
        let response = check_status(&label, response, StatusCode::OK).await?;
        let bought: BuyResponse = decode(&label, response).await?;
        Ok(BuyOutcome::Bought(bought.transaction_evidence_id))
    }

    pub(crate) async fn send_buy(&self, label: &str, item_id: i64, token: &str) -> Result<Response> {
        self.send_buy_with_csrf(label, item_id, token, &self.csrf_token).await
    }

    pub(crate) async fn send_buy_with_csrf(
        &self,
        label: &str,
        item_id: i64,
        token: &str,
        csrf_token: &str,
    ) -> Result<Response> {
        let request = self.post_json("/buy", &BuyRequest { csrf_token, item_id, token })?;
        self.send(label, request).await
    }

    pub(crate) async fn send_item_action(
        &self,
        label: &str,
        path: &str,
        item_id: i64,
        csrf_token: &str,
    ) -> Result<Response> {
        let request = self.post_json(path, &ItemRequest { csrf_token, item_id })?;
        self.send(label, request).await
    }

    /// `POST /ship`; returns `(reserve_id, qr_path)`.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200 with a QR path.
    pub async fn ship(&self, item_id: i64) -> Result<(String, String)> {
        let label = format!("POST /ship (item_id: {item_id})");
        let response = self.send_item_action(&label, "/ship", item_id, &self.csrf_token).await?;
        let response = check_status(&label, response, StatusCode::OK).await?;
        let shipped: ShipResponse = decode(&label, response).await?;
        if shipped.path.is_empty() {
            return Err(Error::application(format!("{label}: path is empty")));
        }
        Ok((shipped.reserve_id, shipped.path))
    }

    /// `POST /ship_done`.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200.
    pub async fn ship_done(&self, item_id: i64) -> Result<()> {
        let label = format!("POST /ship_done (item_id: {item_id})");
        let response = self.send_item_action(&label, "/ship_done", item_id, &self.csrf_token).await?;
        check_status(&label, response, StatusCode::OK).await?;
        Ok(())
    }

    /// `POST /complete`.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200.
    pub async fn complete(&self, item_id: i64) -> Result<()> {
        let label = format!("POST /complete (item_id: {item_id})");
        let response = self.send_item_action(&label, "/complete", item_id, &self.csrf_token).await?;
        check_status(&label, response, StatusCode::OK).await?;
        Ok(())
    }

    /// `POST /bump`; returns the new listing time.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200.
    pub async fn bump(&self, item_id: i64) -> Result<i64> {
        let label = format!("POST /bump (item_id: {item_id})");
        let response = self.send_item_action(&label, "/bump", item_id, &self.csrf_token).await?;
        let response = check_status(&label, response, StatusCode::OK).await?;
        let edited: ItemEditResponse = decode(&label, response).await?;
        Ok(edited.item_created_at)
    }

    pub(crate) async fn send_item_edit(&self, label: &str, item_id: i64, price: i64) -> Result<Response> {
        let request = self.post_json(
            "/items/edit",
            &ItemEditRequest { csrf_token: &self.csrf_token, item_id, item_price: price },
        )?;
        self.send(label, request).await
    }

    /// `POST /items/edit`; returns the price the target stored.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200.
    pub async fn item_edit(&self, item_id: i64, price: i64) -> Result<i64> {
        let label = format!("POST /items/edit (item_id: {item_id})");
        let response = self.send_item_edit(&label, item_id, price).await?;
        let response = check_status(&label, response, StatusCode::OK).await?;
        let edited: ItemEditResponse = decode(&label, response).await?;
        Ok(edited.item_price)
    }

    /// `GET /new_items.json`, optionally after `cursor`.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200 with a page.
    pub async fn new_items(&self, cursor: Option<PageCursor>) -> Result<NewItemsPage> {
        self.get_page("GET /new_items.json", "/new_items.json", cursor).await
    }

    /// `GET /new_items/{root_category_id}.json`, optionally after `cursor`.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200 with a page.
    pub async fn new_category_items(
        &self,
        root_category_id: i64,
        cursor: Option<PageCursor>,
    ) -> Result<NewItemsPage> {
        let path = format!("/new_items/{root_category_id}.json");
        self.get_page(&format!("GET {path}"), &path, cursor).await
    }

    /// `GET /users/{user_id}.json`, optionally after `cursor`.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200 with a page.
    pub async fn user_items(&self, user_id: i64, cursor: Option<PageCursor>) -> Result<UserItemsPage> {
        let path = format!("/users/{user_id}.json");
        self.get_page(&format!("GET {path}"), &path, cursor).await
    }

    /// `GET /users/transactions.json`, optionally after `cursor`.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200 with a page.
    pub async fn user_transactions(&self, cursor: Option<PageCursor>) -> Result<TransactionsPage> {
        self.get_page("GET /users/transactions.json", "/users/transactions.json", cursor).await
    }

    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        label: &str,
        path: &str,
        cursor: Option<PageCursor>,
    ) -> Result<T> {
        let mut request = self.get(path);
        if let Some(cursor) = cursor {
            request = request.query(&[("item_id", cursor.item_id), ("created_at", cursor.created_at)]);
        }
        let response = self.send(label, request).await?;
        let response = check_status(label, response, StatusCode::OK).await?;
        decode(label, response).await
    }

    /// `GET /items/{item_id}.json`.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200 with an item.
    pub async fn item(&self, item_id: i64) -> Result<ItemDetail> {
        let path = format!("/items/{item_id}.json");
        let label = format!("GET {path}");
        let response = self.send(&label, self.get(&path)).await?;
        let response = check_status(&label, response, StatusCode::OK).await?;
        decode(&label, response).await
    }

    /// `GET /reports.json`.
    ///
    /// # Errors
    /// Returns a failure unless the target answers 200 with a list.
    pub async fn reports(&self) -> Result<Vec<TransactionEvidence>> {
        let label = "GET /reports.json";
        let response = self.send(label, self.get("/reports.json")).await?;
        let response = check_status(label, response, StatusCode::OK).await?;
        decode(label, response).await
    }
}
