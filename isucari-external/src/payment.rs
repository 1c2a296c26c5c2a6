//! # Payment Simulator
//!
//! Tokenizes card numbers for the browser (`/card`) and charges tokens for
//! the target application (`/token`). Tokens are single use and expire.
//!
//! The benchmarker can mint tokens bound to an item and price; charging such
//! a token records a payment report, which the final check compares with the
//! target's own reports.

use crate::error::{ApiError, ApiResult};
use axum::extract::State;
use axum::http::header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use isucari_core::constants::{FAILED_CARD_MARKER, PAYMENT_API_KEY, PAYMENT_SHOP_ID};
use isucari_core::{Error, FailureAggregator};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of charging a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Charged
    Ok,
    /// The card is declined
    Fail,
    /// Unknown, used or expired token
    Invalid,
    /// Charged amount differs from the forced price
    #[serde(rename = "wrong price")]
    WrongPrice,
}

/// What the benchmarker knows about one charged item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentReport {
    /// Charged price
    pub price: i64,
    /// Last transaction status the benchmarker observed, empty until set
    pub status: String,
}

#[derive(Debug, Clone)]
struct CardToken {
    number: String,
    expires_at: Instant,
    forced: Option<(i64, i64)>,
}

/// Single-use card tokens.
#[derive(Debug)]
pub struct CardTokenStore {
    ttl: Duration,
    items: Mutex<HashMap<String, CardToken>>,
}

impl CardTokenStore {
    /// Empty store whose tokens live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, items: Mutex::new(HashMap::new()) }
    }

    fn insert(&self, number: &str, forced: Option<(i64, i64)>) -> String {
        let token = hex::encode(rand::random::<[u8; 20]>());
        let card = CardToken { number: number.to_string(), expires_at: Instant::now() + self.ttl, forced };
        self.items.lock().insert(token.clone(), card);
        token
    }

    /// Remove `token` and return its card unless it expired before `now`.
    fn take_at(&self, token: &str, now: Instant) -> Option<CardToken> {
        let card = self.items.lock().remove(token)?;
        (now <= card.expires_at).then_some(card)
    }

    /// Number of unconsumed tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether no token is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Reports of charged items, keyed by item id.
#[derive(Debug, Default)]
pub struct ReportStore {
    items: Mutex<HashMap<i64, PaymentReport>>,
}

impl ReportStore {
    /// Record a charge; a second charge of the same item is a double payment.
    ///
    /// # Errors
    /// Returns a critical failure for a duplicate item id.
    pub fn record(&self, item_id: i64, price: i64) -> isucari_core::Result<()> {
        let mut items = self.items.lock();
        if items.contains_key(&item_id) {
            return Err(Error::critical(format!("double payment detected (item_id: {item_id})")));
        }
        items.insert(item_id, PaymentReport { price, status: String::new() });
        Ok(())
    }

    /// Update the observed status of a charged item.
    pub fn set_status(&self, item_id: i64, status: &str) {
        self.items.lock().entry(item_id).or_default().status = status.to_string();
    }

    /// Copy of all reports.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<i64, PaymentReport> {
        self.items.lock().clone()
    }
}

#[derive(Debug, Deserialize)]
struct CardRequest {
    card_number: String,
    shop_id: String,
}

#[derive(Debug, Serialize)]
struct CardResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    shop_id: String,
    token: String,
    api_key: String,
    price: i64,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    status: TokenStatus,
}

/// The payment simulator.
#[derive(Debug)]
pub struct PaymentService {
    tokens: CardTokenStore,
    reports: ReportStore,
    failures: Arc<FailureAggregator>,
}

impl PaymentService {
    /// Service with tokens living `token_ttl`; violations go to `failures`.
    #[must_use]
    pub fn new(token_ttl: Duration, failures: Arc<FailureAggregator>) -> Self {
        Self { tokens: CardTokenStore::new(token_ttl), reports: ReportStore::default(), failures }
    }

    /// Routes of the service.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/card", post(card).options(card))
            .route("/token", post(token))
            .with_state(self)
    }

    /// Mint a token bound to `item_id` and `price`.
    pub fn force_set(&self, card_number: &str, item_id: i64, price: i64) -> String {
        self.tokens.insert(card_number, Some((item_id, price)))
    }

    /// Update the status of a report.
    pub fn reports_set_status(&self, item_id: i64, status: &str) {
        self.reports.set_status(item_id, status);
    }

    /// Copy of all reports.
    #[must_use]
    pub fn reports(&self) -> HashMap<i64, PaymentReport> {
        self.reports.snapshot()
    }

    /// Card tokens.
    #[must_use]
    pub const fn tokens(&self) -> &CardTokenStore {
        &self.tokens
    }

    fn charge(&self, request: &TokenRequest, now: Instant) -> TokenStatus {
        let Some(card) = self.tokens.take_at(&request.token, now) else {
            return TokenStatus::Invalid;
        };
        if card.number.contains(FAILED_CARD_MARKER) {
            return TokenStatus::Fail;
        }
        let Some((item_id, price)) = card.forced else {
            return TokenStatus::Ok;
        };
        if price != request.price {
            self.failures.add(&Error::critical(format!(
                "wrong payment amount (expected: {price}; actual: {})",
                request.price
            )));
            return TokenStatus::WrongPrice;
        }
        if let Err(e) = self.reports.record(item_id, price) {
            self.failures.add(&e);
        }
        TokenStatus::Ok
    }
}

fn check_shop_id(shop_id: &str) -> ApiResult<()> {
    if shop_id == PAYMENT_SHOP_ID {
        Ok(())
    } else {
        Err(ApiError::bad_request("wrong shop id"))
    }
}

fn is_card_number(number: &str) -> bool {
    number.len() == 8 && number.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

fn issue_card_token(service: &PaymentService, body: &[u8]) -> ApiResult<String> {
    let request: CardRequest =
        serde_json::from_slice(body).map_err(|_| ApiError::bad_request("json decode error"))?;
    check_shop_id(&request.shop_id)?;
    if !is_card_number(&request.card_number) {
        return Err(ApiError::bad_request("card number is wrong"));
    }
    Ok(service.tokens.insert(&request.card_number, None))
}

async fn card(
    State(service): State<Arc<PaymentService>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut cors = HeaderMap::new();
    cors.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        headers.get(ORIGIN).cloned().unwrap_or_else(|| HeaderValue::from_static("*")),
    );
    cors.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));

    if method == Method::OPTIONS {
        return (StatusCode::OK, cors).into_response();
    }

    let result = issue_card_token(&service, &body);

    match result {
        Ok(token) => (cors, Json(CardResponse { token })).into_response(),
        Err(e) => (cors, e).into_response(),
    }
}

async fn token(State(service): State<Arc<PaymentService>>, body: Bytes) -> ApiResult<Response> {
    let request: TokenRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("json decode error"))?;
    check_shop_id(&request.shop_id)?;
    if request.api_key != PAYMENT_API_KEY {
        return Err(ApiError::bad_request("wrong api key"));
    }

    let status = service.charge(&request, Instant::now());
    debug!(?status, price = request.price, "charged token");
    let code = match status {
        TokenStatus::WrongPrice => StatusCode::FORBIDDEN,
        _ => StatusCode::OK,
    };
    Ok((code, Json(TokenResponse { status })).into_response())
}
