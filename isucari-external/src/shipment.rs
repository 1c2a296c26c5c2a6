//! # Shipment Simulator
//!
//! Reservations move `initial -> wait_pickup -> shipping -> done` and never
//! move back. `/request` renders the pickup QR code, `/accept` is what the
//! carrier opens when scanning it, and `done` is reached lazily: a
//! reservation reports `done` on every read after its scheduled time.

use crate::error::{ApiError, ApiResult};
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Luma};
use isucari_core::constants::{SHIPMENT_API_TOKEN, SHIPMENT_SECRET_SEED};
use isucari_core::{md5_hex, Error, Result};
use parking_lot::Mutex;
use qrcode::{EcLevel, QrCode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Side length of the rendered QR code in pixels.
pub const QR_SIZE: u32 = 256;

/// Reservation status, ordered by progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// Reserved, not requested yet
    Initial,
    /// Waiting for the carrier
    WaitPickup,
    /// On its way
    Shipping,
    /// Delivered
    Done,
}

impl ShipmentStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::WaitPickup => "wait_pickup",
            Self::Shipping => "shipping",
            Self::Done => "done",
        }
    }
}

/// One reservation.
#[derive(Debug, Clone)]
pub struct Reservation {
    /// Recipient address
    pub to_address: String,
    /// Recipient name
    pub to_name: String,
    /// Sender address
    pub from_address: String,
    /// Sender name
    pub from_name: String,
    /// Stored status; see [`Reservation::status_at`]
    pub status: ShipmentStatus,
    /// md5 of the last rendered QR code
    pub qr_md5: String,
    /// Reservation time, unix seconds
    pub reserve_time: i64,
    /// When `shipping` turns into `done`
    pub done_at: Option<Instant>,
}

impl Reservation {
    /// Status as observed at `now`.
    #[must_use]
    pub fn status_at(&self, now: Instant) -> ShipmentStatus {
        match (self.status, self.done_at) {
            (ShipmentStatus::Shipping, Some(done_at)) if now >= done_at => ShipmentStatus::Done,
            (status, _) => status,
        }
    }
}

/// Reservations keyed by reserve id.
#[derive(Debug, Default)]
pub struct ShipmentStore {
    items: Mutex<HashMap<String, Reservation>>,
}

impl ShipmentStore {
    /// Store `reservation` under a fresh 10-digit id.
    pub fn create(&self, reservation: Reservation) -> String {
        let mut items = self.items.lock();
        let mut rng = rand::thread_rng();
        let key = loop {
            let key = format!("{:010}", rng.gen_range(0..10_000_000_000u64));
            if !items.contains_key(&key) {
                break key;
            }
        };
        items.insert(key.clone(), reservation);
        key
    }

    /// Store `reservation` under `key`, replacing any previous one.
    pub fn insert(&self, key: &str, reservation: Reservation) {
        self.items.lock().insert(key.to_string(), reservation);
    }

    /// Advance the status of `key` to `status`. A status behind the current
    /// one is ignored. Returns `false` for an unknown key.
    pub fn set_status(&self, key: &str, status: ShipmentStatus) -> bool {
        self.set_status_at(key, status, Instant::now())
    }

    fn set_status_at(&self, key: &str, status: ShipmentStatus, now: Instant) -> bool {
        let mut items = self.items.lock();
        let Some(reservation) = items.get_mut(key) else {
            return false;
        };
        let current = reservation.status_at(now);
        if status > current {
            reservation.status = status;
        } else {
            reservation.status = current;
        }
        true
    }

    /// Mark `key` as picked up; it reports `done` after `done_at`.
    pub fn accept(&self, key: &str, done_at: Instant) -> bool {
        let mut items = self.items.lock();
        let Some(reservation) = items.get_mut(key) else {
            return false;
        };
        if reservation.status < ShipmentStatus::Shipping {
            reservation.status = ShipmentStatus::Shipping;
            reservation.done_at = Some(done_at);
        }
        true
    }

    fn set_qr_md5(&self, key: &str, md5: String) -> bool {
        let mut items = self.items.lock();
        let Some(reservation) = items.get_mut(key) else {
            return false;
        };
        reservation.qr_md5 = md5;
        true
    }

    /// Reservation with its status resolved at `now`.
    #[must_use]
    pub fn get_at(&self, key: &str, now: Instant) -> Option<Reservation> {
        let mut reservation = self.items.lock().get(key)?.clone();
        reservation.status = reservation.status_at(now);
        Some(reservation)
    }

    /// Reservation with its status resolved now.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Reservation> {
        self.get_at(key, Instant::now())
    }

    /// Number of reservations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Signature of the accept URL of `reserve_id`.
#[must_use]
pub fn accept_token(reserve_id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(SHIPMENT_SECRET_SEED);
    hasher.update(reserve_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Render `content` as a PNG QR code.
///
/// # Errors
/// Returns [`Error::Internal`] if the content does not fit a QR code.
pub fn render_qr_png(content: &str) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::L)
        .map_err(|e| Error::internal(format!("qr encode: {e}")))?;
    let image = code.render::<Luma<u8>>().min_dimensions(QR_SIZE, QR_SIZE).build();
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| Error::internal(format!("png encode: {e}")))?;
    Ok(png.into_inner())
}

#[derive(Debug, Deserialize)]
struct InitialShipping {
    reserve_id: String,
    status: ShipmentStatus,
    reserve_time: i64,
    to_address: String,
    to_name: String,
    from_address: String,
    from_name: String,
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(default)]
    to_address: String,
    #[serde(default)]
    to_name: String,
    #[serde(default)]
    from_address: String,
    #[serde(default)]
    from_name: String,
}

#[derive(Debug, Serialize)]
struct CreateResponse {
    reserve_id: String,
    reserve_time: i64,
}

#[derive(Debug, Deserialize)]
struct ReserveRequest {
    #[serde(default)]
    reserve_id: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: ShipmentStatus,
    reserve_time: i64,
}

#[derive(Debug, Default, Deserialize)]
struct AcceptQuery {
    #[serde(default)]
    id: String,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Serialize)]
struct AcceptResponse {
    accept: &'static str,
}

/// The shipment simulator.
#[derive(Debug)]
pub struct ShipmentService {
    store: ShipmentStore,
    done_delay: Duration,
}

impl ShipmentService {
    /// Service whose accepted parcels are delivered after `done_delay`.
    #[must_use]
    pub fn new(done_delay: Duration) -> Self {
        Self { store: ShipmentStore::default(), done_delay }
    }

    /// Preload reservations of the initial dataset (one JSON object per line).
    ///
    /// # Errors
    /// Returns [`Error::Io`] or [`Error::Serialization`] for a bad file.
    pub fn load_shippings(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Io { message: format!("{}: {e}", path.display()) })?;
        let mut count = 0;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let shipping: InitialShipping = serde_json::from_str(line)?;
            self.store.insert(
                &shipping.reserve_id,
                Reservation {
                    to_address: shipping.to_address,
                    to_name: shipping.to_name,
                    from_address: shipping.from_address,
                    from_name: shipping.from_name,
                    status: shipping.status,
                    qr_md5: String::new(),
                    reserve_time: shipping.reserve_time,
                    done_at: None,
                },
            );
            count += 1;
        }
        info!(count, "loaded initial shippings");
        Ok(count)
    }

    /// Routes of the service.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/create", post(create))
            .route("/request", post(request))
            .route("/accept", get(accept).post(accept))
            .route("/status", post(status))
            .with_state(self)
    }

    /// Reservations.
    #[must_use]
    pub const fn store(&self) -> &ShipmentStore {
        &self.store
    }

    /// Advance a reservation as if the carrier acted. Returns `false` for an
    /// unknown id.
    pub fn force_set_status(&self, reserve_id: &str, status: ShipmentStatus) -> bool {
        self.store.set_status(reserve_id, status)
    }

    /// Whether `md5` matches the last QR code rendered for `reserve_id`.
    #[must_use]
    pub fn check_qr_md5(&self, reserve_id: &str, md5: &str) -> bool {
        self.store.get(reserve_id).is_some_and(|r| r.qr_md5 == md5)
    }
}

fn authorize(headers: &HeaderMap) -> ApiResult<()> {
    match headers.get(AUTHORIZATION) {
        Some(value) if value.as_bytes() == SHIPMENT_API_TOKEN.as_bytes() => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("json decode error"))
}

fn required_reserve_id(body: &[u8]) -> ApiResult<String> {
    let request: ReserveRequest = decode(body)?;
    if request.reserve_id.is_empty() {
        return Err(ApiError::bad_request("required parameter was not passed"));
    }
    Ok(request.reserve_id)
}

async fn create(
    State(service): State<Arc<ShipmentService>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<CreateResponse>> {
    authorize(&headers)?;
    let request: CreateRequest = decode(&body)?;
    if [&request.to_address, &request.to_name, &request.from_address, &request.from_name]
        .iter()
        .any(|field| field.is_empty())
    {
        return Err(ApiError::bad_request("required parameter was not passed"));
    }

    let reserve_time = chrono::Utc::now().timestamp();
    let reserve_id = service.store.create(Reservation {
        to_address: request.to_address,
        to_name: request.to_name,
        from_address: request.from_address,
        from_name: request.from_name,
        status: ShipmentStatus::Initial,
        qr_md5: String::new(),
        reserve_time,
        done_at: None,
    });
    debug!(%reserve_id, "reserved shipment");
    Ok(Json(CreateResponse { reserve_id, reserve_time }))
}

async fn request(
    State(service): State<Arc<ShipmentService>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    authorize(&headers)?;
    let reserve_id = required_reserve_id(&body)?;
    if !service.store.set_status(&reserve_id, ShipmentStatus::WaitPickup) {
        return Err(ApiError::bad_request("empty"));
    }

    let scheme = match headers.get("x-forwarded-proto") {
        Some(proto) if proto.as_bytes() == b"https" => "https",
        _ => "http",
    };
    let host = headers.get(HOST).and_then(|h| h.to_str().ok()).unwrap_or("localhost");
    let accept_url =
        format!("{scheme}://{host}/accept?id={reserve_id}&token={}", accept_token(&reserve_id));

    let png = render_qr_png(&accept_url).map_err(|e| ApiError::Internal(e.to_string()))?;
    service.store.set_qr_md5(&reserve_id, md5_hex(&png));
    debug!(%reserve_id, %accept_url, "rendered pickup QR code");

    Ok(([(CONTENT_TYPE, "image/png")], png).into_response())
}

async fn accept(
    State(service): State<Arc<ShipmentService>>,
    Query(query): Query<AcceptQuery>,
) -> ApiResult<Json<AcceptResponse>> {
    if query.token != accept_token(&query.id) {
        return Err(ApiError::bad_request("wrong parameters"));
    }
    if !service.store.accept(&query.id, Instant::now() + service.done_delay) {
        return Err(ApiError::bad_request("empty"));
    }
    Ok(Json(AcceptResponse { accept: "ok" }))
}

async fn status(
    State(service): State<Arc<ShipmentService>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<StatusResponse>> {
    authorize(&headers)?;
    let reserve_id = required_reserve_id(&body)?;
    let reservation = service.store.get(&reserve_id).ok_or_else(|| ApiError::bad_request("empty"))?;
    Ok(Json(StatusResponse { status: reservation.status, reserve_time: reservation.reserve_time }))
}
