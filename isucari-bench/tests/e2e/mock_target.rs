//! In-process marketplace that follows the target's contract closely enough
//! for the scenarios to pass against it. It pays through the payment
//! simulator and books parcels with the shipment simulator, like the real
//! application does.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use isucari_core::constants::{messages, PAYMENT_API_KEY, PAYMENT_SHOP_ID, SHIPMENT_API_TOKEN};
use isucari_core::types::{evidence_status, item_status, limits};
use isucari_core::{AppCategory, AppItem, AppUser};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Rejection with the `{"error": ...}` body the benchmarker expects.
pub struct Failure(StatusCode, String);

impl Failure {
    fn new(status: StatusCode, message: &str) -> Self {
        Self(status, message.to_string())
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

type Handled = Result<Response, Failure>;

#[derive(Debug, Clone)]
struct Evidence {
    id: i64,
    item_id: i64,
    seller_id: i64,
    buyer_id: i64,
    status: String,
    price: i64,
    reserve_id: String,
    qr_png: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Market {
    users: HashMap<i64, AppUser>,
    categories: HashMap<i64, AppCategory>,
    items: BTreeMap<i64, AppItem>,
    evidences: BTreeMap<i64, Evidence>,
    evidence_of_item: HashMap<i64, i64>,
    uploads: HashMap<String, Vec<u8>>,
    next_item_id: i64,
    next_evidence_id: i64,
    clock: i64,
}

/// Knobs for misbehaving on purpose.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quirks {
    /// Sell an item again even after it was bought
    pub double_sale: bool,
    /// Answer every purchase with "item is not for sale"
    pub refuse_purchases: bool,
    /// Hand out a logged-in cookie along with a wrong-password 401
    pub session_on_wrong_password: bool,
}

/// How the `/buy` calls the mock answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuyCounts {
    /// Committed purchases
    pub bought: usize,
    /// 403 "item is not for sale"
    pub not_for_sale: usize,
    /// 400 "card is declined"
    pub declined: usize,
}

#[derive(Default)]
struct BuyCounters {
    bought: AtomicUsize,
    not_for_sale: AtomicUsize,
    declined: AtomicUsize,
}

/// Shared state of the mock.
pub struct MockMarket {
    market: Mutex<Market>,
    buy_lock: tokio::sync::Mutex<()>,
    client: reqwest::Client,
    payment_url: String,
    shipment_url: String,
    campaign: i64,
    quirks: Quirks,
    buys: BuyCounters,
}

/// Seed of the mock: the same records the ground truth is built from.
pub struct Seed {
    pub users: Vec<AppUser>,
    pub categories: Vec<AppCategory>,
    pub items: Vec<AppItem>,
    pub uploads: Vec<(String, Vec<u8>)>,
}

impl MockMarket {
    pub fn new(seed: Seed, payment_url: String, shipment_url: String, campaign: i64, quirks: Quirks) -> Arc<Self> {
        let clock = seed.items.iter().map(|i| i.created_at).max().unwrap_or(0) + 1;
        let next_item_id = seed.items.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        let market = Market {
            users: seed.users.into_iter().map(|u| (u.id, u)).collect(),
            categories: seed.categories.into_iter().map(|c| (c.id, c)).collect(),
            items: seed.items.into_iter().map(|i| (i.id, i)).collect(),
            uploads: seed.uploads.into_iter().collect(),
            next_item_id,
            next_evidence_id: 1,
            clock,
            ..Market::default()
        };
        Arc::new(Self {
            market: Mutex::new(market),
            buy_lock: tokio::sync::Mutex::new(()),
            client: reqwest::Client::new(),
            payment_url,
            shipment_url,
            campaign,
            quirks,
            buys: BuyCounters::default(),
        })
    }

    /// Serve on an ephemeral port.
    pub async fn serve(self: &Arc<Self>) -> anyhow::Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(Arc::clone(self));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(addr)
    }

    /// Status of an item as the mock stores it.
    pub fn item_status(&self, item_id: i64) -> Option<String> {
        self.market.lock().items.get(&item_id).map(|i| i.status.clone())
    }

    /// Answers of `/buy` so far.
    pub fn buy_counts(&self) -> BuyCounts {
        BuyCounts {
            bought: self.buys.bought.load(Ordering::SeqCst),
            not_for_sale: self.buys.not_for_sale.load(Ordering::SeqCst),
            declined: self.buys.declined.load(Ordering::SeqCst),
        }
    }

    async fn shipment(&self, path: &str, body: Value) -> Result<reqwest::Response, Failure> {
        let response = self
            .client
            .post(format!("{}{path}", self.shipment_url))
            .header(AUTHORIZATION.as_str(), SHIPMENT_API_TOKEN)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Failure::new(StatusCode::INTERNAL_SERVER_ERROR, "shipment service failed"));
        }
        Ok(response)
    }

    async fn shipping_status(&self, reserve_id: &str) -> Result<String, Failure> {
        let body: Value = self.shipment("/status", json!({ "reserve_id": reserve_id })).await?.json().await?;
        Ok(body["status"].as_str().unwrap_or_default().to_string())
    }
}

fn router(state: Arc<MockMarket>) -> Router {
    Router::new()
        .route("/initialize", post(initialize))
        .route("/login", post(login))
        .route("/settings", get(settings))
        .route("/sell", post(sell))
        .route("/buy", post(buy))
        .route("/ship", post(ship))
        .route("/ship_done", post(ship_done))
        .route("/complete", post(complete))
        .route("/bump", post(bump))
        .route("/items/edit", post(item_edit))
        .route("/new_items.json", get(new_items))
        .route("/new_items/:file", get(category_items))
        .route("/users/:file", get(user_items))
        .route("/items/:file", get(item))
        .route("/transactions/:file", get(qr_code))
        .route("/upload/:file", get(upload))
        .route("/reports.json", get(reports))
        .with_state(state)
}

fn csrf_token(user_id: i64) -> String {
    format!("csrf-{user_id}")
}

fn current_user(headers: &HeaderMap) -> Result<i64, Failure> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| pair.trim().strip_prefix("session=").and_then(|id| id.parse().ok()))
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "no session"))
}

fn check_csrf(user_id: i64, token: &str) -> Result<(), Failure> {
    if token == csrf_token(user_id) {
        Ok(())
    } else {
        Err(Failure::new(StatusCode::UNPROCESSABLE_ENTITY, "csrf token error"))
    }
}

/// `(user_id, item_id)` of an item action after the session and CSRF checks.
fn item_action(headers: &HeaderMap, body: &Value) -> Result<(i64, i64), Failure> {
    let user_id = current_user(headers)?;
    check_csrf(user_id, body["csrf_token"].as_str().unwrap_or_default())?;
    Ok((user_id, body["item_id"].as_i64().unwrap_or_default()))
}

fn file_id(file: &str, suffix: &str) -> Result<i64, Failure> {
    file.strip_suffix(suffix)
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "not found"))
}

fn cursor(query: &HashMap<String, i64>) -> Option<(i64, i64)> {
    Some((*query.get("created_at")?, *query.get("item_id")?))
}

/// Newest first; the cursor excludes everything at or before it.
fn paginate(mut items: Vec<AppItem>, cursor: Option<(i64, i64)>, size: usize) -> (Vec<AppItem>, bool) {
    items.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
    let mut page: Vec<AppItem> = items
        .into_iter()
        .filter(|item| cursor.map_or(true, |c| (item.created_at, item.id) < c))
        .take(size + 1)
        .collect();
    let has_next = page.len() > size;
    page.truncate(size);
    (page, has_next)
}

impl Market {
    fn user_simple(&self, id: i64) -> Value {
        self.users.get(&id).map_or(Value::Null, |u| {
            json!({ "id": u.id, "account_name": u.account_name, "num_sell_items": u.num_sell_items })
        })
    }

    fn category(&self, id: i64) -> Value {
        let Some(category) = self.categories.get(&id) else {
            return Value::Null;
        };
        let parent_name = self.categories.get(&category.parent_id).map(|p| p.category_name.clone());
        json!({
            "id": category.id,
            "parent_id": category.parent_id,
            "category_name": category.category_name,
            "parent_category_name": parent_name.unwrap_or_default(),
        })
    }

    fn root_of(&self, category_id: i64) -> i64 {
        self.categories.get(&category_id).map_or(0, |c| c.parent_id)
    }

    fn item_simple(&self, item: &AppItem) -> Value {
        json!({
            "id": item.id,
            "seller_id": item.seller_id,
            "seller": self.user_simple(item.seller_id),
            "status": item.status,
            "name": item.name,
            "price": item.price,
            "image_url": format!("/upload/{}", item.image_name),
            "category_id": item.category_id,
            "category": self.category(item.category_id),
            "created_at": item.created_at,
        })
    }

    /// Detail without the shipping status, plus the reservation to ask for it.
    fn item_detail(&self, item: &AppItem, viewer: i64) -> (Value, Option<String>) {
        let mut detail = self.item_simple(item);
        detail["description"] = json!(item.description);
        detail["buyer_id"] = json!(item.buyer_id);
        if item.buyer_id != 0 {
            detail["buyer"] = self.user_simple(item.buyer_id);
        }
        let evidence = self
            .evidence_of_item
            .get(&item.id)
            .and_then(|id| self.evidences.get(id))
            .filter(|e| e.seller_id == viewer || e.buyer_id == viewer);
        match evidence {
            Some(evidence) => {
                detail["transaction_evidence_id"] = json!(evidence.id);
                detail["transaction_evidence_status"] = json!(evidence.status);
                (detail, Some(evidence.reserve_id.clone()))
            },
            None => (detail, None),
        }
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }
}

async fn with_shipping(market: &MockMarket, (mut detail, reserve_id): (Value, Option<String>)) -> Result<Value, Failure> {
    if let Some(reserve_id) = reserve_id {
        detail["shipping_status"] = json!(market.shipping_status(&reserve_id).await?);
    }
    Ok(detail)
}

async fn initialize(State(market): State<Arc<MockMarket>>) -> Json<Value> {
    Json(json!({ "campaign": market.campaign, "language": "rust" }))
}

async fn login(State(market): State<Arc<MockMarket>>, Json(body): Json<Value>) -> Handled {
    let name = body["account_name"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let rejected = || Failure::new(StatusCode::UNAUTHORIZED, "アカウント名かパスワードが間違えています");
    let user = market
        .market
        .lock()
        .users
        .values()
        .find(|u| u.account_name == name)
        .cloned()
        .ok_or_else(rejected)?;
    if user.password != password {
        if market.quirks.session_on_wrong_password {
            let cookie = [(SET_COOKIE, format!("session={}; Path=/", user.id))];
            return Ok((cookie, rejected()).into_response());
        }
        return Err(rejected());
    }
    let body = json!({
        "id": user.id,
        "account_name": user.account_name,
        "address": user.address,
        "num_sell_items": user.num_sell_items,
    });
    Ok(([(SET_COOKIE, format!("session={}; Path=/", user.id))], Json(body)).into_response())
}

async fn settings(State(market): State<Arc<MockMarket>>, headers: HeaderMap) -> Handled {
    let user_id = current_user(&headers)?;
    let market = market.market.lock();
    let user = market.users.get(&user_id).ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "user not found"))?;
    Ok(Json(json!({
        "csrf_token": csrf_token(user_id),
        "user": { "id": user.id, "account_name": user.account_name, "address": user.address },
    }))
    .into_response())
}

async fn sell(State(market): State<Arc<MockMarket>>, headers: HeaderMap, mut form: Multipart) -> Handled {
    let user_id = current_user(&headers)?;
    let mut fields = HashMap::new();
    let mut image = Vec::new();
    while let Some(field) = form
        .next_field()
        .await
        .map_err(|_| Failure::new(StatusCode::BAD_REQUEST, "multipart error"))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|_| Failure::new(StatusCode::BAD_REQUEST, "multipart error"))?;
        if name == "image" {
            image = bytes.to_vec();
        } else {
            fields.insert(name, String::from_utf8_lossy(&bytes).into_owned());
        }
    }
    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();

    check_csrf(user_id, &field("csrf_token"))?;
    let price: i64 = field("price").parse().unwrap_or_default();
    if !(limits::ITEM_MIN_PRICE..=limits::ITEM_MAX_PRICE).contains(&price) {
        return Err(Failure::new(StatusCode::BAD_REQUEST, messages::PRICE_OUT_OF_RANGE));
    }
    let category_id: i64 = field("category_id").parse().unwrap_or_default();

    let mut market = market.market.lock();
    if market.root_of(category_id) == 0 {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Incorrect category ID"));
    }
    if image.is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "image error"));
    }
    let id = market.next_item_id;
    market.next_item_id += 1;
    let created_at = market.tick();
    let image_name = format!("upload-{id}.jpg");
    market.uploads.insert(image_name.clone(), image);
    market.items.insert(
        id,
        AppItem {
            id,
            seller_id: user_id,
            status: item_status::ON_SALE.to_string(),
            name: field("name"),
            price,
            description: field("description"),
            image_name,
            category_id,
            created_at,
            ..AppItem::default()
        },
    );
    if let Some(user) = market.users.get_mut(&user_id) {
        user.num_sell_items += 1;
    }
    Ok(Json(json!({ "id": id })).into_response())
}

async fn buy(State(market): State<Arc<MockMarket>>, headers: HeaderMap, Json(body): Json<Value>) -> Handled {
    let (user_id, item_id) = item_action(&headers, &body)?;
    let token = body["token"].as_str().unwrap_or_default().to_string();

    // One purchase at a time, so a race has a single winner.
    let _serial = market.buy_lock.lock().await;
    let (item, seller, buyer) = {
        let state = market.market.lock();
        let item = state.items.get(&item_id).cloned().ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "item not found"))?;
        let seller = state.users.get(&item.seller_id).cloned().unwrap_or_default();
        let buyer = state.users.get(&user_id).cloned().unwrap_or_default();
        (item, seller, buyer)
    };
    let sold = item.status != item_status::ON_SALE && !market.quirks.double_sale;
    if sold || market.quirks.refuse_purchases {
        market.buys.not_for_sale.fetch_add(1, Ordering::SeqCst);
        return Err(Failure::new(StatusCode::FORBIDDEN, messages::ITEM_NOT_FOR_SALE));
    }
    if item.seller_id == user_id {
        return Err(Failure::new(StatusCode::FORBIDDEN, messages::CANNOT_BUY_OWN_ITEM));
    }

    let reserved: Value = market
        .shipment(
            "/create",
            json!({
                "to_address": buyer.address,
                "to_name": buyer.account_name,
                "from_address": seller.address,
                "from_name": seller.account_name,
            }),
        )
        .await?
        .json()
        .await?;
    let reserve_id = reserved["reserve_id"].as_str().unwrap_or_default().to_string();

    let paid: Value = market
        .client
        .post(format!("{}/token", market.payment_url))
        .json(&json!({ "shop_id": PAYMENT_SHOP_ID, "token": token, "api_key": PAYMENT_API_KEY, "price": item.price }))
        .send()
        .await?
        .json()
        .await?;
    match paid["status"].as_str() {
        Some("ok") => {},
        Some("fail") => {
            market.buys.declined.fetch_add(1, Ordering::SeqCst);
            return Err(Failure::new(StatusCode::BAD_REQUEST, messages::CARD_DECLINED));
        },
        Some("invalid") => return Err(Failure::new(StatusCode::BAD_REQUEST, "カード情報に誤りがあります")),
        _ => return Err(Failure::new(StatusCode::BAD_REQUEST, "想定外のエラー")),
    }

    let mut state = market.market.lock();
    let evidence_id = state.next_evidence_id;
    state.next_evidence_id += 1;
    state.evidences.insert(
        evidence_id,
        Evidence {
            id: evidence_id,
            item_id,
            seller_id: item.seller_id,
            buyer_id: user_id,
            status: evidence_status::WAIT_SHIPPING.to_string(),
            price: item.price,
            reserve_id,
            qr_png: None,
        },
    );
    state.evidence_of_item.insert(item_id, evidence_id);
    if let Some(stored) = state.items.get_mut(&item_id) {
        stored.status = item_status::TRADING.to_string();
        stored.buyer_id = user_id;
    }
    market.buys.bought.fetch_add(1, Ordering::SeqCst);
    Ok(Json(json!({ "transaction_evidence_id": evidence_id })).into_response())
}

/// Evidence of `item_id` if `user_id` is its seller.
fn sellers_evidence(market: &MockMarket, user_id: i64, item_id: i64) -> Result<Evidence, Failure> {
    let state = market.market.lock();
    let evidence = state
        .evidence_of_item
        .get(&item_id)
        .and_then(|id| state.evidences.get(id))
        .cloned()
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "transaction_evidences not found"))?;
    if evidence.seller_id != user_id {
        return Err(Failure::new(StatusCode::FORBIDDEN, messages::FORBIDDEN));
    }
    Ok(evidence)
}

async fn ship(State(market): State<Arc<MockMarket>>, headers: HeaderMap, Json(body): Json<Value>) -> Handled {
    let (user_id, item_id) = item_action(&headers, &body)?;
    let evidence = sellers_evidence(&market, user_id, item_id)?;
    if evidence.status != evidence_status::WAIT_SHIPPING {
        return Err(Failure::new(StatusCode::FORBIDDEN, "準備ができていません"));
    }
    let png = market.shipment("/request", json!({ "reserve_id": evidence.reserve_id })).await?.bytes().await?;
    if let Some(stored) = market.market.lock().evidences.get_mut(&evidence.id) {
        stored.qr_png = Some(png.to_vec());
    }
    Ok(Json(json!({ "path": format!("/transactions/{}.png", evidence.id), "reserve_id": evidence.reserve_id }))
        .into_response())
}

async fn ship_done(State(market): State<Arc<MockMarket>>, headers: HeaderMap, Json(body): Json<Value>) -> Handled {
    let (user_id, item_id) = item_action(&headers, &body)?;
    let evidence = sellers_evidence(&market, user_id, item_id)?;
    let shipping = market.shipping_status(&evidence.reserve_id).await?;
    if shipping != "shipping" && shipping != "done" {
        return Err(Failure::new(StatusCode::FORBIDDEN, messages::SHIPMENT_NOT_PICKED_UP));
    }
    if evidence.status != evidence_status::WAIT_SHIPPING {
        return Err(Failure::new(StatusCode::FORBIDDEN, "準備ができていません"));
    }
    if let Some(stored) = market.market.lock().evidences.get_mut(&evidence.id) {
        stored.status = evidence_status::WAIT_DONE.to_string();
    }
    Ok(Json(json!({ "transaction_evidence_id": evidence.id })).into_response())
}

async fn complete(State(market): State<Arc<MockMarket>>, headers: HeaderMap, Json(body): Json<Value>) -> Handled {
    let (user_id, item_id) = item_action(&headers, &body)?;
    let evidence = {
        let state = market.market.lock();
        state
            .evidence_of_item
            .get(&item_id)
            .and_then(|id| state.evidences.get(id))
            .cloned()
            .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "transaction_evidences not found"))?
    };
    if evidence.buyer_id != user_id {
        return Err(Failure::new(StatusCode::FORBIDDEN, messages::FORBIDDEN));
    }
    if market.shipping_status(&evidence.reserve_id).await? != "done" {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "shipment service側で配送完了になっていません"));
    }
    if evidence.status != evidence_status::WAIT_DONE {
        return Err(Failure::new(StatusCode::FORBIDDEN, "準備ができていません"));
    }
    let mut state = market.market.lock();
    if let Some(stored) = state.evidences.get_mut(&evidence.id) {
        stored.status = evidence_status::DONE.to_string();
    }
    if let Some(item) = state.items.get_mut(&item_id) {
        item.status = item_status::SOLD_OUT.to_string();
    }
    Ok(Json(json!({ "transaction_evidence_id": evidence.id })).into_response())
}

fn own_item<'a>(state: &'a mut Market, user_id: i64, item_id: i64) -> Result<&'a mut AppItem, Failure> {
    let item = state.items.get_mut(&item_id).ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "item not found"))?;
    if item.seller_id != user_id {
        return Err(Failure::new(StatusCode::FORBIDDEN, messages::FORBIDDEN));
    }
    Ok(item)
}

fn edited(item: &AppItem) -> Response {
    Json(json!({
        "item_id": item.id,
        "item_price": item.price,
        "item_created_at": item.created_at,
        "item_updated_at": item.created_at,
    }))
    .into_response()
}

async fn bump(State(market): State<Arc<MockMarket>>, headers: HeaderMap, Json(body): Json<Value>) -> Handled {
    let (user_id, item_id) = item_action(&headers, &body)?;
    let mut state = market.market.lock();
    let now = state.tick();
    let item = own_item(&mut state, user_id, item_id)?;
    item.created_at = now;
    Ok(edited(item))
}

async fn item_edit(State(market): State<Arc<MockMarket>>, headers: HeaderMap, Json(body): Json<Value>) -> Handled {
    let (user_id, item_id) = item_action(&headers, &body)?;
    let price = body["item_price"].as_i64().unwrap_or_default();
    let mut state = market.market.lock();
    let item = own_item(&mut state, user_id, item_id)?;
    if item.status != item_status::ON_SALE {
        return Err(Failure::new(StatusCode::FORBIDDEN, messages::EDIT_NOT_ON_SALE));
    }
    if !(limits::ITEM_MIN_PRICE..=limits::ITEM_MAX_PRICE).contains(&price) {
        return Err(Failure::new(StatusCode::BAD_REQUEST, messages::PRICE_OUT_OF_RANGE));
    }
    item.price = price;
    Ok(edited(item))
}

fn listed(state: &Market, keep: impl Fn(&AppItem) -> bool) -> Vec<AppItem> {
    state
        .items
        .values()
        .filter(|i| i.status == item_status::ON_SALE || i.status == item_status::SOLD_OUT)
        .filter(|i| keep(i))
        .cloned()
        .collect()
}

async fn new_items(State(market): State<Arc<MockMarket>>, Query(query): Query<HashMap<String, i64>>) -> Json<Value> {
    let state = market.market.lock();
    let (page, has_next) = paginate(listed(&state, |_| true), cursor(&query), limits::ITEMS_PER_PAGE);
    let items: Vec<Value> = page.iter().map(|i| state.item_simple(i)).collect();
    Json(json!({ "has_next": has_next, "items": items }))
}

async fn category_items(
    State(market): State<Arc<MockMarket>>,
    Path(file): Path<String>,
    Query(query): Query<HashMap<String, i64>>,
) -> Handled {
    let root = file_id(&file, ".json")?;
    let state = market.market.lock();
    let name = state
        .categories
        .get(&root)
        .map(|c| c.category_name.clone())
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "category not found"))?;
    let (page, has_next) =
        paginate(listed(&state, |i| state.root_of(i.category_id) == root), cursor(&query), limits::ITEMS_PER_PAGE);
    let items: Vec<Value> = page.iter().map(|i| state.item_simple(i)).collect();
    Ok(Json(json!({ "root_category_id": root, "root_category_name": name, "has_next": has_next, "items": items }))
        .into_response())
}

async fn user_items(
    State(market): State<Arc<MockMarket>>,
    headers: HeaderMap,
    Path(file): Path<String>,
    Query(query): Query<HashMap<String, i64>>,
) -> Handled {
    if file == "transactions.json" {
        return transactions(&market, &headers, &query).await;
    }
    let user_id = file_id(&file, ".json")?;
    let state = market.market.lock();
    let items: Vec<AppItem> = state.items.values().filter(|i| i.seller_id == user_id).cloned().collect();
    let (page, has_next) = paginate(items, cursor(&query), limits::ITEMS_PER_PAGE);
    let items: Vec<Value> = page.iter().map(|i| state.item_simple(i)).collect();
    Ok(Json(json!({ "user": state.user_simple(user_id), "has_next": has_next, "items": items })).into_response())
}

async fn transactions(market: &MockMarket, headers: &HeaderMap, query: &HashMap<String, i64>) -> Handled {
    let user_id = current_user(headers)?;
    let (details, has_next) = {
        let state = market.market.lock();
        let mine: Vec<AppItem> =
            state.items.values().filter(|i| i.seller_id == user_id || i.buyer_id == user_id).cloned().collect();
        let (page, has_next) = paginate(mine, cursor(query), limits::TRANSACTIONS_PER_PAGE);
        let details: Vec<_> = page.iter().map(|i| state.item_detail(i, user_id)).collect();
        (details, has_next)
    };
    let mut items = Vec::with_capacity(details.len());
    for detail in details {
        items.push(with_shipping(market, detail).await?);
    }
    Ok(Json(json!({ "has_next": has_next, "items": items })).into_response())
}

async fn item(State(market): State<Arc<MockMarket>>, headers: HeaderMap, Path(file): Path<String>) -> Handled {
    let item_id = file_id(&file, ".json")?;
    let viewer = current_user(&headers).unwrap_or_default();
    let detail = {
        let state = market.market.lock();
        let item = state.items.get(&item_id).ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "item not found"))?;
        state.item_detail(item, viewer)
    };
    Ok(Json(with_shipping(&market, detail).await?).into_response())
}

async fn qr_code(State(market): State<Arc<MockMarket>>, headers: HeaderMap, Path(file): Path<String>) -> Handled {
    let evidence_id = file_id(&file, ".png")?;
    let user_id = current_user(&headers)?;
    let state = market.market.lock();
    let evidence =
        state.evidences.get(&evidence_id).ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "not found"))?;
    match &evidence.qr_png {
        Some(png) if evidence.seller_id == user_id => Ok(([(CONTENT_TYPE, "image/png")], png.clone()).into_response()),
        _ => Err(Failure::new(StatusCode::FORBIDDEN, "qrcode not available")),
    }
}

async fn upload(State(market): State<Arc<MockMarket>>, Path(file): Path<String>) -> Handled {
    let state = market.market.lock();
    let bytes = state.uploads.get(&file).cloned().ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "not found"))?;
    Ok(([(CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

async fn reports(State(market): State<Arc<MockMarket>>) -> Json<Value> {
    let state = market.market.lock();
    let reports: Vec<Value> = state
        .evidences
        .values()
        .map(|e| {
            let item = state.items.get(&e.item_id).cloned().unwrap_or_default();
            json!({
                "id": e.id,
                "seller_id": e.seller_id,
                "buyer_id": e.buyer_id,
                "status": e.status,
                "item_id": e.item_id,
                "item_name": item.name,
                "item_price": e.price,
                "item_description": item.description,
                "item_category_id": item.category_id,
                "item_root_category_id": state.root_of(item.category_id),
            })
        })
        .collect();
    Json(json!(reports))
}
