//! JSON shapes exchanged with the target application.

use serde::{Deserialize, Serialize};

/// Public view of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSimple {
    /// User id
    pub id: i64,
    /// Login name
    pub account_name: String,
    /// Number of listed items
    #[serde(default)]
    pub num_sell_items: i64,
}

/// The logged-in user as returned by `/login` and `/settings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    /// User id
    pub id: i64,
    /// Login name
    pub account_name: String,
    /// Shipping address
    #[serde(default)]
    pub address: String,
    /// Number of listed items
    #[serde(default)]
    pub num_sell_items: i64,
}

/// A category as embedded in listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category id
    pub id: i64,
    /// Parent id, 0 for roots
    #[serde(default)]
    pub parent_id: i64,
    /// Display name
    pub category_name: String,
    /// Display name of the parent
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_category_name: String,
}

/// A listing entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemSimple {
    /// Item id
    pub id: i64,
    /// Seller id
    pub seller_id: i64,
    /// Seller details
    #[serde(default)]
    pub seller: Option<UserSimple>,
    /// Item status
    pub status: String,
    /// Item name
    pub name: String,
    /// Price
    pub price: i64,
    /// Image path on the target
    #[serde(default)]
    pub image_url: String,
    /// Leaf category id
    pub category_id: i64,
    /// Category details
    #[serde(default)]
    pub category: Option<Category>,
    /// Listing time, unix seconds
    pub created_at: i64,
}

/// Full item view, also used by the transactions listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemDetail {
    /// Item id
    pub id: i64,
    /// Seller id
    pub seller_id: i64,
    /// Seller details
    #[serde(default)]
    pub seller: Option<UserSimple>,
    /// Buyer id, 0 when unsold
    #[serde(default)]
    pub buyer_id: i64,
    /// Buyer details
    #[serde(default)]
    pub buyer: Option<UserSimple>,
    /// Item status
    pub status: String,
    /// Item name
    pub name: String,
    /// Price
    pub price: i64,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Image path on the target
    #[serde(default)]
    pub image_url: String,
    /// Leaf category id
    pub category_id: i64,
    /// Category details
    #[serde(default)]
    pub category: Option<Category>,
    /// Evidence id, visible to buyer and seller
    #[serde(default)]
    pub transaction_evidence_id: i64,
    /// Evidence status, visible to buyer and seller
    #[serde(default)]
    pub transaction_evidence_status: String,
    /// Shipping status, visible to buyer and seller
    #[serde(default)]
    pub shipping_status: String,
    /// Listing time, unix seconds
    pub created_at: i64,
}

impl From<ItemSimple> for ItemDetail {
    fn from(item: ItemSimple) -> Self {
        Self {
            id: item.id,
            seller_id: item.seller_id,
            seller: item.seller,
            status: item.status,
            name: item.name,
            price: item.price,
            image_url: item.image_url,
            category_id: item.category_id,
            category: item.category,
            created_at: item.created_at,
            ..Self::default()
        }
    }
}

/// An entry of `/reports.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionEvidence {
    /// Evidence id
    pub id: i64,
    /// Seller id
    pub seller_id: i64,
    /// Buyer id
    pub buyer_id: i64,
    /// Evidence status
    pub status: String,
    /// Item id
    pub item_id: i64,
    /// Item name
    #[serde(default)]
    pub item_name: String,
    /// Item price
    pub item_price: i64,
    /// Item description
    #[serde(default)]
    pub item_description: String,
    /// Leaf category id
    #[serde(default)]
    pub item_category_id: i64,
    /// Root category id
    #[serde(default)]
    pub item_root_category_id: i64,
}

/// Cursor of a paginated listing: the last item of the previous page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    /// Last item id
    pub item_id: i64,
    /// Last item listing time
    pub created_at: i64,
}

/// One page of `/new_items.json` or `/new_items/{id}.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewItemsPage {
    /// Root category id for category listings
    #[serde(default)]
    pub root_category_id: i64,
    /// Root category name for category listings
    #[serde(default)]
    pub root_category_name: String,
    /// Whether another page exists
    pub has_next: bool,
    /// Items of this page
    #[serde(default)]
    pub items: Vec<ItemSimple>,
}

/// One page of `/users/{id}.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserItemsPage {
    /// Owner of the page
    #[serde(default)]
    pub user: Option<UserSimple>,
    /// Whether another page exists
    pub has_next: bool,
    /// Items of this page
    #[serde(default)]
    pub items: Vec<ItemSimple>,
}

/// One page of `/users/transactions.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionsPage {
    /// Whether another page exists
    pub has_next: bool,
    /// Items of this page
    #[serde(default)]
    pub items: Vec<ItemDetail>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InitializeRequest<'a> {
    pub payment_service_url: &'a str,
    pub shipment_service_url: &'a str,
}

/// Result of `/initialize`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeResponse {
    /// Campaign level chosen by the target, 0 disables the campaign
    #[serde(default)]
    pub campaign: i64,
    /// Implementation language of the target
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub account_name: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SettingsResponse {
    #[serde(default)]
    pub csrf_token: String,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SellResponse {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct BuyRequest<'a> {
    pub csrf_token: &'a str,
    pub item_id: i64,
    pub token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BuyResponse {
    pub transaction_evidence_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ItemRequest<'a> {
    pub csrf_token: &'a str,
    pub item_id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ShipResponse {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub reserve_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ItemEditRequest<'a> {
    pub csrf_token: &'a str,
    pub item_id: i64,
    pub item_price: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemEditResponse {
    #[serde(default)]
    pub item_price: i64,
    #[serde(default)]
    pub item_created_at: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct CardRequest<'a> {
    pub card_number: &'a str,
    pub shop_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CardResponse {
    pub token: String,
}
