//! Ground-truth records and marketplace constants.

use serde::{Deserialize, Serialize};

/// Item status values.
pub mod item_status {
    /// Listed and purchasable
    pub const ON_SALE: &str = "on_sale";
    /// Bought, shipment in progress
    pub const TRADING: &str = "trading";
    /// Transaction completed
    pub const SOLD_OUT: &str = "sold_out";
    /// Withdrawn by the seller
    pub const STOP: &str = "stop";
    /// Cancelled
    pub const CANCEL: &str = "cancel";
}

/// Transaction evidence status values.
pub mod evidence_status {
    /// Waiting for payment
    pub const WAIT_PAYMENT: &str = "wait_payment";
    /// Paid, waiting for the seller to ship
    pub const WAIT_SHIPPING: &str = "wait_shipping";
    /// Shipped, waiting for the buyer to confirm
    pub const WAIT_DONE: &str = "wait_done";
    /// Completed
    pub const DONE: &str = "done";
}

/// Listing page sizes and thresholds.
pub mod limits {
    /// Items per page of new-items, category and user listings
    pub const ITEMS_PER_PAGE: usize = 48;
    /// Items per page of the transactions listing
    pub const TRANSACTIONS_PER_PAGE: usize = 10;
    /// Users listing at least this many items are active sellers
    pub const ACTIVE_SELLER_NUM_SELL_ITEMS: i64 = 100;
    /// Lowest accepted listing price
    pub const ITEM_MIN_PRICE: i64 = 100;
    /// Highest accepted listing price
    pub const ITEM_MAX_PRICE: i64 = 1_000_000;
    /// Hard bound on pages fetched by one crawl
    pub const MAX_CRAWL_PAGES: usize = 100;
}

/// A registered user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppUser {
    /// User id
    pub id: i64,
    /// Login name
    pub account_name: String,
    /// Plain password used to log in
    #[serde(rename = "plain_passwd", default)]
    pub password: String,
    /// Shipping address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    /// Number of listed items
    #[serde(default)]
    pub num_sell_items: i64,
    /// Root category this user tends to buy from
    #[serde(default)]
    pub buy_parent_category_id: i64,
    /// Number of bought items
    #[serde(default)]
    pub num_buy_items: i64,
}

impl AppUser {
    /// Whether the target's view of this user matches ours.
    #[must_use]
    pub fn same_profile(&self, other: &Self) -> bool {
        self.account_name == other.account_name && self.address == other.address
    }

    /// Whether this user belongs to the active seller role.
    #[must_use]
    pub const fn is_active_seller(&self) -> bool {
        self.num_sell_items >= limits::ACTIVE_SELLER_NUM_SELL_ITEMS
    }
}

/// A listed item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppItem {
    /// Item id
    pub id: i64,
    /// Seller user id
    pub seller_id: i64,
    /// Buyer user id, 0 when unsold
    #[serde(default)]
    pub buyer_id: i64,
    /// One of [`item_status`]
    pub status: String,
    /// Item name
    pub name: String,
    /// Price in isucoin
    pub price: i64,
    /// Free text description
    #[serde(default)]
    pub description: String,
    /// Uploaded image file name
    #[serde(default)]
    pub image_name: String,
    /// Leaf category id
    pub category_id: i64,
    /// Listing time, unix seconds
    pub created_at: i64,
}

/// A category of the two-level tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCategory {
    /// Category id
    pub id: i64,
    /// Parent id, 0 for root categories
    #[serde(default)]
    pub parent_id: i64,
    /// Display name
    pub category_name: String,
    /// Display name of the parent
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_category_name: String,
}

impl AppCategory {
    /// Whether this is a root category.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id == 0
    }
}

/// Record of a purchase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTransactionEvidence {
    /// Evidence id
    pub id: i64,
    /// Seller user id
    pub seller_id: i64,
    /// Buyer user id
    pub buyer_id: i64,
    /// One of [`evidence_status`]
    pub status: String,
    /// Purchased item id
    pub item_id: i64,
    /// Item name at purchase time
    pub item_name: String,
    /// Item price at purchase time
    pub item_price: i64,
    /// Item description at purchase time
    #[serde(default)]
    pub item_description: String,
    /// Item leaf category
    pub item_category_id: i64,
    /// Item root category
    pub item_root_category_id: i64,
    /// Creation time, unix seconds
    #[serde(default)]
    pub created_at: i64,
    /// Update time, unix seconds
    #[serde(default)]
    pub updated_at: i64,
}

/// md5 of an uploadable image.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageMd5 {
    /// File name
    pub name: String,
    /// Hex md5
    pub md5: String,
}

/// md5 of a static asset served by the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    /// Path on the target, e.g. `/static/js/app.js`
    pub url_path: String,
    /// Hex md5
    pub md5: String,
}
