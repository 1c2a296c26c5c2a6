//! # Ground-Truth Store
//!
//! The benchmarker's private copy of the initial dataset. It is read by every
//! scenario and mutated only to mirror actions the scenarios themselves
//! performed against the target (new listings, price edits, bumps, purchases).
//!
//! Users are split into two disjoint roles by their listing count. Each role
//! keeps a shuffled sequence consumed through an atomic cursor, so no user is
//! handed out twice during one process lifetime.

use crate::types::{
    item_status, AppCategory, AppItem, AppTransactionEvidence, AppUser, ImageMd5, StaticFile,
};
use crate::{Error, Result};
use md5::{Digest, Md5};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Role a user plays in scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserRole {
    /// Lists many items; logs in to sell
    ActiveSeller,
    /// Everyone else; logs in to buy
    Buyer,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActiveSeller => f.write_str("active seller"),
            Self::Buyer => f.write_str("buyer"),
        }
    }
}

/// Raw records a store is built from.
#[derive(Debug, Clone, Default)]
pub struct AssetData {
    /// All users
    pub users: Vec<AppUser>,
    /// All items
    pub items: Vec<AppItem>,
    /// All categories
    pub categories: Vec<AppCategory>,
    /// All transaction evidences
    pub transaction_evidences: Vec<AppTransactionEvidence>,
    /// Text generation vocabulary
    pub keywords: Vec<String>,
    /// Files uploaded when selling
    pub image_files: Vec<PathBuf>,
    /// md5 of the images of the initial items, by image name
    pub image_md5: HashMap<String, String>,
    /// Static assets the target must serve unchanged
    pub static_files: Vec<StaticFile>,
}

#[derive(Debug, Default)]
struct ItemIndex {
    items: HashMap<(i64, i64), AppItem>,
    on_sale_by_seller: HashMap<i64, Vec<i64>>,
}

/// Shared in-memory ground truth.
#[derive(Debug)]
pub struct AssetStore {
    users: RwLock<HashMap<i64, AppUser>>,
    active_seller_ids: Vec<i64>,
    buyer_ids: Vec<i64>,
    active_seller_cursor: AtomicUsize,
    buyer_cursor: AtomicUsize,
    items: RwLock<ItemIndex>,
    categories: HashMap<i64, AppCategory>,
    root_categories: Vec<AppCategory>,
    child_categories: Vec<AppCategory>,
    children_by_parent: HashMap<i64, Vec<AppCategory>>,
    transaction_evidences: HashMap<i64, AppTransactionEvidence>,
    keywords: Vec<String>,
    image_files: Vec<PathBuf>,
    image_cursor: AtomicUsize,
    image_md5: HashMap<String, String>,
    static_files: Vec<StaticFile>,
    rng: Mutex<StdRng>,
}

impl AssetStore {
    /// Load the dataset below `data_dir` with a random shuffle seed.
    ///
    /// # Errors
    /// Returns [`Error::Io`] or [`Error::Serialization`] if a data file is
    /// missing or malformed.
    pub fn load(data_dir: &Path, static_dir: Option<&Path>) -> Result<Self> {
        Self::load_with_seed(data_dir, static_dir, rand::random())
    }

    /// Load the dataset below `data_dir`, shuffling users with `seed`.
    ///
    /// # Errors
    /// Same as [`AssetStore::load`].
    pub fn load_with_seed(data_dir: &Path, static_dir: Option<&Path>, seed: u64) -> Result<Self> {
        info!(data_dir = %data_dir.display(), "Loading ground truth");

        let result_dir = data_dir.join("result");
        let image_md5 = read_json_lines::<ImageMd5>(&data_dir.join("image_files_md5_json.txt"))?
            .into_iter()
            .map(|im| (im.name, im.md5))
            .collect();

        let keywords = std::fs::read_to_string(data_dir.join("keywords.tsv"))
            .map_err(|e| io_error(&data_dir.join("keywords.tsv"), &e))?
            .lines()
            .map(str::to_string)
            .collect();

        let images_dir = data_dir.join("images");
        let mut image_files = Vec::new();
        for entry in std::fs::read_dir(&images_dir).map_err(|e| io_error(&images_dir, &e))? {
            let entry = entry.map_err(|e| io_error(&images_dir, &e))?;
            if entry.file_type().map_err(|e| io_error(&images_dir, &e))?.is_file() {
                image_files.push(entry.path());
            }
        }
        image_files.sort();

        let static_files = match static_dir {
            Some(dir) => load_static_files(dir)?,
            None => Vec::new(),
        };

        let data = AssetData {
            users: read_json_lines(&result_dir.join("users_json.txt"))?,
            items: read_json_lines(&result_dir.join("items_json.txt"))?,
            categories: read_json_lines(&result_dir.join("category_json.txt"))?,
            transaction_evidences: read_json_lines(
                &result_dir.join("transaction_evidences_json.txt"),
            )?,
            keywords,
            image_files,
            image_md5,
            static_files,
        };

        Ok(Self::from_parts(data, seed))
    }

    /// Build a store from in-memory records.
    #[must_use]
    pub fn from_parts(data: AssetData, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut users = HashMap::with_capacity(data.users.len());
        let mut active_seller_ids = Vec::new();
        let mut buyer_ids = Vec::new();
        for user in data.users {
            if user.is_active_seller() {
                active_seller_ids.push(user.id);
            } else {
                buyer_ids.push(user.id);
            }
            users.insert(user.id, user);
        }
        // Deterministic order before shuffling so the seed alone decides the draw order.
        active_seller_ids.sort_unstable();
        buyer_ids.sort_unstable();
        active_seller_ids.shuffle(&mut rng);
        buyer_ids.shuffle(&mut rng);

        let mut index = ItemIndex::default();
        for item in data.items {
            if item.status == item_status::ON_SALE {
                index.on_sale_by_seller.entry(item.seller_id).or_default().push(item.id);
            }
            index.items.insert((item.seller_id, item.id), item);
        }

        let mut categories = HashMap::new();
        let mut root_categories = Vec::new();
        let mut child_categories = Vec::new();
        let mut children_by_parent: HashMap<i64, Vec<AppCategory>> = HashMap::new();
        for category in data.categories {
            if category.is_root() {
                root_categories.push(category.clone());
            } else {
                child_categories.push(category.clone());
                children_by_parent.entry(category.parent_id).or_default().push(category.clone());
            }
            categories.insert(category.id, category);
        }

        let transaction_evidences =
            data.transaction_evidences.into_iter().map(|te| (te.id, te)).collect();

        let mut image_files = data.image_files;
        image_files.shuffle(&mut rng);

        debug!(
            active_sellers = active_seller_ids.len(),
            buyers = buyer_ids.len(),
            items = index.items.len(),
            categories = categories.len(),
            "Ground truth ready"
        );

        Self {
            users: RwLock::new(users),
            active_seller_ids,
            buyer_ids,
            active_seller_cursor: AtomicUsize::new(0),
            buyer_cursor: AtomicUsize::new(0),
            items: RwLock::new(index),
            categories,
            root_categories,
            child_categories,
            children_by_parent,
            transaction_evidences,
            keywords: data.keywords,
            image_files,
            image_cursor: AtomicUsize::new(0),
            image_md5: data.image_md5,
            static_files: data.static_files,
            rng: Mutex::new(rng),
        }
    }

    /// Next never-returned user of `role`.
    ///
    /// # Errors
    /// Returns [`Error::PoolExhausted`] once every user of the role was drawn.
    pub fn random_user(&self, role: UserRole) -> Result<AppUser> {
        let (ids, cursor) = match role {
            UserRole::ActiveSeller => (&self.active_seller_ids, &self.active_seller_cursor),
            UserRole::Buyer => (&self.buyer_ids, &self.buyer_cursor),
        };
        let index = cursor.fetch_add(1, Ordering::Relaxed);
        let id = ids.get(index).ok_or_else(|| Error::PoolExhausted { role: role.to_string() })?;
        self.get_user(*id).ok_or_else(|| Error::internal(format!("user {id} vanished")))
    }

    /// Next never-returned active seller.
    ///
    /// # Errors
    /// See [`AssetStore::random_user`].
    pub fn random_active_seller(&self) -> Result<AppUser> {
        self.random_user(UserRole::ActiveSeller)
    }

    /// Next never-returned buyer.
    ///
    /// # Errors
    /// See [`AssetStore::random_user`].
    pub fn random_buyer(&self) -> Result<AppUser> {
        self.random_user(UserRole::Buyer)
    }

    /// `num` consecutive ids of `role` starting at a random offset, wrapping.
    ///
    /// These users may also be logged in elsewhere; the ids are only used to
    /// browse their public pages.
    #[must_use]
    pub fn random_user_ids(&self, role: UserRole, num: usize) -> Vec<i64> {
        let ids = match role {
            UserRole::ActiveSeller => &self.active_seller_ids,
            UserRole::Buyer => &self.buyer_ids,
        };
        if ids.is_empty() {
            return Vec::new();
        }
        let start = self.rng.lock().gen_range(0..ids.len());
        ids.iter().cycle().skip(start).take(num.min(ids.len())).copied().collect()
    }

    /// User by id.
    #[must_use]
    pub fn get_user(&self, id: i64) -> Option<AppUser> {
        self.users.read().get(&id).cloned()
    }

    /// Record a purchase by `user_id`.
    pub fn user_buy_item(&self, user_id: i64) -> Option<AppUser> {
        let mut users = self.users.write();
        let user = users.get_mut(&user_id)?;
        user.num_buy_items += 1;
        Some(user.clone())
    }

    /// First on-sale item id of a seller.
    #[must_use]
    pub fn user_first_item(&self, seller_id: i64) -> Option<i64> {
        self.items.read().on_sale_by_seller.get(&seller_id).and_then(|ids| ids.first().copied())
    }

    /// All item ids a seller ever listed on sale.
    #[must_use]
    pub fn user_items(&self, seller_id: i64) -> Vec<i64> {
        self.items.read().on_sale_by_seller.get(&seller_id).cloned().unwrap_or_default()
    }

    /// Item by (seller, id), without waiting.
    #[must_use]
    pub fn get_item(&self, seller_id: i64, item_id: i64) -> Option<AppItem> {
        self.items.read().items.get(&(seller_id, item_id)).cloned()
    }

    /// Item by (seller, id), retrying with 1ms..1024ms backoff.
    ///
    /// A listing can show up on the target before the scenario that created
    /// it recorded it here.
    pub async fn wait_item(&self, seller_id: i64, item_id: i64) -> Option<AppItem> {
        let mut backoff = 1u64;
        loop {
            if let Some(item) = self.get_item(seller_id, item_id) {
                return Some(item);
            }
            if backoff > 1024 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            backoff *= 2;
        }
    }

    /// Record a listing the benchmarker just created.
    pub fn set_item(
        &self,
        seller_id: i64,
        item_id: i64,
        name: &str,
        price: i64,
        description: &str,
        category_id: i64,
    ) {
        {
            let mut index = self.items.write();
            index.on_sale_by_seller.entry(seller_id).or_default().push(item_id);
            index.items.insert(
                (seller_id, item_id),
                AppItem {
                    id: item_id,
                    seller_id,
                    buyer_id: 0,
                    status: item_status::ON_SALE.to_string(),
                    name: name.to_string(),
                    price,
                    description: description.to_string(),
                    image_name: String::new(),
                    category_id,
                    created_at: chrono::Utc::now().timestamp(),
                },
            );
        }
        if let Some(user) = self.users.write().get_mut(&seller_id) {
            user.num_sell_items += 1;
        }
    }

    /// Mirror a price edit.
    pub fn set_item_price(&self, seller_id: i64, item_id: i64, price: i64) -> Option<AppItem> {
        let mut index = self.items.write();
        let item = index.items.get_mut(&(seller_id, item_id))?;
        item.price = price;
        Some(item.clone())
    }

    /// Mirror a bump.
    pub fn set_item_created_at(
        &self,
        seller_id: i64,
        item_id: i64,
        created_at: i64,
    ) -> Option<AppItem> {
        let mut index = self.items.write();
        let item = index.items.get_mut(&(seller_id, item_id))?;
        item.created_at = created_at;
        Some(item.clone())
    }

    /// Category by id.
    #[must_use]
    pub fn get_category(&self, id: i64) -> Option<&AppCategory> {
        self.categories.get(&id)
    }

    /// All root categories.
    #[must_use]
    pub fn root_categories(&self) -> &[AppCategory] {
        &self.root_categories
    }

    /// A random root category.
    #[must_use]
    pub fn random_root_category(&self) -> Option<AppCategory> {
        self.root_categories.choose(&mut *self.rng.lock()).cloned()
    }

    /// A random leaf category.
    #[must_use]
    pub fn random_child_category(&self) -> Option<AppCategory> {
        self.child_categories.choose(&mut *self.rng.lock()).cloned()
    }

    /// A random leaf below `parent_id`.
    #[must_use]
    pub fn random_child_category_of(&self, parent_id: i64) -> Option<AppCategory> {
        self.children_by_parent.get(&parent_id)?.choose(&mut *self.rng.lock()).cloned()
    }

    /// Transaction evidence by id.
    #[must_use]
    pub fn get_transaction_evidence(&self, id: i64) -> Option<&AppTransactionEvidence> {
        self.transaction_evidences.get(&id)
    }

    /// Next upload image, round robin.
    #[must_use]
    pub fn next_image(&self) -> Option<&Path> {
        if self.image_files.is_empty() {
            return None;
        }
        let index = self.image_cursor.fetch_add(1, Ordering::Relaxed) % self.image_files.len();
        Some(self.image_files[index].as_path())
    }

    /// md5 of an initial item's image.
    #[must_use]
    pub fn image_md5(&self, image_name: &str) -> Option<&str> {
        self.image_md5.get(image_name).map(String::as_str)
    }

    /// Static assets and their md5.
    #[must_use]
    pub fn static_files(&self) -> &[StaticFile] {
        &self.static_files
    }

    /// Text of `length` random keywords. A `#` keyword becomes a newline when
    /// `is_line` is set, a space otherwise.
    #[must_use]
    pub fn gen_text(&self, length: usize, is_line: bool) -> String {
        if self.keywords.is_empty() {
            return String::new();
        }
        let mut rng = self.rng.lock();
        (0..length)
            .map(|_| {
                let word = self.keywords[rng.gen_range(0..self.keywords.len())].as_str();
                match word {
                    "#" if is_line => "\n",
                    "#" => " ",
                    other => other,
                }
            })
            .collect()
    }

    /// Random integer in `range`, drawn from the store's seeded generator.
    pub fn gen_range(&self, range: std::ops::Range<usize>) -> usize {
        self.rng.lock().gen_range(range)
    }
}

/// Hex md5 of a byte slice.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

fn io_error(path: &Path, err: &std::io::Error) -> Error {
    Error::Io { message: format!("{}: {err}", path.display()) }
}

fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path).map_err(|e| io_error(path, &e))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(no, line)| {
            serde_json::from_str(line).map_err(|e| Error::Serialization {
                message: format!("{}:{}: {e}", path.display(), no + 1),
            })
        })
        .collect()
}

fn load_static_files(static_dir: &Path) -> Result<Vec<StaticFile>> {
    let mut files = Vec::new();
    for (sub, ext) in [("js", "js"), ("css", "css")] {
        let dir = static_dir.join(sub);
        let mut found = 0usize;
        for entry in std::fs::read_dir(&dir).map_err(|e| io_error(&dir, &e))? {
            let path = entry.map_err(|e| io_error(&dir, &e))?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(ext) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            let bytes = std::fs::read(&path).map_err(|e| io_error(&path, &e))?;
            files.push(StaticFile { url_path: format!("/static/{sub}/{name}"), md5: md5_hex(&bytes) });
            found += 1;
        }
        if found == 0 {
            return Err(Error::Io { message: format!("no .{ext} files in {}", dir.display()) });
        }
    }
    files.sort_by(|a, b| a.url_path.cmp(&b.url_path));
    Ok(files)
}
