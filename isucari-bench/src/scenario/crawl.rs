//! # Pagination Verifier
//!
//! Walks the four paginated listings of the target page by page, following
//! the `(item_id, created_at)` cursor of the last item seen. Every page is
//! checked on its own (ordering, scope, page size, statuses) and every item
//! against the ground truth. After the walk the collected count is compared
//! with what the ground truth predicts, and a random sample of the items is
//! inspected in depth through `/items/{id}.json`.
//!
//! How strict the comparison is depends on the [`CrawlMode`].

use crate::context::BenchContext;
use isucari_core::types::{item_status, limits};
use isucari_core::{AppItem, CrawlSlack, Error, IdsStore, Result};
use isucari_session::{Category, ItemDetail, PageCursor, Session};
use tracing::debug;

/// How strictly a crawl compares with the ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    /// One-shot verification pass: every item must be known
    Verify,
    /// Check loops: unknown items are skipped
    Check,
    /// Load loops: structure only, no field comparison
    Load,
}

/// One of the paginated listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    /// `/new_items.json`
    NewItems,
    /// `/new_items/{root_category_id}.json`
    Category(i64),
    /// `/users/{user_id}.json`
    User(i64),
    /// `/users/transactions.json` of the session's own user
    Transactions,
}

const LISTED_STATUSES: &[&str] = &[item_status::ON_SALE, item_status::SOLD_OUT];
const USER_PAGE_STATUSES: &[&str] = &[item_status::ON_SALE, item_status::TRADING, item_status::SOLD_OUT];
const ITEM_STATUSES: &[&str] = &[
    item_status::ON_SALE,
    item_status::TRADING,
    item_status::SOLD_OUT,
    item_status::STOP,
    item_status::CANCEL,
];

struct Page {
    has_next: bool,
    items: Vec<ItemDetail>,
}

impl Listing {
    /// Request line used in failure messages.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::NewItems => "GET /new_items.json".to_string(),
            Self::Category(id) => format!("GET /new_items/{id}.json"),
            Self::User(id) => format!("GET /users/{id}.json"),
            Self::Transactions => "GET /users/transactions.json".to_string(),
        }
    }

    /// Items on every page but the last.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        match self {
            Self::Transactions => limits::TRANSACTIONS_PER_PAGE,
            _ => limits::ITEMS_PER_PAGE,
        }
    }

    const fn statuses(&self) -> &'static [&'static str] {
        match self {
            Self::NewItems | Self::Category(_) => LISTED_STATUSES,
            Self::User(_) => USER_PAGE_STATUSES,
            Self::Transactions => ITEM_STATUSES,
        }
    }

    async fn fetch(&self, session: &Session, cursor: Option<PageCursor>) -> Result<Page> {
        match *self {
            Self::NewItems => {
                let page = session.new_items(cursor).await?;
                Ok(Page { has_next: page.has_next, items: page.items.into_iter().map(Into::into).collect() })
            },
            Self::Category(root) => {
                let page = session.new_category_items(root, cursor).await?;
                if page.root_category_id != root {
                    return Err(Error::application(format!(
                        "{}: root_category_id is {}",
                        self.label(),
                        page.root_category_id
                    )));
                }
                Ok(Page { has_next: page.has_next, items: page.items.into_iter().map(Into::into).collect() })
            },
            Self::User(user_id) => {
                let page = session.user_items(user_id, cursor).await?;
                if page.user.as_ref().is_some_and(|user| user.id != user_id) {
                    return Err(Error::application(format!("{}: page belongs to another user", self.label())));
                }
                Ok(Page { has_next: page.has_next, items: page.items.into_iter().map(Into::into).collect() })
            },
            Self::Transactions => {
                let page = session.user_transactions(cursor).await?;
                Ok(Page { has_next: page.has_next, items: page.items })
            },
        }
    }

    fn check_scope(&self, viewer_id: i64, item: &ItemDetail) -> Result<()> {
        let in_scope = match *self {
            Self::NewItems => true,
            Self::Category(root) => item.category.as_ref().is_some_and(|c| c.parent_id == root),
            Self::User(user_id) => item.seller_id == user_id,
            Self::Transactions => {
                item.seller.is_some() && (item.seller_id == viewer_id || item.buyer_id == viewer_id)
            },
        };
        if in_scope {
            Ok(())
        } else {
            Err(Error::application(format!("{}: item {} does not belong to this listing", self.label(), item.id)))
        }
    }
}

/// Page-by-page walk with the checks every page must pass.
struct Pager<'a> {
    session: &'a Session,
    listing: Listing,
    max_page: usize,
    cursor: Option<PageCursor>,
    pages: usize,
    done: bool,
    bounded: bool,
}

impl<'a> Pager<'a> {
    const fn new(session: &'a Session, listing: Listing, max_page: usize) -> Self {
        Self { session, listing, max_page, cursor: None, pages: 0, done: false, bounded: false }
    }

    async fn next_page(&mut self) -> Result<Option<Vec<ItemDetail>>> {
        if self.done {
            return Ok(None);
        }
        let label = self.listing.label();
        let page = self.listing.fetch(self.session, self.cursor).await?;
        if page.has_next && page.items.len() != self.listing.page_size() {
            return Err(Error::application(format!(
                "{label}: expected {} items per page; got {}",
                self.listing.page_size(),
                page.items.len()
            )));
        }

        for item in &page.items {
            if let Some(previous) = self.cursor {
                if item.created_at > previous.created_at {
                    return Err(Error::application(format!(
                        "{label}: items are not sorted by created_at (item_id: {})",
                        item.id
                    )));
                }
            }
            self.listing.check_scope(self.session.user_id, item)?;
            if !self.listing.statuses().contains(&item.status.as_str()) {
                return Err(Error::application(format!(
                    "{label}: item {} has an unexpected status {}",
                    item.id, item.status
                )));
            }
            self.cursor = Some(PageCursor { item_id: item.id, created_at: item.created_at });
        }

        self.pages += 1;
        if !page.has_next {
            self.done = true;
        } else if self.max_page > 0 && self.pages >= self.max_page {
            self.done = true;
            self.bounded = true;
        } else if self.pages >= limits::MAX_CRAWL_PAGES {
            debug!(%label, "crawl stopped at the page cap");
            self.done = true;
        }
        Ok(Some(page.items))
    }
}

/// What one crawl collected.
#[derive(Debug, Clone, Default)]
pub struct Crawled {
    /// Distinct item ids in listing order
    pub ids: IdsStore,
    /// Pages fetched
    pub pages: usize,
    /// Whether the walk stopped at the caller's page bound
    pub bounded: bool,
}

/// Walk `listing` up to `max_page` pages (0 for no bound) and check each item
/// against the ground truth.
///
/// # Errors
/// Returns an application failure on the first violation.
pub async fn crawl(
    ctx: &BenchContext,
    session: &Session,
    listing: Listing,
    mode: CrawlMode,
    max_page: usize,
) -> Result<Crawled> {
    let label = listing.label();
    let mut pager = Pager::new(session, listing, max_page);
    let mut ids = IdsStore::new();
    while let Some(items) = pager.next_page().await? {
        for item in &items {
            ids.add(item.id).map_err(|dup| {
                Error::application(format!("{label}: item {} is listed twice", dup.0))
            })?;
            check_listed(ctx, listing, mode, item).await?;
        }
    }
    Ok(Crawled { ids, pages: pager.pages, bounded: pager.bounded })
}

/// Crawl `listing`, compare its size with the ground truth, then inspect
/// `check_items` random items in depth.
///
/// # Errors
/// Returns an application failure on the first violation.
pub async fn verify_listing(
    ctx: &BenchContext,
    session: &Session,
    listing: Listing,
    mode: CrawlMode,
    max_page: usize,
    check_items: usize,
) -> Result<()> {
    if let Listing::Category(root) = listing {
        if !ctx.store.get_category(root).is_some_and(|c| c.is_root()) {
            return Err(Error::internal(format!("category {root} is not a root category")));
        }
    }

    let crawled = crawl(ctx, session, listing, mode, max_page).await?;
    let expected = match listing {
        Listing::User(user_id) => ctx.store.get_user(user_id).map(|u| u.num_sell_items),
        Listing::Transactions => ctx.store.get_user(session.user_id).map(|u| u.num_sell_items + u.num_buy_items),
        Listing::NewItems | Listing::Category(_) => None,
    };
    check_count(listing, mode, &ctx.config.slack, &crawled, max_page, check_items, expected)?;

    for item_id in crawled.ids.random_ids(check_items) {
        inspect_item(ctx, session, item_id, mode, listing).await?;
    }
    Ok(())
}

/// Compare the size of a crawl with what the ground truth predicts.
///
/// # Errors
/// Returns an application failure for a wrong count.
pub fn check_count(
    listing: Listing,
    mode: CrawlMode,
    slack: &CrawlSlack,
    crawled: &Crawled,
    max_page: usize,
    check_items: usize,
    expected: Option<i64>,
) -> Result<()> {
    let label = listing.label();
    let count = crawled.ids.len();
    if crawled.bounded {
        let full = max_page * listing.page_size();
        if count != full {
            return Err(Error::application(format!("{label}: expected {full} items over {max_page} pages; got {count}")));
        }
        return Ok(());
    }

    let tolerance = match (listing, mode) {
        (Listing::User(_), CrawlMode::Verify) => slack.verify_user_items,
        (Listing::User(_), _) => slack.user_items,
        (Listing::Transactions, CrawlMode::Load) => slack.load_transactions,
        (Listing::Transactions, _) => slack.transactions,
        (Listing::NewItems | Listing::Category(_), _) => return Ok(()),
    };
    if count < check_items {
        return Err(Error::application(format!("{label}: too few items ({count})")));
    }
    if let Some(expected) = expected {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        if (count - expected).abs() > tolerance {
            return Err(Error::application_with(
                format!("{label}: number of items is wrong"),
                format!("expected {expected}; got {count}"),
            ));
        }
    }
    Ok(())
}

async fn known_item(
    ctx: &BenchContext,
    label: &str,
    item: &ItemDetail,
    strict: bool,
) -> Result<Option<AppItem>> {
    if !strict {
        return Ok(ctx.store.get_item(item.seller_id, item.id));
    }
    match ctx.store.wait_item(item.seller_id, item.id).await {
        Some(known) => Ok(Some(known)),
        None => Err(Error::application(format!("{label}: unknown item {}", item.id))),
    }
}

async fn check_listed(ctx: &BenchContext, listing: Listing, mode: CrawlMode, item: &ItemDetail) -> Result<()> {
    if mode == CrawlMode::Load {
        return Ok(());
    }
    let label = listing.label();
    let strict = mode == CrawlMode::Verify && !matches!(listing, Listing::User(_));
    let Some(known) = known_item(ctx, &label, item, strict).await? else {
        return Ok(());
    };
    if item.name != known.name {
        return Err(Error::application(format!("{label}: name of item {} differs", item.id)));
    }
    check_category(ctx, &label, item.id, known.category_id, item.category.as_ref())
}

/// Compare the category embedded in a response with the item's category
/// and its root.
///
/// # Errors
/// Returns an application failure on any difference.
pub fn check_category(
    ctx: &BenchContext,
    label: &str,
    item_id: i64,
    category_id: i64,
    got: Option<&Category>,
) -> Result<()> {
    let wrong = |what: &str| Error::application(format!("{label}: {what} of item {item_id} is wrong"));
    let got = got.ok_or_else(|| wrong("category"))?;
    let expected = ctx
        .store
        .get_category(category_id)
        .ok_or_else(|| Error::internal(format!("unknown category {category_id}")))?;
    if got.id == 0 || got.id != expected.id || got.category_name != expected.category_name {
        return Err(wrong("category"));
    }
    if got.parent_id == 0 || got.parent_id != expected.parent_id {
        return Err(wrong("parent category"));
    }
    let root = ctx
        .store
        .get_category(expected.parent_id)
        .ok_or_else(|| Error::internal(format!("unknown category {}", expected.parent_id)))?;
    if got.parent_category_name != root.category_name {
        return Err(wrong("parent category name"));
    }
    Ok(())
}

/// Fetch `/items/{id}.json` and compare it with the ground truth as strictly
/// as `mode` asks. Items found on the transactions listing are checked for
/// their evidence fields instead of their image.
///
/// # Errors
/// Returns an application failure on the first difference.
pub async fn inspect_item(
    ctx: &BenchContext,
    session: &Session,
    item_id: i64,
    mode: CrawlMode,
    listing: Listing,
) -> Result<()> {
    let label = format!("GET /items/{item_id}.json");
    let item = session.item(item_id).await?;
    if item.description.is_empty() {
        return Err(Error::application(format!("{label}: description is empty")));
    }
    if mode == CrawlMode::Load {
        return Ok(());
    }

    if item.seller.as_ref().map(|s| s.id) != Some(item.seller_id) {
        return Err(Error::application(format!("{label}: seller does not match seller_id")));
    }
    if item.buyer_id != 0 && item.buyer.as_ref().map(|b| b.id) != Some(item.buyer_id) {
        return Err(Error::application(format!("{label}: buyer does not match buyer_id")));
    }
    if !ITEM_STATUSES.contains(&item.status.as_str()) {
        return Err(Error::application(format!("{label}: unexpected status {}", item.status)));
    }

    let Some(known) = known_item(ctx, &label, &item, mode == CrawlMode::Verify).await? else {
        return Ok(());
    };
    if item.name != known.name || item.description != known.description {
        return Err(Error::application(format!("{label}: name or description differs")));
    }
    if mode == CrawlMode::Verify && item.price != known.price {
        return Err(Error::application_with(
            format!("{label}: price differs"),
            format!("expected {}; got {}", known.price, item.price),
        ));
    }
    check_category(ctx, &label, item.id, known.category_id, item.category.as_ref())?;

    if listing == Listing::Transactions {
        check_evidence(ctx, &label, &item)?;
    } else if mode == CrawlMode::Verify {
        check_image(ctx, session, &label, &item, &known).await?;
    }
    Ok(())
}

fn check_evidence(ctx: &BenchContext, label: &str, item: &ItemDetail) -> Result<()> {
    if item.buyer_id == 0 {
        return Ok(());
    }
    if item.transaction_evidence_id == 0
        || item.transaction_evidence_status.is_empty()
        || item.shipping_status.is_empty()
    {
        return Err(Error::application(format!("{label}: transaction fields are missing")));
    }
    if let Some(evidence) = ctx.store.get_transaction_evidence(item.transaction_evidence_id) {
        if evidence.item_id != item.id || evidence.status != item.transaction_evidence_status {
            return Err(Error::application(format!("{label}: transaction evidence differs")));
        }
    }
    Ok(())
}

async fn check_image(
    ctx: &BenchContext,
    session: &Session,
    label: &str,
    item: &ItemDetail,
    known: &AppItem,
) -> Result<()> {
    if item.image_url.is_empty() {
        return Err(Error::application(format!("{label}: image_url is empty")));
    }
    if known.image_name.is_empty() {
        return Ok(());
    }
    if item.image_url != format!("/upload/{}", known.image_name) {
        return Err(Error::application(format!("{label}: image_url is wrong")));
    }
    let Some(expected) = ctx.store.image_md5(&known.image_name) else {
        return Ok(());
    };
    let actual = session.download_md5(&item.image_url).await?;
    if actual != expected {
        return Err(Error::application(format!("GET {}: image content is wrong", item.image_url)));
    }
    Ok(())
}

/// Page through `listing` until `item_id` shows up.
///
/// # Errors
/// Returns an application failure if the item is not found within
/// `max_page` pages, or if a page violates the listing contract.
pub async fn find_item(session: &Session, listing: Listing, item_id: i64, max_page: usize) -> Result<ItemDetail> {
    let mut pager = Pager::new(session, listing, max_page);
    while let Some(items) = pager.next_page().await? {
        if let Some(found) = items.into_iter().find(|item| item.id == item_id) {
            return Ok(found);
        }
    }
    Err(Error::application(format!("{}: item {item_id} not found", listing.label())))
}

/// Find `item` on its root category listing.
///
/// # Errors
/// See [`find_item`].
pub async fn find_in_category(
    ctx: &BenchContext,
    session: &Session,
    item: &AppItem,
    max_page: usize,
) -> Result<ItemDetail> {
    let root = ctx
        .store
        .get_category(item.category_id)
        .map(|c| c.parent_id)
        .ok_or_else(|| Error::internal(format!("unknown category {}", item.category_id)))?;
    find_item(session, Listing::Category(root), item.id, max_page).await
}
