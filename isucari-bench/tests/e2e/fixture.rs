//! A small marketplace dataset wired to the mock target and both simulators.

use crate::mock_target::{MockMarket, Quirks, Seed};
use isucari_bench::BenchContext;
use isucari_core::types::item_status;
use isucari_core::{md5_hex, AppCategory, AppItem, AppUser, AssetData, AssetStore, BenchConfig, FailureAggregator};
use isucari_external::Simulators;
use isucari_session::{Session, TargetUrls};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Active sellers are users 1 and 2; everybody from here on is a buyer.
pub const FIRST_BUYER: i64 = 3;
/// Last buyer id.
pub const LAST_BUYER: i64 = 80;
/// Buyer that listed the seeded items.
pub const SEEDED_SELLER: i64 = FIRST_BUYER;

const SEED_IMAGE: &[u8] = b"\xff\xd8\xff\xe0seeded listing photo";
const UPLOADS: [&[u8]; 2] = [b"\xff\xd8\xff\xe0first upload", b"\xff\xd8\xff\xe0second upload"];

pub struct Harness {
    pub ctx: Arc<BenchContext>,
    pub market: Arc<MockMarket>,
    pub simulators: Simulators,
    _dir: TempDir,
}

impl Harness {
    pub async fn login(&self, user_id: i64) -> anyhow::Result<Session> {
        let user = self.ctx.store.get_user(user_id).ok_or_else(|| anyhow::anyhow!("no user {user_id}"))?;
        Ok(self.ctx.login(&user).await?)
    }

    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.simulators.stop().await?;
        Ok(())
    }
}

fn user(id: i64, num_sell_items: i64) -> AppUser {
    AppUser {
        id,
        account_name: format!("user{id}"),
        password: format!("pass-{id}"),
        address: format!("Tokyo {id}"),
        num_sell_items,
        buy_parent_category_id: 1,
        num_buy_items: 0,
    }
}

fn category(id: i64, parent_id: i64, name: &str) -> AppCategory {
    AppCategory { id, parent_id, category_name: name.to_string(), parent_category_name: String::new() }
}

fn seeded_item(id: i64, created_at: i64) -> AppItem {
    AppItem {
        id,
        seller_id: SEEDED_SELLER,
        buyer_id: 0,
        status: item_status::ON_SALE.to_string(),
        name: format!("seeded chair {id}"),
        price: 300 + id,
        description: "a comfortable chair\nbarely used".to_string(),
        image_name: "seed.jpg".to_string(),
        category_id: 10,
        created_at,
    }
}

fn dataset(dir: &TempDir) -> anyhow::Result<AssetData> {
    let mut image_files = Vec::new();
    for (i, bytes) in UPLOADS.iter().enumerate() {
        let path = dir.path().join(format!("upload-{i}.jpg"));
        std::fs::write(&path, bytes)?;
        image_files.push(path);
    }

    let mut users = vec![user(1, 100), user(2, 100)];
    users.extend((FIRST_BUYER..=LAST_BUYER).map(|id| user(id, if id == SEEDED_SELLER { 2 } else { 0 })));

    Ok(AssetData {
        users,
        items: vec![seeded_item(1, 1000), seeded_item(2, 1001)],
        categories: vec![
            category(1, 0, "家電"),
            category(10, 1, "テレビ"),
            category(11, 1, "カメラ"),
            category(2, 0, "インテリア"),
            category(20, 2, "椅子"),
        ],
        keywords: ["isucon", "椅子", "chair", "#", "tokyo", "fast"].map(String::from).to_vec(),
        image_files,
        image_md5: HashMap::from([("seed.jpg".to_string(), md5_hex(SEED_IMAGE))]),
        ..AssetData::default()
    })
}

/// Start both simulators and a mock target answering with `campaign`.
pub async fn harness(campaign: i64, quirks: Quirks) -> anyhow::Result<Harness> {
    let dir = tempfile::tempdir()?;
    let data = dataset(&dir)?;

    let mut config = BenchConfig::default();
    config.data.data_dir = dir.path().to_path_buf();
    config.external.payment_port = 0;
    config.external.shipment_port = 0;
    config.external.validation_delay_ms = 0;
    config.target.request_timeout_ms = 5_000;
    config.target.initialize_timeout_ms = 5_000;
    config.timing.final_check_wait_ms = 0;

    let failures = Arc::new(FailureAggregator::new());
    let mut simulators = Simulators::new(&config, Arc::clone(&failures))?;
    let (payment, shipment) = simulators.start().await?;
    config.target.payment_url = format!("http://127.0.0.1:{}", payment.port());
    config.target.shipment_url = format!("http://127.0.0.1:{}", shipment.port());

    let seed = Seed {
        users: data.users.clone(),
        categories: data.categories.clone(),
        items: data.items.clone(),
        uploads: vec![("seed.jpg".to_string(), SEED_IMAGE.to_vec())],
    };
    let market = MockMarket::new(
        seed,
        config.target.payment_url.clone(),
        config.target.shipment_url.clone(),
        campaign,
        quirks,
    );
    let addr = market.serve().await?;
    config.target.app_url = format!("http://{addr}");

    let urls = TargetUrls::from_config(&config)?;
    let ctx = Arc::new(BenchContext::new(
        config,
        Arc::new(AssetStore::from_parts(data, 7)),
        Arc::new(urls),
        Arc::clone(&simulators.payment),
        Arc::clone(&simulators.shipment),
        failures,
    ));
    Ok(Harness { ctx, market, simulators, _dir: dir })
}
