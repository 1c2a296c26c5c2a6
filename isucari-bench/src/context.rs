//! Shared state of one benchmark run.
//!
//! Everything a scenario touches hangs off [`BenchContext`], which is built
//! once and handed to every task behind an `Arc`.

use isucari_core::{AppUser, AssetStore, BenchConfig, Error, FailureAggregator, Result, UserRole};
use isucari_external::{PaymentService, ShipmentService};
use isucari_session::{PoolGuard, Session, SessionPool, TargetUrls};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// First price of the ladder.
pub const INITIAL_PRICE: i64 = 100;

/// Price used for regular listings; each successful campaign round raises it.
#[derive(Debug)]
pub struct PriceLadder {
    price: RwLock<i64>,
}

impl Default for PriceLadder {
    fn default() -> Self {
        Self { price: RwLock::new(INITIAL_PRICE) }
    }
}

impl PriceLadder {
    /// Current price.
    #[must_use]
    pub fn get(&self) -> i64 {
        *self.price.read()
    }

    /// Raise the price by `delta`.
    pub fn add(&self, delta: i64) {
        *self.price.write() += delta;
    }
}

/// Instant after which no new scenario iteration starts.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `duration` from now.
    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self { at: Instant::now() + duration }
    }

    /// The deadline itself.
    #[must_use]
    pub const fn at(&self) -> Instant {
        self.at
    }

    /// Whether the deadline passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left, zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Sleep until `started + interval`. Returns `false` without waiting
    /// past the deadline when the next iteration would start after it.
    pub async fn wait_interval(&self, started: Instant, interval: Duration) -> bool {
        let next = started + interval;
        if next >= self.at {
            tokio::time::sleep_until(self.at).await;
            return false;
        }
        tokio::time::sleep_until(next).await;
        true
    }

    /// Sleep for `duration`; `false` if the deadline came first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        self.wait_interval(Instant::now(), duration).await
    }
}

/// Run-wide state shared by every scenario.
#[derive(Debug)]
pub struct BenchContext {
    /// Run configuration
    pub config: BenchConfig,
    /// Ground truth
    pub store: Arc<AssetStore>,
    /// Target and simulator endpoints
    pub urls: Arc<TargetUrls>,
    /// Idle logged-in buyers
    pub buyers: Arc<SessionPool>,
    /// Idle logged-in active sellers
    pub sellers: Arc<SessionPool>,
    /// Payment back doors
    pub payment: Arc<PaymentService>,
    /// Shipment back doors
    pub shipment: Arc<ShipmentService>,
    /// Failures of initialize, verify and validation
    pub failures: Arc<FailureAggregator>,
    /// Failures of the final check
    pub final_failures: Arc<FailureAggregator>,
    /// Price of regular listings
    pub prices: PriceLadder,
}

impl BenchContext {
    /// Assemble a context. `failures` must be the aggregator the payment
    /// service reports to.
    #[must_use]
    pub fn new(
        config: BenchConfig,
        store: Arc<AssetStore>,
        urls: Arc<TargetUrls>,
        payment: Arc<PaymentService>,
        shipment: Arc<ShipmentService>,
        failures: Arc<FailureAggregator>,
    ) -> Self {
        Self {
            config,
            store,
            urls,
            buyers: Arc::new(SessionPool::new("buyers")),
            sellers: Arc::new(SessionPool::new("active sellers")),
            payment,
            shipment,
            failures,
            final_failures: Arc::new(FailureAggregator::new()),
            prices: PriceLadder::default(),
        }
    }

    /// Pool holding idle sessions of `role`.
    #[must_use]
    pub fn pool(&self, role: UserRole) -> &Arc<SessionPool> {
        match role {
            UserRole::ActiveSeller => &self.sellers,
            UserRole::Buyer => &self.buyers,
        }
    }

    /// A logged-out session.
    ///
    /// # Errors
    /// Returns an internal failure if the HTTP client cannot be built.
    pub fn new_session(&self) -> Result<Session> {
        Session::new(Arc::clone(&self.urls), self.config.request_timeout())
    }

    /// Log `user` in on a fresh session and check the returned profile.
    ///
    /// # Errors
    /// Returns an application failure if the login fails or the target
    /// answers with someone else's profile.
    pub async fn login(&self, user: &AppUser) -> Result<Session> {
        let mut session = self.new_session()?;
        let returned = session.login(&user.account_name, &user.password).await?;
        let returned = AppUser {
            id: returned.id,
            account_name: returned.account_name,
            address: returned.address,
            ..AppUser::default()
        };
        if !user.same_profile(&returned) || session.user_id != user.id {
            return Err(Error::application_with(
                "POST /login: returned user does not match the logged-in user",
                format!("expected id {}; got id {}", user.id, returned.id),
            ));
        }
        Ok(session)
    }

    /// An idle session of `role`, or a freshly logged-in one. Either way the
    /// guard puts it into the pool of `role` when dropped.
    ///
    /// # Errors
    /// Returns a failure if a new login was needed and did not succeed.
    pub async fn checkout(&self, role: UserRole) -> Result<PoolGuard<Session>> {
        let pool = self.pool(role);
        if let Some(guard) = pool.checkout() {
            return Ok(guard);
        }
        let user = self.store.random_user(role)?;
        debug!(user_id = user.id, %role, "logging in a new session");
        let session = self.login(&user).await?;
        Ok(pool.adopt(session))
    }

    /// Shorthand for [`checkout`](Self::checkout) of a buyer.
    ///
    /// # Errors
    /// See [`BenchContext::checkout`].
    pub async fn buyer(&self) -> Result<PoolGuard<Session>> {
        self.checkout(UserRole::Buyer).await
    }

    /// Shorthand for [`checkout`](Self::checkout) of an active seller.
    ///
    /// # Errors
    /// See [`BenchContext::checkout`].
    pub async fn active_seller(&self) -> Result<PoolGuard<Session>> {
        self.checkout(UserRole::ActiveSeller).await
    }

    /// Ground-truth record of the user behind `session`.
    ///
    /// # Errors
    /// Returns an internal failure for a session of an unknown user.
    pub fn user_of(&self, session: &Session) -> Result<AppUser> {
        self.store
            .get_user(session.user_id)
            .ok_or_else(|| Error::internal(format!("no ground truth for user {}", session.user_id)))
    }
}
