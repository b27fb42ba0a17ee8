//! Persistence seams. Services only ever see the repository traits; the
//! concrete store is picked once at startup (Mongo or in-memory) and asked for
//! tenant-bound repositories on every request.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{Asset, AssetHolding, Trade, TradeKind, User, Wallet, Yield};
use crate::tenant::TenantContext;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStorage;
pub use mongo::DatabasePool;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;
    /// Fails with `Conflict` when the email is already registered.
    async fn insert(&self, user: &User) -> Result<()>;
    async fn update(&self, user: &User) -> Result<()>;
}

#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Asset>>;
    /// Inserts the assets whose name is not stored yet and returns how many
    /// were created. Existing entries are never modified.
    async fn insert_missing(&self, assets: &[Asset]) -> Result<usize>;
}

/// Wallet documents plus the targeted updates the wallet service relies on.
/// Every targeted update addresses a holding by user id and asset name and
/// fails with `NotFound` when that holding does not exist.
#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Wallet>>;
    /// Whole-document upsert keyed by user id.
    async fn save(&self, wallet: &Wallet) -> Result<()>;
    async fn add_holding(&self, user_id: &str, holding: &AssetHolding) -> Result<()>;
    /// Appends a trade and applies its quota contribution in one update.
    async fn push_trade(&self, user_id: &str, asset_name: &str, kind: TradeKind, trade: &Trade)
        -> Result<()>;
    /// Adds `delta` to the holding's quota and nothing else.
    async fn restore_quota(&self, user_id: &str, asset_name: &str, delta: i64) -> Result<()>;
    /// Replaces one trade list and adds `quota_delta` to the quota in one update.
    async fn replace_trades(
        &self,
        user_id: &str,
        asset_name: &str,
        kind: TradeKind,
        trades: &[Trade],
        quota_delta: i64,
    ) -> Result<()>;
    async fn distinct_asset_names(&self) -> Result<Vec<String>>;
    async fn user_ids_by_asset(&self, asset_name: &str) -> Result<Vec<String>>;
}

#[async_trait]
pub trait YieldRepository: Send + Sync {
    /// Fails with `Conflict` when the composite key is already stored.
    async fn insert(&self, record: &Yield) -> Result<()>;
    async fn insert_many(&self, records: &[Yield]) -> Result<usize>;
    async fn existing_keys(&self, user_id: &str) -> Result<HashSet<String>>;
    /// Ordered by `yield_at`.
    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Yield>>;
    /// Ordered by `yield_at`.
    async fn find_by_user_and_asset(&self, user_id: &str, asset_name: &str) -> Result<Vec<Yield>>;
}

/// Repositories bound to a single tenant.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub assets: Arc<dyn AssetRepository>,
    pub wallets: Arc<dyn WalletRepository>,
    pub yields: Arc<dyn YieldRepository>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn scope(&self, tenant: &TenantContext) -> Result<Repositories>;
}
