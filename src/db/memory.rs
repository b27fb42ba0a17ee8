use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::db::{
    AssetRepository, Repositories, Storage, UserRepository, WalletRepository, YieldRepository,
};
use crate::errors::{AppError, Result};
use crate::models::{Asset, AssetHolding, Trade, TradeKind, User, Wallet, Yield};
use crate::tenant::TenantContext;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("in-memory store lock poisoned".into()))
}

/// Process-local storage with the same semantics as the Mongo store. Each
/// tenant gets its own set of repositories.
#[derive(Default)]
pub struct MemoryStorage {
    tenants: Mutex<HashMap<String, Repositories>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn scope(&self, tenant: &TenantContext) -> Result<Repositories> {
        let mut tenants = lock(&self.tenants)?;
        let repos = tenants
            .entry(tenant.schema().to_string())
            .or_insert_with(|| Repositories {
                users: Arc::new(MemoryUserRepository::default()),
                assets: Arc::new(MemoryAssetRepository::default()),
                wallets: Arc::new(MemoryWalletRepository::default()),
                yields: Arc::new(MemoryYieldRepository::default()),
            });
        Ok(repos.clone())
    }
}

// ── Users ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = lock(&self.users)?;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(lock(&self.users)?.get(id).cloned())
    }

    async fn insert(&self, user: &User) -> Result<()> {
        let mut users = lock(&self.users)?;
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(format!(
                "Email {} is already registered",
                user.email
            )));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut users = lock(&self.users)?;
        match users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("User {} not found", user.id))),
        }
    }
}

// ── Assets ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryAssetRepository {
    assets: Mutex<HashMap<String, Asset>>,
}

#[async_trait]
impl AssetRepository for MemoryAssetRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Asset>> {
        Ok(lock(&self.assets)?.get(name).cloned())
    }

    async fn insert_missing(&self, assets: &[Asset]) -> Result<usize> {
        let mut stored = lock(&self.assets)?;
        let mut created = 0;
        for asset in assets {
            if !stored.contains_key(&asset.name) {
                stored.insert(asset.name.clone(), asset.clone());
                created += 1;
            }
        }
        Ok(created)
    }
}

// ── Wallets ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryWalletRepository {
    wallets: Mutex<HashMap<String, Wallet>>,
}

impl MemoryWalletRepository {
    fn with_holding<F>(&self, user_id: &str, asset_name: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut AssetHolding) -> Result<()>,
    {
        let mut wallets = lock(&self.wallets)?;
        let holding = wallets
            .get_mut(user_id)
            .and_then(|w| w.assets.get_mut(asset_name))
            .ok_or_else(|| {
                AppError::NotFound(format!("Asset {} is not in the wallet", asset_name))
            })?;
        apply(holding)
    }
}

fn add_quota(holding: &mut AssetHolding, delta: i64) -> Result<()> {
    holding.quota_amount = holding.quota_amount.checked_add(delta).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Quota overflow: holding {} has {} units, change is {}",
            holding.asset_name, holding.quota_amount, delta
        ))
    })?;
    Ok(())
}

#[async_trait]
impl WalletRepository for MemoryWalletRepository {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Wallet>> {
        Ok(lock(&self.wallets)?.get(user_id).cloned())
    }

    async fn save(&self, wallet: &Wallet) -> Result<()> {
        lock(&self.wallets)?.insert(wallet.user_id.clone(), wallet.clone());
        Ok(())
    }

    async fn add_holding(&self, user_id: &str, holding: &AssetHolding) -> Result<()> {
        let mut wallets = lock(&self.wallets)?;
        let wallet = wallets
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("Wallet not found for user {}", user_id)))?;
        wallet
            .assets
            .insert(holding.asset_name.clone(), holding.clone());
        Ok(())
    }

    async fn push_trade(
        &self,
        user_id: &str,
        asset_name: &str,
        kind: TradeKind,
        trade: &Trade,
    ) -> Result<()> {
        self.with_holding(user_id, asset_name, |holding| {
            add_quota(holding, kind.quota_delta(trade.amount))?;
            holding.trades_mut(kind).push(trade.clone());
            Ok(())
        })
    }

    async fn restore_quota(&self, user_id: &str, asset_name: &str, delta: i64) -> Result<()> {
        self.with_holding(user_id, asset_name, |holding| add_quota(holding, delta))
    }

    async fn replace_trades(
        &self,
        user_id: &str,
        asset_name: &str,
        kind: TradeKind,
        trades: &[Trade],
        quota_delta: i64,
    ) -> Result<()> {
        self.with_holding(user_id, asset_name, |holding| {
            add_quota(holding, quota_delta)?;
            *holding.trades_mut(kind) = trades.to_vec();
            Ok(())
        })
    }

    async fn distinct_asset_names(&self) -> Result<Vec<String>> {
        let wallets = lock(&self.wallets)?;
        let mut names: Vec<String> = wallets
            .values()
            .flat_map(|w| w.assets.keys().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn user_ids_by_asset(&self, asset_name: &str) -> Result<Vec<String>> {
        let wallets = lock(&self.wallets)?;
        let mut user_ids: Vec<String> = wallets
            .values()
            .filter(|w| w.assets.contains_key(asset_name))
            .map(|w| w.user_id.clone())
            .collect();
        user_ids.sort();
        Ok(user_ids)
    }
}

// ── Yields ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryYieldRepository {
    yields: Mutex<Vec<Yield>>,
}

impl MemoryYieldRepository {
    fn sorted(mut records: Vec<Yield>) -> Vec<Yield> {
        records.sort_by(|a, b| {
            a.yield_at
                .cmp(&b.yield_at)
                .then_with(|| a.asset_name.cmp(&b.asset_name))
        });
        records
    }
}

#[async_trait]
impl YieldRepository for MemoryYieldRepository {
    async fn insert(&self, record: &Yield) -> Result<()> {
        let mut yields = lock(&self.yields)?;
        if yields.iter().any(|y| y.key == record.key) {
            return Err(AppError::Conflict(format!(
                "Yield for {} in {} is already registered",
                record.asset_name, record.yield_at
            )));
        }
        yields.push(record.clone());
        Ok(())
    }

    async fn insert_many(&self, records: &[Yield]) -> Result<usize> {
        let mut yields = lock(&self.yields)?;
        if let Some(dup) = records
            .iter()
            .find(|r| yields.iter().any(|y| y.key == r.key))
        {
            return Err(AppError::Conflict(format!(
                "Yield for {} in {} is already registered",
                dup.asset_name, dup.yield_at
            )));
        }
        yields.extend(records.iter().cloned());
        Ok(records.len())
    }

    async fn existing_keys(&self, user_id: &str) -> Result<HashSet<String>> {
        let yields = lock(&self.yields)?;
        Ok(yields
            .iter()
            .filter(|y| y.user_id == user_id)
            .map(|y| y.key.clone())
            .collect())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Yield>> {
        let yields = lock(&self.yields)?;
        let records = yields
            .iter()
            .filter(|y| y.user_id == user_id)
            .cloned()
            .collect();
        Ok(Self::sorted(records))
    }

    async fn find_by_user_and_asset(&self, user_id: &str, asset_name: &str) -> Result<Vec<Yield>> {
        let yields = lock(&self.yields)?;
        let records = yields
            .iter()
            .filter(|y| y.user_id == user_id && y.asset_name == asset_name)
            .cloned()
            .collect();
        Ok(Self::sorted(records))
    }
}
