use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use tokio::sync::Mutex;

use crate::db::{
    AssetRepository, Repositories, Storage, UserRepository, WalletRepository, YieldRepository,
};
use crate::errors::{AppError, Result};
use crate::models::{Asset, AssetHolding, Trade, TradeKind, User, Wallet, Yield};
use crate::tenant::TenantContext;

const USERS: &str = "users";
const ASSETS: &str = "assets";
const WALLETS: &str = "wallets";
const YIELDS: &str = "yields";

const DUPLICATE_KEY: i32 = 11000;

/// Shared MongoDB client. Each tenant lives in its own database named
/// `<prefix>_<tenant>`.
#[derive(Clone)]
pub struct DatabasePool {
    client: Client,
    db_prefix: String,
    indexed: Arc<Mutex<HashSet<String>>>,
}

impl DatabasePool {
    /// Connect to the MongoDB deployment at `uri`.
    pub async fn new(uri: &str, db_prefix: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            client,
            db_prefix: db_prefix.to_string(),
            indexed: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    fn database(&self, tenant: &TenantContext) -> Database {
        self.client
            .database(&format!("{}_{}", self.db_prefix, tenant.schema()))
    }

    /// Creates the unique indexes the repositories rely on, once per tenant
    /// and process.
    async fn ensure_indexes(&self, tenant: &TenantContext, db: &Database) -> Result<()> {
        let mut indexed = self.indexed.lock().await;
        if indexed.contains(tenant.schema()) {
            return Ok(());
        }

        for (collection, key) in [
            (USERS, "email"),
            (ASSETS, "name"),
            (WALLETS, "user_id"),
            (YIELDS, "key"),
        ] {
            let mut keys = Document::new();
            keys.insert(key, 1);
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();
            db.collection::<Document>(collection)
                .create_index(index)
                .await?;
        }

        tracing::info!("Indexes ensured for tenant {}", tenant.schema());
        indexed.insert(tenant.schema().to_string());
        Ok(())
    }
}

#[async_trait]
impl Storage for DatabasePool {
    async fn scope(&self, tenant: &TenantContext) -> Result<Repositories> {
        let db = self.database(tenant);
        self.ensure_indexes(tenant, &db).await?;
        Ok(Repositories {
            users: Arc::new(MongoUserRepository {
                collection: db.collection(USERS),
            }),
            assets: Arc::new(MongoAssetRepository {
                collection: db.collection(ASSETS),
            }),
            wallets: Arc::new(MongoWalletRepository {
                collection: db.collection(WALLETS),
            }),
            yields: Arc::new(MongoYieldRepository {
                collection: db.collection(YIELDS),
            }),
        })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

// ── Users ───────────────────────────────────────────────────────────

pub struct MongoUserRepository {
    collection: Collection<User>,
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.collection.find_one(doc! { "email": email }).await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn insert(&self, user: &User) -> Result<()> {
        match self.collection.insert_one(user).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(AppError::Conflict(format!(
                "Email {} is already registered",
                user.email
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, user: &User) -> Result<()> {
        let result = self
            .collection
            .replace_one(doc! { "_id": &user.id }, user)
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user.id)));
        }
        Ok(())
    }
}

// ── Assets ──────────────────────────────────────────────────────────

pub struct MongoAssetRepository {
    collection: Collection<Asset>,
}

#[async_trait]
impl AssetRepository for MongoAssetRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Asset>> {
        Ok(self.collection.find_one(doc! { "name": name }).await?)
    }

    async fn insert_missing(&self, assets: &[Asset]) -> Result<usize> {
        let mut created = 0;
        for asset in assets {
            let result = self
                .collection
                .update_one(
                    doc! { "name": &asset.name },
                    doc! { "$setOnInsert": bson::to_document(asset)? },
                )
                .upsert(true)
                .await?;
            if result.upserted_id.is_some() {
                created += 1;
            }
        }
        Ok(created)
    }
}

// ── Wallets ─────────────────────────────────────────────────────────

pub struct MongoWalletRepository {
    collection: Collection<Wallet>,
}

impl MongoWalletRepository {
    fn holding_path(asset_name: &str) -> String {
        format!("assets.{}", asset_name)
    }

    fn holding_filter(user_id: &str, asset_name: &str) -> Document {
        let mut filter = doc! { "user_id": user_id };
        filter.insert(Self::holding_path(asset_name), doc! { "$exists": true });
        filter
    }

    /// Runs an update against one holding, mapping "nothing matched" to
    /// `NotFound`.
    async fn update_holding(&self, user_id: &str, asset_name: &str, update: Document) -> Result<()> {
        let result = self
            .collection
            .update_one(Self::holding_filter(user_id, asset_name), update)
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::NotFound(format!(
                "Asset {} is not in the wallet",
                asset_name
            )));
        }
        Ok(())
    }

    fn quota_increment(asset_name: &str, delta: i64) -> Document {
        let mut inc = Document::new();
        inc.insert(format!("{}.quota_amount", Self::holding_path(asset_name)), delta);
        inc
    }
}

#[async_trait]
impl WalletRepository for MongoWalletRepository {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Wallet>> {
        Ok(self.collection.find_one(doc! { "user_id": user_id }).await?)
    }

    async fn save(&self, wallet: &Wallet) -> Result<()> {
        self.collection
            .replace_one(doc! { "user_id": &wallet.user_id }, wallet)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn add_holding(&self, user_id: &str, holding: &AssetHolding) -> Result<()> {
        let mut set = Document::new();
        set.insert(
            Self::holding_path(&holding.asset_name),
            bson::to_bson(holding)?,
        );
        let result = self
            .collection
            .update_one(doc! { "user_id": user_id }, doc! { "$set": set })
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::NotFound(format!(
                "Wallet not found for user {}",
                user_id
            )));
        }
        Ok(())
    }

    async fn push_trade(
        &self,
        user_id: &str,
        asset_name: &str,
        kind: TradeKind,
        trade: &Trade,
    ) -> Result<()> {
        let mut push = Document::new();
        push.insert(
            format!("{}.{}", Self::holding_path(asset_name), kind.field()),
            bson::to_bson(trade)?,
        );
        let inc = Self::quota_increment(asset_name, kind.quota_delta(trade.amount));
        self.update_holding(user_id, asset_name, doc! { "$push": push, "$inc": inc })
            .await
    }

    async fn restore_quota(&self, user_id: &str, asset_name: &str, delta: i64) -> Result<()> {
        let inc = Self::quota_increment(asset_name, delta);
        self.update_holding(user_id, asset_name, doc! { "$inc": inc })
            .await
    }

    async fn replace_trades(
        &self,
        user_id: &str,
        asset_name: &str,
        kind: TradeKind,
        trades: &[Trade],
        quota_delta: i64,
    ) -> Result<()> {
        let mut set = Document::new();
        set.insert(
            format!("{}.{}", Self::holding_path(asset_name), kind.field()),
            bson::to_bson(trades)?,
        );
        let inc = Self::quota_increment(asset_name, quota_delta);
        self.update_holding(user_id, asset_name, doc! { "$set": set, "$inc": inc })
            .await
    }

    async fn distinct_asset_names(&self) -> Result<Vec<String>> {
        let pipeline = vec![
            doc! { "$project": { "holdings": { "$objectToArray": "$assets" } } },
            doc! { "$unwind": "$holdings" },
            doc! { "$group": { "_id": "$holdings.k" } },
            doc! { "$sort": { "_id": 1 } },
        ];
        let mut cursor = self.collection.aggregate(pipeline).await?;
        let mut names = Vec::new();
        while let Some(group) = cursor.try_next().await? {
            if let Ok(name) = group.get_str("_id") {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn user_ids_by_asset(&self, asset_name: &str) -> Result<Vec<String>> {
        let mut filter = Document::new();
        filter.insert(Self::holding_path(asset_name), doc! { "$exists": true });
        let values = self.collection.distinct("user_id", filter).await?;
        let mut user_ids: Vec<String> = values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(id) => Some(id),
                _ => None,
            })
            .collect();
        user_ids.sort();
        Ok(user_ids)
    }
}

// ── Yields ──────────────────────────────────────────────────────────

pub struct MongoYieldRepository {
    collection: Collection<Yield>,
}

#[async_trait]
impl YieldRepository for MongoYieldRepository {
    async fn insert(&self, record: &Yield) -> Result<()> {
        match self.collection.insert_one(record).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(AppError::Conflict(format!(
                "Yield for {} in {} is already registered",
                record.asset_name, record.yield_at
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_many(&self, records: &[Yield]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let result = self.collection.insert_many(records).await?;
        Ok(result.inserted_ids.len())
    }

    async fn existing_keys(&self, user_id: &str) -> Result<HashSet<String>> {
        let values = self
            .collection
            .distinct("key", doc! { "user_id": user_id })
            .await?;
        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(key) => Some(key),
                _ => None,
            })
            .collect())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Yield>> {
        let cursor = self
            .collection
            .find(doc! { "user_id": user_id })
            .sort(doc! { "yield_at": 1, "asset_name": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_by_user_and_asset(&self, user_id: &str, asset_name: &str) -> Result<Vec<Yield>> {
        let cursor = self
            .collection
            .find(doc! { "user_id": user_id, "asset_name": asset_name })
            .sort(doc! { "yield_at": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }
}
