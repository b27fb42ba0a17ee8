use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::db::WalletRepository;
use crate::errors::{AppError, Result};
use crate::import::{parse_trade_file, FileUpload, TradeRow};
use crate::models::{
    normalize_asset_name, AssetCategory, AssetHolding, ImportSummary, NewTrade, Purchase, Sale,
    Trade, TradeKind, TradeUpdate, Wallet,
};
use crate::services::asset_catalog::{validate_asset_name, AssetCatalog};
use crate::services::today;

/// Result of adding an asset to a user's wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddAssetOutcome {
    WalletCreated,
    AssetAdded,
}

impl AddAssetOutcome {
    pub fn message(&self, asset_name: &str) -> String {
        match self {
            AddAssetOutcome::WalletCreated => {
                format!("Wallet created with asset {}", asset_name)
            }
            AddAssetOutcome::AssetAdded => {
                format!("Asset {} added to the existing wallet", asset_name)
            }
        }
    }
}

/// All wallet mutations go through here.
///
/// Single-record changes (add, remove) are one targeted storage update.
/// Amount changes on update are two: the old contribution is restored first,
/// then the new list and contribution are written. Nothing rolls the first
/// call back if the second one fails.
#[derive(Clone)]
pub struct WalletService {
    wallets: Arc<dyn WalletRepository>,
    catalog: AssetCatalog,
}

fn wallet_not_found(user_id: &str) -> AppError {
    AppError::NotFound(format!("Wallet not found for user {}", user_id))
}

fn holding_not_found(asset_name: &str) -> AppError {
    AppError::NotFound(format!("Asset {} is not in the wallet", asset_name))
}

/// Quota after applying `delta`. Rejects a result below zero or one that
/// does not fit in an `i64`.
fn ensure_quota(current: i64, delta: i64) -> Result<i64> {
    let next = current.checked_add(delta).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Quota overflow: holding has {} units, change is {}",
            current, delta
        ))
    })?;
    if next < 0 {
        return Err(AppError::BadRequest(format!(
            "Quota cannot go negative: holding has {} units, change is {}",
            current, delta
        )));
    }
    Ok(next)
}

fn quota_value(price: Decimal, amount: i64) -> Decimal {
    (price / Decimal::from(amount)).round_dp(2)
}

fn ensure_positive_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(AppError::BadRequest("Amount must be greater than zero".into()));
    }
    Ok(())
}

fn ensure_positive_price(price: Decimal) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(AppError::BadRequest("Price must be greater than zero".into()));
    }
    Ok(())
}

fn ensure_not_future(date: chrono::NaiveDate) -> Result<()> {
    if date > today() {
        return Err(AppError::InvalidDateFormat(format!(
            "Date {} is in the future; date must be <= current date",
            date
        )));
    }
    Ok(())
}

fn trade_from_row(row: &TradeRow) -> Trade {
    Trade {
        id: uuid::Uuid::new_v4().to_string(),
        amount: row.amount,
        price: row.price,
        quota_value: row.quota_value,
        date: row.date,
    }
}

impl WalletService {
    pub fn new(wallets: Arc<dyn WalletRepository>, catalog: AssetCatalog) -> Self {
        Self { wallets, catalog }
    }

    /// Add an empty holding for `asset_name`, creating the wallet on first use.
    pub async fn add_asset(&self, user_id: &str, asset_name: &str) -> Result<AddAssetOutcome> {
        let asset_name = validate_asset_name(asset_name)?;
        let category = self.catalog.get_category(&asset_name).await?;

        match self.wallets.find_by_user_id(user_id).await? {
            None => {
                let mut wallet = Wallet::new(user_id);
                wallet
                    .assets
                    .insert(asset_name.clone(), AssetHolding::new(&asset_name, category));
                self.wallets.save(&wallet).await?;
                tracing::info!("Wallet created for user {} with {}", user_id, asset_name);
                Ok(AddAssetOutcome::WalletCreated)
            }
            Some(wallet) if wallet.assets.contains_key(&asset_name) => Err(AppError::Conflict(
                format!("Asset {} is already in the wallet", asset_name),
            )),
            Some(_) => {
                self.wallets
                    .add_holding(user_id, &AssetHolding::new(&asset_name, category))
                    .await?;
                tracing::info!("Asset {} added to wallet of user {}", asset_name, user_id);
                Ok(AddAssetOutcome::AssetAdded)
            }
        }
    }

    pub async fn add_purchase(&self, user_id: &str, asset_name: &str, trade: NewTrade) -> Result<Purchase> {
        self.add_trade(TradeKind::Purchase, user_id, asset_name, trade)
            .await
    }

    pub async fn add_sale(&self, user_id: &str, asset_name: &str, trade: NewTrade) -> Result<Sale> {
        self.add_trade(TradeKind::Sale, user_id, asset_name, trade)
            .await
    }

    pub async fn update_purchase(
        &self,
        user_id: &str,
        asset_name: &str,
        purchase_id: &str,
        update: TradeUpdate,
    ) -> Result<Purchase> {
        self.update_trade(TradeKind::Purchase, user_id, asset_name, purchase_id, update)
            .await
    }

    pub async fn update_sale(
        &self,
        user_id: &str,
        asset_name: &str,
        sale_id: &str,
        update: TradeUpdate,
    ) -> Result<Sale> {
        self.update_trade(TradeKind::Sale, user_id, asset_name, sale_id, update)
            .await
    }

    pub async fn remove_purchase(&self, user_id: &str, asset_name: &str, purchase_id: &str) -> Result<Purchase> {
        self.remove_trade(TradeKind::Purchase, user_id, asset_name, purchase_id)
            .await
    }

    pub async fn remove_sale(&self, user_id: &str, asset_name: &str, sale_id: &str) -> Result<Sale> {
        self.remove_trade(TradeKind::Sale, user_id, asset_name, sale_id)
            .await
    }

    /// Import purchases from a CSV upload. Missing holdings (and the wallet
    /// itself) are created; everything is written in one save.
    pub async fn import_purchases(&self, user_id: &str, upload: Option<&FileUpload>) -> Result<ImportSummary> {
        let parsed = parse_trade_file(upload, today())?;
        let mut wallet = self
            .wallets
            .find_by_user_id(user_id)
            .await?
            .unwrap_or_else(|| Wallet::new(user_id));

        let mut categories: HashMap<String, AssetCategory> = HashMap::new();
        for row in &parsed.rows {
            let category = match categories.get(&row.asset_name) {
                Some(category) => *category,
                None => {
                    validate_asset_name(&row.asset_name)?;
                    let category = self.catalog.get_category(&row.asset_name).await?;
                    categories.insert(row.asset_name.clone(), category);
                    category
                }
            };

            let holding = wallet
                .assets
                .entry(row.asset_name.clone())
                .or_insert_with(|| AssetHolding::new(&row.asset_name, category));
            holding.quota_amount = ensure_quota(holding.quota_amount, row.amount)
                .map_err(|e| AppError::BadRequest(format!("Row {}: {}", row.row, e)))?;
            holding.purchases.push(trade_from_row(row));
        }

        self.wallets.save(&wallet).await?;
        let summary = ImportSummary {
            registered: parsed.rows.len(),
            skipped: parsed.skipped,
        };
        tracing::info!(
            "Imported {} purchases for user {} ({} skipped)",
            summary.registered,
            user_id,
            summary.skipped
        );
        Ok(summary)
    }

    /// Import sales from a CSV upload. Every row must target a held asset and
    /// fit within the running quota; nothing is written if any row fails.
    pub async fn import_sales(&self, user_id: &str, upload: Option<&FileUpload>) -> Result<ImportSummary> {
        let mut wallet = self
            .wallets
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest("Cannot register a sale before any purchase".into())
            })?;
        let parsed = parse_trade_file(upload, today())?;

        for row in &parsed.rows {
            let holding = wallet.assets.get_mut(&row.asset_name).ok_or_else(|| {
                AppError::NotFound(format!(
                    "Row {}: asset {} is not in the wallet",
                    row.row, row.asset_name
                ))
            })?;
            if row.amount > holding.quota_amount {
                return Err(AppError::BadRequest(format!(
                    "Row {}: selling {} units of {} exceeds the held quota of {}; quota cannot go negative",
                    row.row, row.amount, row.asset_name, holding.quota_amount
                )));
            }
            holding.quota_amount -= row.amount;
            holding.sales.push(trade_from_row(row));
        }

        self.wallets.save(&wallet).await?;
        tracing::info!(
            "Imported {} sales for user {} ({} skipped)",
            parsed.rows.len(),
            user_id,
            parsed.skipped
        );
        Ok(ImportSummary {
            registered: parsed.rows.len(),
            skipped: parsed.skipped,
        })
    }

    /// Current quota of one asset, or `None` when there is no wallet or no
    /// holding for it.
    pub async fn get_quota_amount(&self, user_id: &str, asset_name: &str) -> Result<Option<i64>> {
        let asset_name = normalize_asset_name(asset_name);
        let wallet = self.wallets.find_by_user_id(user_id).await?;
        Ok(wallet
            .as_ref()
            .and_then(|w| w.assets.get(&asset_name))
            .map(|h| h.quota_amount))
    }

    pub async fn get_wallet(&self, user_id: &str) -> Result<Wallet> {
        self.wallets
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| wallet_not_found(user_id))
    }

    pub async fn all_asset_names(&self) -> Result<Vec<String>> {
        self.wallets.distinct_asset_names().await
    }

    pub async fn user_ids_by_asset(&self, asset_name: &str) -> Result<Vec<String>> {
        self.wallets
            .user_ids_by_asset(&normalize_asset_name(asset_name))
            .await
    }

    // ── Shared purchase/sale paths ──────────────────────────────────

    async fn load_holding(&self, user_id: &str, asset_name: &str) -> Result<AssetHolding> {
        let mut wallet = self
            .wallets
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| wallet_not_found(user_id))?;
        wallet
            .assets
            .remove(asset_name)
            .ok_or_else(|| holding_not_found(asset_name))
    }

    async fn add_trade(
        &self,
        kind: TradeKind,
        user_id: &str,
        asset_name: &str,
        new: NewTrade,
    ) -> Result<Trade> {
        let asset_name = normalize_asset_name(asset_name);
        ensure_positive_amount(new.amount)?;
        ensure_positive_price(new.price)?;
        ensure_not_future(new.date)?;

        let holding = self.load_holding(user_id, &asset_name).await?;
        ensure_quota(holding.quota_amount, kind.quota_delta(new.amount))?;

        let trade = Trade {
            id: uuid::Uuid::new_v4().to_string(),
            amount: new.amount,
            price: new.price,
            quota_value: quota_value(new.price, new.amount),
            date: new.date,
        };
        self.wallets
            .push_trade(user_id, &asset_name, kind, &trade)
            .await?;

        tracing::info!(
            "{} {} of {} x{} recorded for user {}",
            kind,
            trade.id,
            asset_name,
            trade.amount,
            user_id
        );
        Ok(trade)
    }

    async fn update_trade(
        &self,
        kind: TradeKind,
        user_id: &str,
        asset_name: &str,
        trade_id: &str,
        update: TradeUpdate,
    ) -> Result<Trade> {
        let asset_name = normalize_asset_name(asset_name);
        let wallet = self
            .wallets
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| wallet_not_found(user_id))?;
        if update.is_empty() {
            return Err(AppError::BadRequest(
                "Nothing to update: provide amount, price or date".into(),
            ));
        }
        let holding = wallet.assets.get(&asset_name).ok_or_else(|| {
            AppError::BadRequest(format!("Asset {} is not in the wallet", asset_name))
        })?;
        let current = holding.find_trade(kind, trade_id).ok_or_else(|| {
            AppError::NotFound(format!(
                "{} {} not found for asset {}",
                kind, trade_id, asset_name
            ))
        })?;

        if let Some(amount) = update.amount {
            ensure_positive_amount(amount)?;
        }
        if let Some(price) = update.price {
            ensure_positive_price(price)?;
        }
        if let Some(date) = update.date {
            ensure_not_future(date)?;
        }

        let amount = update.amount.unwrap_or(current.amount);
        let price = update.price.unwrap_or(current.price);
        let updated = Trade {
            id: current.id.clone(),
            amount,
            price,
            quota_value: if update.amount.is_some() || update.price.is_some() {
                quota_value(price, amount)
            } else {
                current.quota_value
            },
            date: update.date.unwrap_or(current.date),
        };

        let trades: Vec<Trade> = holding
            .trades(kind)
            .iter()
            .map(|t| {
                if t.id == trade_id {
                    updated.clone()
                } else {
                    t.clone()
                }
            })
            .collect();

        if amount != current.amount {
            let restore = -kind.quota_delta(current.amount);
            let apply = kind.quota_delta(amount);
            let change = restore.checked_add(apply).ok_or_else(|| {
                AppError::BadRequest("Quota overflow: amount change is too large".into())
            })?;
            ensure_quota(holding.quota_amount, change)?;

            self.wallets
                .restore_quota(user_id, &asset_name, restore)
                .await?;
            self.wallets
                .replace_trades(user_id, &asset_name, kind, &trades, apply)
                .await?;
        } else {
            self.wallets
                .replace_trades(user_id, &asset_name, kind, &trades, 0)
                .await?;
        }

        tracing::info!("{} {} of {} updated for user {}", kind, trade_id, asset_name, user_id);
        Ok(updated)
    }

    async fn remove_trade(
        &self,
        kind: TradeKind,
        user_id: &str,
        asset_name: &str,
        trade_id: &str,
    ) -> Result<Trade> {
        let asset_name = normalize_asset_name(asset_name);
        let holding = self.load_holding(user_id, &asset_name).await?;
        let removed = holding
            .find_trade(kind, trade_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "{} {} not found for asset {}",
                    kind, trade_id, asset_name
                ))
            })?;

        let delta = -kind.quota_delta(removed.amount);
        ensure_quota(holding.quota_amount, delta)?;

        let remaining: Vec<Trade> = holding
            .trades(kind)
            .iter()
            .filter(|t| t.id != trade_id)
            .cloned()
            .collect();
        self.wallets
            .replace_trades(user_id, &asset_name, kind, &remaining, delta)
            .await?;

        tracing::info!("{} {} of {} removed for user {}", kind, trade_id, asset_name, user_id);
        Ok(removed)
    }
}
