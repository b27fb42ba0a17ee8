use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// User represents a registered account.
/// The password is only ever stored as an argon2 hash.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub checked: bool,
    pub verification_code: Option<String>,
    pub code_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AssetCategory {
    Equity,
    ReitLike,
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetCategory::Equity => write!(f, "equity"),
            AssetCategory::ReitLike => write!(f, "reit-like"),
        }
    }
}

/// Catalog entry. Immutable once created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub category: AssetCategory,
}

/// A single purchase or sale inside a holding.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: String,
    pub amount: i64,
    pub price: Decimal,
    pub quota_value: Decimal,
    pub date: NaiveDate,
}

pub type Purchase = Trade;
pub type Sale = Trade;

/// Which list of a holding a trade belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    Purchase,
    Sale,
}

impl TradeKind {
    /// Quota contribution of `amount` units of this kind of trade.
    pub fn quota_delta(self, amount: i64) -> i64 {
        match self {
            TradeKind::Purchase => amount,
            TradeKind::Sale => -amount,
        }
    }

    /// Name of the holding field that stores trades of this kind.
    pub fn field(self) -> &'static str {
        match self {
            TradeKind::Purchase => "purchases",
            TradeKind::Sale => "sales",
        }
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeKind::Purchase => write!(f, "purchase"),
            TradeKind::Sale => write!(f, "sale"),
        }
    }
}

/// Per-asset quota balance plus its trade history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AssetHolding {
    pub asset_name: String,
    pub category: AssetCategory,
    pub quota_amount: i64,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
    #[serde(default)]
    pub sales: Vec<Sale>,
}

impl AssetHolding {
    pub fn new(asset_name: impl Into<String>, category: AssetCategory) -> Self {
        AssetHolding {
            asset_name: asset_name.into(),
            category,
            quota_amount: 0,
            purchases: Vec::new(),
            sales: Vec::new(),
        }
    }

    pub fn trades(&self, kind: TradeKind) -> &[Trade] {
        match kind {
            TradeKind::Purchase => &self.purchases,
            TradeKind::Sale => &self.sales,
        }
    }

    pub fn trades_mut(&mut self, kind: TradeKind) -> &mut Vec<Trade> {
        match kind {
            TradeKind::Purchase => &mut self.purchases,
            TradeKind::Sale => &mut self.sales,
        }
    }

    pub fn find_trade(&self, kind: TradeKind, trade_id: &str) -> Option<&Trade> {
        self.trades(kind).iter().find(|t| t.id == trade_id)
    }
}

/// One wallet per user. The map is keyed by asset name; its order carries no
/// meaning beyond giving stable output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Wallet {
    pub user_id: String,
    #[serde(default)]
    pub assets: BTreeMap<String, AssetHolding>,
}

impl Wallet {
    pub fn new(user_id: impl Into<String>) -> Self {
        Wallet {
            user_id: user_id.into(),
            assets: BTreeMap::new(),
        }
    }
}

/// Dividend-like payment for one asset in one `yyyyMM` period.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Yield {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub asset_name: String,
    pub yield_at: String,
    pub base_date: NaiveDate,
    pub payment_date: NaiveDate,
    pub base_price: Decimal,
    pub income_value: Decimal,
    pub yield_value: Decimal,
    pub key: String,
}

impl Yield {
    /// Composite key that keeps one record per user, asset and period.
    pub fn composite_key(user_id: &str, asset_name: &str, yield_at: &str) -> String {
        format!("{}:{}:{}", user_id, asset_name, yield_at)
    }
}

// ── Request / response bodies ───────────────────────────────────────

#[derive(Serialize, Deserialize, Debug)]
pub struct AddAssetRequest {
    pub asset_name: String,
}

/// Body of a manual purchase or sale.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewTrade {
    pub amount: i64,
    pub price: Decimal,
    pub date: NaiveDate,
}

/// Partial update of a trade. Absent fields keep their stored value.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TradeUpdate {
    pub amount: Option<i64>,
    pub price: Option<Decimal>,
    pub date: Option<NaiveDate>,
}

impl TradeUpdate {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.price.is_none() && self.date.is_none()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewYield {
    pub asset_name: String,
    pub yield_at: String,
    pub base_date: NaiveDate,
    pub payment_date: NaiveDate,
    pub base_price: Decimal,
    pub income_value: Decimal,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub registered: usize,
    pub skipped: usize,
}

impl ImportSummary {
    pub fn message(&self, what: &str) -> String {
        format!(
            "{} {} registered, {} duplicate rows skipped",
            self.registered, what, self.skipped
        )
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ImportResponse {
    pub message: String,
    pub registered: usize,
    pub skipped: usize,
}

impl ImportResponse {
    pub fn new(summary: ImportSummary, what: &str) -> Self {
        ImportResponse {
            message: summary.message(what),
            registered: summary.registered,
            skipped: summary.skipped,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct QuotaResponse {
    pub asset_name: String,
    pub quota_amount: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        MessageResponse {
            message: message.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ResendCodeRequest {
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub id: String,
    pub email: String,
    pub message: String,
}

/// Trims and uppercases an asset name so every layer compares tickers the
/// same way.
pub fn normalize_asset_name(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
