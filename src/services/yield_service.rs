use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::db::YieldRepository;
use crate::errors::{AppError, Result};
use crate::import::csv_upload::{ensure_payment_after_base, validate_yield_at};
use crate::import::{parse_yield_file, FileUpload};
use crate::models::{normalize_asset_name, ImportSummary, NewYield, Yield};
use crate::services::asset_catalog::{validate_asset_name, AssetCatalog};
use crate::services::today;

/// `income / base * 100`, rounded to cents.
fn yield_percentage(income_value: Decimal, base_price: Decimal) -> Result<Decimal> {
    income_value
        .checked_div(base_price)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|value| value.round_dp(2))
        .ok_or_else(|| {
            AppError::InvalidNumberFormat(format!(
                "Yield of {} over a base price of {} is out of range",
                income_value, base_price
            ))
        })
}

/// Per-user dividend records, one per asset and `yyyyMM` period.
#[derive(Clone)]
pub struct YieldService {
    yields: Arc<dyn YieldRepository>,
    catalog: AssetCatalog,
}

impl YieldService {
    pub fn new(yields: Arc<dyn YieldRepository>, catalog: AssetCatalog) -> Self {
        Self { yields, catalog }
    }

    /// Register one yield. The same asset and period twice is a `Conflict`.
    pub async fn add_yield(&self, user_id: &str, new: NewYield) -> Result<Yield> {
        let asset_name = validate_asset_name(&new.asset_name)?;
        let today = today();

        validate_yield_at(&new.yield_at, today).map_err(AppError::InvalidStringFormat)?;
        for date in [new.base_date, new.payment_date] {
            if date > today {
                return Err(AppError::InvalidDateFormat(format!(
                    "Date {} is in the future; date must be <= current date",
                    date
                )));
            }
        }
        ensure_payment_after_base(new.base_date, new.payment_date)
            .map_err(AppError::InvalidDateFormat)?;
        if new.base_price <= Decimal::ZERO {
            return Err(AppError::BadRequest("Base price must be greater than zero".into()));
        }
        if new.income_value < Decimal::ZERO {
            return Err(AppError::BadRequest("Income value cannot be negative".into()));
        }
        if !self.catalog.exists(&asset_name).await? {
            return Err(AppError::NotFound(format!("Asset {} does not exist", asset_name)));
        }

        let yield_value = yield_percentage(new.income_value, new.base_price)?;
        let record = Yield {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            key: Yield::composite_key(user_id, &asset_name, &new.yield_at),
            yield_value,
            asset_name,
            yield_at: new.yield_at,
            base_date: new.base_date,
            payment_date: new.payment_date,
            base_price: new.base_price,
            income_value: new.income_value,
        };
        self.yields.insert(&record).await?;

        tracing::info!(
            "Yield {} of {} registered for user {}",
            record.yield_at,
            record.asset_name,
            user_id
        );
        Ok(record)
    }

    /// Import yields from a CSV upload. Periods already stored for the user,
    /// or repeated in the file, are skipped.
    pub async fn import_yields(&self, user_id: &str, upload: Option<&FileUpload>) -> Result<ImportSummary> {
        let parsed = parse_yield_file(upload, today())?;
        let mut stored_keys = self.yields.existing_keys(user_id).await?;
        let mut known_assets: HashSet<String> = HashSet::new();

        let mut records = Vec::new();
        let mut skipped = parsed.skipped;
        for row in parsed.rows {
            if !known_assets.contains(&row.asset_name) {
                validate_asset_name(&row.asset_name)?;
                if !self.catalog.exists(&row.asset_name).await? {
                    return Err(AppError::NotFound(format!(
                        "Row {}: asset {} does not exist",
                        row.row, row.asset_name
                    )));
                }
                known_assets.insert(row.asset_name.clone());
            }

            let key = Yield::composite_key(user_id, &row.asset_name, &row.yield_at);
            if !stored_keys.insert(key.clone()) {
                skipped += 1;
                continue;
            }

            records.push(Yield {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                asset_name: row.asset_name,
                yield_at: row.yield_at,
                base_date: row.base_date,
                payment_date: row.payment_date,
                base_price: row.base_price,
                income_value: row.income_value,
                yield_value: row.yield_value,
                key,
            });
        }

        let registered = self.yields.insert_many(&records).await?;
        tracing::info!(
            "Imported {} yields for user {} ({} skipped)",
            registered,
            user_id,
            skipped
        );
        Ok(ImportSummary { registered, skipped })
    }

    pub async fn list_yields(&self, user_id: &str) -> Result<Vec<Yield>> {
        self.yields.find_by_user(user_id).await
    }

    pub async fn yields_by_asset(&self, user_id: &str, asset_name: &str) -> Result<Vec<Yield>> {
        self.yields
            .find_by_user_and_asset(user_id, &normalize_asset_name(asset_name))
            .await
    }
}
