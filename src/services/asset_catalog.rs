use std::sync::Arc;

use crate::db::AssetRepository;
use crate::errors::{AppError, Result};
use crate::import::{parse_listing, FileUpload};
use crate::models::{normalize_asset_name, Asset, AssetCategory, ImportSummary};

/// Normalizes a ticker and rejects names that cannot be used as a wallet key.
pub fn validate_asset_name(raw: &str) -> Result<String> {
    let name = normalize_asset_name(raw);
    if name.is_empty() || name.len() > 12 || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(format!(
            "Invalid asset name '{}': use up to 12 letters and digits",
            raw.trim()
        )));
    }
    Ok(name)
}

/// Read side of the asset catalog plus listing ingestion.
#[derive(Clone)]
pub struct AssetCatalog {
    assets: Arc<dyn AssetRepository>,
}

impl AssetCatalog {
    pub fn new(assets: Arc<dyn AssetRepository>) -> Self {
        Self { assets }
    }

    pub async fn find(&self, asset_name: &str) -> Result<Asset> {
        let name = normalize_asset_name(asset_name);
        self.assets
            .find_by_name(&name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {} does not exist", name)))
    }

    pub async fn get_category(&self, asset_name: &str) -> Result<AssetCategory> {
        Ok(self.find(asset_name).await?.category)
    }

    pub async fn exists(&self, asset_name: &str) -> Result<bool> {
        let name = normalize_asset_name(asset_name);
        Ok(self.assets.find_by_name(&name).await?.is_some())
    }

    /// Populate the catalog from an exchange listing. Assets already known
    /// are counted as skipped.
    pub async fn import_listing(&self, upload: Option<&FileUpload>) -> Result<ImportSummary> {
        let upload = upload
            .ok_or_else(|| AppError::EmptyFile("No listing file provided".into()))?;
        let assets = parse_listing(&upload.bytes)?;
        let registered = self.assets.insert_missing(&assets).await?;
        tracing::info!(
            "Listing {} imported: {} new assets out of {}",
            upload.file_name.as_deref().unwrap_or("<unnamed>"),
            registered,
            assets.len()
        );
        Ok(ImportSummary {
            registered,
            skipped: assets.len() - registered,
        })
    }
}
