use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};

use crate::auth::AuthUser;
use crate::errors::Result;
use crate::handlers::read_upload;
use crate::models::{Asset, ImportResponse};
use crate::state::AppState;
use crate::tenant::TenantContext;

/// Look up one asset of the catalog.
pub async fn get_asset(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<Asset>)> {
    let catalog = state.asset_catalog(&tenant).await?;
    Ok((StatusCode::OK, Json(catalog.find(&name).await?)))
}

/// Populate the catalog from a fixed-width exchange listing.
pub async fn import_listing(
    State(state): State<AppState>,
    tenant: TenantContext,
    _user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImportResponse>)> {
    let upload = read_upload(multipart).await?;
    let catalog = state.asset_catalog(&tenant).await?;
    let summary = catalog.import_listing(upload.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(ImportResponse::new(summary, "assets"))))
}
