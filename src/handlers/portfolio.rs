use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};

use crate::auth::AuthUser;
use crate::errors::Result;
use crate::handlers::read_upload;
use crate::models::{
    normalize_asset_name, AddAssetRequest, ImportResponse, MessageResponse, QuotaResponse, Wallet,
};
use crate::services::AddAssetOutcome;
use crate::state::AppState;
use crate::tenant::TenantContext;

/// The caller's whole wallet.
pub async fn get_wallet(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
) -> Result<(StatusCode, Json<Wallet>)> {
    let wallet = state.wallet_service(&tenant).await?;
    Ok((StatusCode::OK, Json(wallet.get_wallet(&user.user_id).await?)))
}

/// Add an asset to the wallet, creating the wallet on first use.
pub async fn add_asset(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    Json(body): Json<AddAssetRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let wallet = state.wallet_service(&tenant).await?;
    let outcome = wallet.add_asset(&user.user_id, &body.asset_name).await?;
    let status = match outcome {
        AddAssetOutcome::WalletCreated => StatusCode::CREATED,
        AddAssetOutcome::AssetAdded => StatusCode::OK,
    };
    let message = outcome.message(&normalize_asset_name(&body.asset_name));
    Ok((status, Json(MessageResponse::new(message))))
}

pub async fn get_quota(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    Path(asset_name): Path<String>,
) -> Result<(StatusCode, Json<QuotaResponse>)> {
    let wallet = state.wallet_service(&tenant).await?;
    let quota_amount = wallet.get_quota_amount(&user.user_id, &asset_name).await?;
    Ok((
        StatusCode::OK,
        Json(QuotaResponse {
            asset_name: normalize_asset_name(&asset_name),
            quota_amount,
        }),
    ))
}

/// Every asset name held in any wallet of the tenant.
pub async fn list_asset_names(
    State(state): State<AppState>,
    tenant: TenantContext,
    _user: AuthUser,
) -> Result<(StatusCode, Json<Vec<String>>)> {
    let wallet = state.wallet_service(&tenant).await?;
    Ok((StatusCode::OK, Json(wallet.all_asset_names().await?)))
}

/// Ids of the users holding `asset_name`.
pub async fn list_users_by_asset(
    State(state): State<AppState>,
    tenant: TenantContext,
    _user: AuthUser,
    Path(asset_name): Path<String>,
) -> Result<(StatusCode, Json<Vec<String>>)> {
    let wallet = state.wallet_service(&tenant).await?;
    Ok((
        StatusCode::OK,
        Json(wallet.user_ids_by_asset(&asset_name).await?),
    ))
}

/// Bulk purchases from a CSV sent as the `file` part of a multipart form.
pub async fn import_purchases(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImportResponse>)> {
    let upload = read_upload(multipart).await?;
    let wallet = state.wallet_service(&tenant).await?;
    let summary = wallet
        .import_purchases(&user.user_id, upload.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(ImportResponse::new(summary, "purchases"))))
}

/// Bulk sales from a CSV sent as the `file` part of a multipart form.
pub async fn import_sales(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImportResponse>)> {
    let upload = read_upload(multipart).await?;
    let wallet = state.wallet_service(&tenant).await?;
    let summary = wallet.import_sales(&user.user_id, upload.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(ImportResponse::new(summary, "sales"))))
}
