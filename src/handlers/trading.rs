use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::auth::AuthUser;
use crate::errors::Result;
use crate::models::{MessageResponse, NewTrade, Purchase, Sale, TradeUpdate};
use crate::state::AppState;
use crate::tenant::TenantContext;

/// Record a purchase of an asset already in the caller's wallet.
pub async fn add_purchase(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    Path(asset_name): Path<String>,
    Json(trade): Json<NewTrade>,
) -> Result<(StatusCode, Json<Purchase>)> {
    let wallet = state.wallet_service(&tenant).await?;
    let purchase = wallet
        .add_purchase(&user.user_id, &asset_name, trade)
        .await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

/// Record a sale. Selling more than the held quota is rejected.
pub async fn add_sale(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    Path(asset_name): Path<String>,
    Json(trade): Json<NewTrade>,
) -> Result<(StatusCode, Json<Sale>)> {
    let wallet = state.wallet_service(&tenant).await?;
    let sale = wallet.add_sale(&user.user_id, &asset_name, trade).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

pub async fn update_purchase(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    Path((asset_name, purchase_id)): Path<(String, String)>,
    Json(update): Json<TradeUpdate>,
) -> Result<(StatusCode, Json<Purchase>)> {
    let wallet = state.wallet_service(&tenant).await?;
    let purchase = wallet
        .update_purchase(&user.user_id, &asset_name, &purchase_id, update)
        .await?;
    Ok((StatusCode::OK, Json(purchase)))
}

pub async fn update_sale(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    Path((asset_name, sale_id)): Path<(String, String)>,
    Json(update): Json<TradeUpdate>,
) -> Result<(StatusCode, Json<Sale>)> {
    let wallet = state.wallet_service(&tenant).await?;
    let sale = wallet
        .update_sale(&user.user_id, &asset_name, &sale_id, update)
        .await?;
    Ok((StatusCode::OK, Json(sale)))
}

pub async fn remove_purchase(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    Path((asset_name, purchase_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let wallet = state.wallet_service(&tenant).await?;
    let removed = wallet
        .remove_purchase(&user.user_id, &asset_name, &purchase_id)
        .await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(format!(
            "Purchase {} removed, {} units deducted from the quota",
            removed.id, removed.amount
        ))),
    ))
}

pub async fn remove_sale(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    Path((asset_name, sale_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let wallet = state.wallet_service(&tenant).await?;
    let removed = wallet
        .remove_sale(&user.user_id, &asset_name, &sale_id)
        .await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(format!(
            "Sale {} removed, {} units returned to the quota",
            removed.id, removed.amount
        ))),
    ))
}
