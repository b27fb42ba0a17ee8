use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};

use crate::auth::AuthUser;
use crate::errors::Result;
use crate::handlers::read_upload;
use crate::models::{ImportResponse, NewYield, Yield};
use crate::state::AppState;
use crate::tenant::TenantContext;

pub async fn list_yields(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
) -> Result<(StatusCode, Json<Vec<Yield>>)> {
    let yields = state.yield_service(&tenant).await?;
    Ok((StatusCode::OK, Json(yields.list_yields(&user.user_id).await?)))
}

pub async fn list_yields_by_asset(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    Path(asset_name): Path<String>,
) -> Result<(StatusCode, Json<Vec<Yield>>)> {
    let yields = state.yield_service(&tenant).await?;
    Ok((
        StatusCode::OK,
        Json(yields.yields_by_asset(&user.user_id, &asset_name).await?),
    ))
}

/// Register one yield manually.
pub async fn add_yield(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    Json(body): Json<NewYield>,
) -> Result<(StatusCode, Json<Yield>)> {
    let yields = state.yield_service(&tenant).await?;
    let record = yields.add_yield(&user.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn import_yields(
    State(state): State<AppState>,
    tenant: TenantContext,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImportResponse>)> {
    let upload = read_upload(multipart).await?;
    let yields = state.yield_service(&tenant).await?;
    let summary = yields.import_yields(&user.user_id, upload.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(ImportResponse::new(summary, "yields"))))
}
