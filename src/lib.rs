// src/lib.rs
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod import;
pub mod mailer;
pub mod models;
pub mod services;
pub mod state;
pub mod tenant;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{self, TraceLayer};
use tracing::Level;

use crate::handlers::{
    catalog::{get_asset, import_listing},
    health,
    portfolio::{
        add_asset, get_quota, get_wallet, import_purchases, import_sales, list_asset_names,
        list_users_by_asset,
    },
    trading::{add_purchase, add_sale, remove_purchase, remove_sale, update_purchase, update_sale},
    yields::{add_yield, import_yields, list_yields, list_yields_by_asset},
};

// Re-export commonly used items
pub use db::{DatabasePool, MemoryStorage};
pub use errors::{AppError, Result};
pub use state::AppState;
pub use tenant::TENANT_HEADER;

/// Build the application router with CORS and request tracing applied.
pub fn app_router(state: AppState, frontend_url: &str) -> Router {
    let origin = frontend_url.parse::<HeaderValue>().unwrap_or_else(|_| {
        tracing::warn!("FRONTEND_URL '{}' is not a valid origin, using localhost", frontend_url);
        HeaderValue::from_static("http://localhost:5173")
    });

    // Initialize CORS layer
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(vec![Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(vec![
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(TENANT_HEADER),
        ]);

    Router::new()
        .route("/health", get(health))
        // Auth routes
        .route("/auth/register", post(auth::register))
        .route("/auth/verify", post(auth::verify_email))
        .route("/auth/resend-code", post(auth::resend_code))
        .route("/auth/login", post(auth::login))
        // Catalog routes
        .route("/assets/listing", post(import_listing))
        .route("/assets/:name", get(get_asset))
        // Wallet routes
        .route("/wallet", get(get_wallet))
        .route("/wallet/assets", post(add_asset).get(list_asset_names))
        .route("/wallet/assets/:asset/quota", get(get_quota))
        .route("/wallet/assets/:asset/users", get(list_users_by_asset))
        .route("/wallet/assets/:asset/purchases", post(add_purchase))
        .route(
            "/wallet/assets/:asset/purchases/:id",
            patch(update_purchase).delete(remove_purchase),
        )
        .route("/wallet/assets/:asset/sales", post(add_sale))
        .route(
            "/wallet/assets/:asset/sales/:id",
            patch(update_sale).delete(remove_sale),
        )
        .route("/wallet/purchases/file", post(import_purchases))
        .route("/wallet/sales/file", post(import_sales))
        // Yield routes
        .route("/yields", get(list_yields).post(add_yield))
        .route("/yields/file", post(import_yields))
        .route("/yields/:asset", get(list_yields_by_asset))
        .with_state(state)
        // CORS and tracing layers
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
}
