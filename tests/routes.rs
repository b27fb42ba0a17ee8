use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wallet_tracker_backend::auth::AuthManager;
use wallet_tracker_backend::db::{MemoryStorage, Storage};
use wallet_tracker_backend::mailer::{spawn_mail_worker, LogTransport};
use wallet_tracker_backend::models::{Asset, AssetCategory};
use wallet_tracker_backend::tenant::TenantContext;
use wallet_tracker_backend::{app_router, AppState};

const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

async fn build_test_router() -> (Router, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let repos = storage.scope(&TenantContext::default()).await.unwrap();
    repos
        .assets
        .insert_missing(&[Asset {
            name: "ABCD11".into(),
            category: AssetCategory::ReitLike,
        }])
        .await
        .unwrap();

    let (mail, _dead_letters, _worker) = spawn_mail_worker(Arc::new(LogTransport), 16);
    let state = AppState::new(
        storage.clone(),
        AuthManager::new(SECRET, Duration::from_secs(3600)),
        mail,
    );
    (app_router(state, "http://localhost:5173"), storage)
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Register, verify and log in; returns a bearer token.
async fn sign_in(app: &Router, storage: &MemoryStorage) -> String {
    let credentials = json!({ "email": "Ana@Example.com", "password": "correct horse" });

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/auth/register", None, credentials.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Login before verification is refused
    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/auth/login", None, credentials.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let repos = storage.scope(&TenantContext::default()).await.unwrap();
    let user = repos
        .users
        .find_by_email("ana@example.com")
        .await
        .unwrap()
        .unwrap();
    let code = user.verification_code.unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/auth/verify",
            None,
            json!({ "email": "ana@example.com", "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/auth/login", None, credentials))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let login = body_json(response).await;
    assert_eq!(login["token_type"], "Bearer");
    login["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let (app, _) = build_test_router().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn wallet_routes_require_a_token() {
    let (app, _) = build_test_router().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/wallet").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], 401);

    let response = app.oneshot(get("/wallet", "not-a-token")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_is_a_conflict() {
    let (app, _) = build_test_router().await;
    let credentials = json!({ "email": "bob@example.com", "password": "long enough" });

    let first = app
        .clone()
        .oneshot(json_request(Method::POST, "/auth/register", None, credentials.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(json_request(Method::POST, "/auth/register", None, credentials))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn signed_in_user_builds_a_wallet() {
    let (app, storage) = build_test_router().await;
    let token = sign_in(&app, &storage).await;

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/wallet/assets",
            Some(&token),
            json!({ "asset_name": "ABCD11" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/wallet/assets/ABCD11/purchases",
            Some(&token),
            json!({ "amount": 10, "price": "285.10", "date": "2024-01-02" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let purchase = body_json(response).await;
    let purchase_id = purchase["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/wallet/assets/ABCD11/sales",
            Some(&token),
            json!({ "amount": 11, "price": "290.00", "date": "2024-02-02" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            &format!("/wallet/assets/ABCD11/purchases/{purchase_id}"),
            Some(&token),
            json!({ "amount": 12 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get("/wallet/assets/ABCD11/quota", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let quota = body_json(response).await;
    assert_eq!(quota["quota_amount"], 12);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/wallet/assets/ABCD11/purchases/unknown")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn purchases_upload_through_multipart() {
    let (app, storage) = build_test_router().await;
    let token = sign_in(&app, &storage).await;

    let boundary = "wallet-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"purchases.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         Asset Name,Date,Amount,Quota Price,Value / Quota\n\
         ABCD11,01/01/2024,10,28.51,28.51\n\r\n\
         --{boundary}--\r\n"
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/wallet/purchases/file")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let summary = body_json(response).await;
    assert_eq!(summary["registered"], 1);

    let response = app
        .oneshot(get("/wallet/assets/ABCD11/quota", &token))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["quota_amount"], 10);
}

#[tokio::test]
async fn tenants_do_not_share_accounts() {
    let (app, storage) = build_test_router().await;
    sign_in(&app, &storage).await;

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-tenant-id", "acme")
                .body(Body::from(
                    json!({ "email": "ana@example.com", "password": "correct horse" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
