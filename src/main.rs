use std::sync::Arc;

use tracing::Level;
use wallet_tracker_backend::auth::AuthManager;
use wallet_tracker_backend::config::Config;
use wallet_tracker_backend::db::{DatabasePool, MemoryStorage, Storage};
use wallet_tracker_backend::mailer::{
    spawn_dead_letter_logger, spawn_mail_worker, EmailTransport, HttpTransport, LogTransport,
};
use wallet_tracker_backend::{app_router, AppState};

fn parse_level(raw: &str) -> Level {
    match raw {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set the log level based on the first argument, then LOG_LEVEL
    let args: Vec<String> = std::env::args().collect();
    let log_level = match args.get(1) {
        Some(arg) => parse_level(arg),
        None => std::env::var("LOG_LEVEL")
            .map(|v| parse_level(&v.to_ascii_lowercase()))
            .unwrap_or(Level::INFO),
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .with_max_level(log_level)
        .init();

    tracing::info!("Log level set to: {}", log_level);

    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match &config.mongo_uri {
        Some(uri) => {
            let pool = DatabasePool::new(uri, &config.mongo_db_prefix).await?;
            tracing::info!("Using MongoDB storage (prefix '{}')", config.mongo_db_prefix);
            Arc::new(pool)
        }
        None => {
            tracing::warn!("MONGO_URI is not set; data is kept in memory and lost on exit");
            Arc::new(MemoryStorage::new())
        }
    };

    let transport: Arc<dyn EmailTransport> = match &config.mail_api_url {
        Some(url) => Arc::new(HttpTransport::new(
            url.clone(),
            config.mail_api_key.clone(),
            config.mail_from.clone(),
        )),
        None => {
            tracing::warn!("MAIL_API_URL is not set; emails are written to the log");
            Arc::new(LogTransport)
        }
    };
    let (mail, dead_letters, _mail_worker) =
        spawn_mail_worker(transport, config.mail_queue_capacity);
    spawn_dead_letter_logger(dead_letters);

    let auth = AuthManager::new(config.jwt_secret.as_bytes(), config.jwt_ttl);
    let state = AppState::new(storage, auth, mail);
    let app = app_router(state, &config.frontend_url);

    // Run server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    tracing::info!("Listening on: {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
