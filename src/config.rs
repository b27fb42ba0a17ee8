use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub frontend_url: String,
    /// `None` runs the server on the in-memory store.
    pub mongo_uri: Option<String>,
    pub mongo_db_prefix: String,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    /// `None` logs outgoing emails instead of sending them.
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
    pub mail_queue_capacity: usize,
}

const MIN_SECRET_LEN: usize = 32;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Initalize dotenv so we can read .env file
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = get("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|e| ConfigError::Invalid {
                name: "LISTEN_ADDR",
                reason: format!("{e}"),
            })?;

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} characters"),
            });
        }

        let jwt_ttl_secs = parse_number(get("JWT_TTL_SECS"), "JWT_TTL_SECS", 86_400)?;
        let mail_queue_capacity = parse_number(get("MAIL_QUEUE_CAPACITY"), "MAIL_QUEUE_CAPACITY", 64)?;

        Ok(Self {
            listen_addr,
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".to_string()),
            mongo_uri: get("MONGO_URI"),
            mongo_db_prefix: get("MONGO_DB_PREFIX").unwrap_or_else(|| "wallet".to_string()),
            jwt_secret,
            jwt_ttl: Duration::from_secs(jwt_ttl_secs),
            mail_api_url: get("MAIL_API_URL"),
            mail_api_key: get("MAIL_API_KEY"),
            mail_from: get("MAIL_FROM").unwrap_or_else(|| "no-reply@localhost".to_string()),
            mail_queue_capacity: mail_queue_capacity as usize,
        })
    }
}

fn parse_number(raw: Option<String>, name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("'{value}' is not a positive integer"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = Config::from_lookup(lookup(&[("JWT_SECRET", SECRET)])).unwrap();
        assert_eq!(config.listen_addr.port(), 3000);
        assert!(config.mongo_uri.is_none());
        assert_eq!(config.mongo_db_prefix, "wallet");
        assert_eq!(config.jwt_ttl, Duration::from_secs(86_400));
        assert_eq!(config.mail_queue_capacity, 64);
    }

    #[test]
    fn secret_is_required_and_must_be_long_enough() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("JWT_SECRET", "short")])),
            Err(ConfigError::Invalid { name: "JWT_SECRET", .. })
        ));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = Config::from_lookup(lookup(&[("JWT_SECRET", SECRET), ("JWT_TTL_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("JWT_TTL_SECS"));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config =
            Config::from_lookup(lookup(&[("JWT_SECRET", SECRET), ("MONGO_URI", "  ")])).unwrap();
        assert!(config.mongo_uri.is_none());
    }
}
