use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::errors::AppError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const DEFAULT_TENANT: &str = "public";

/// Which tenant schema a request reads and writes.
///
/// Built once per request from the `X-Tenant-Id` header and handed to
/// [`crate::db::Storage::scope`]; nothing else in the crate knows about tenants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantContext {
    schema: String,
}

impl TenantContext {
    pub fn new(schema: &str) -> Result<Self, AppError> {
        let schema = schema.trim().to_ascii_lowercase();
        let valid = !schema.is_empty()
            && schema.len() <= 32
            && schema
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(AppError::BadRequest(format!(
                "Invalid tenant '{}': use 1-32 characters of a-z, 0-9 or '_'",
                schema
            )));
        }
        Ok(Self { schema })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

impl Default for TenantContext {
    fn default() -> Self {
        TenantContext {
            schema: DEFAULT_TENANT.to_string(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.headers.get(TENANT_HEADER) {
            None => Ok(TenantContext::default()),
            Some(value) => {
                let raw = value
                    .to_str()
                    .map_err(|_| AppError::BadRequest("Tenant header is not valid text".into()))?;
                TenantContext::new(raw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_names_are_normalized() {
        let tenant = TenantContext::new(" Acme_01 ").unwrap();
        assert_eq!(tenant.schema(), "acme_01");
    }

    #[test]
    fn tenant_names_cannot_escape_the_prefix() {
        assert!(TenantContext::new("acme.prod").is_err());
        assert!(TenantContext::new("").is_err());
        assert!(TenantContext::new(&"a".repeat(33)).is_err());
    }
}
