use std::sync::Arc;

use crate::auth::AuthManager;
use crate::db::Storage;
use crate::errors::Result;
use crate::mailer::MailQueue;
use crate::services::{AssetCatalog, UserService, WalletService, YieldService};
use crate::tenant::TenantContext;

/// Shared application state. Services are assembled per request from the
/// repositories of the caller's tenant.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub auth: Arc<AuthManager>,
    pub mail: MailQueue,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, auth: AuthManager, mail: MailQueue) -> Self {
        Self {
            storage,
            auth: Arc::new(auth),
            mail,
        }
    }

    pub async fn asset_catalog(&self, tenant: &TenantContext) -> Result<AssetCatalog> {
        let repos = self.storage.scope(tenant).await?;
        Ok(AssetCatalog::new(repos.assets))
    }

    pub async fn wallet_service(&self, tenant: &TenantContext) -> Result<WalletService> {
        let repos = self.storage.scope(tenant).await?;
        Ok(WalletService::new(
            repos.wallets,
            AssetCatalog::new(repos.assets),
        ))
    }

    pub async fn yield_service(&self, tenant: &TenantContext) -> Result<YieldService> {
        let repos = self.storage.scope(tenant).await?;
        Ok(YieldService::new(repos.yields, AssetCatalog::new(repos.assets)))
    }

    pub async fn user_service(&self, tenant: &TenantContext) -> Result<UserService> {
        let repos = self.storage.scope(tenant).await?;
        Ok(UserService::new(repos.users, self.mail.clone()))
    }
}
