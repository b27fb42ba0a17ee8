pub mod asset_catalog;
pub mod user_service;
pub mod wallet_service;
pub mod yield_service;

pub use asset_catalog::AssetCatalog;
pub use user_service::UserService;
pub use wallet_service::{AddAssetOutcome, WalletService};
pub use yield_service::YieldService;

use chrono::NaiveDate;

/// Local calendar date used for every "not in the future" check.
pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
