//! Contract with the remote account API

use crate::core::account::{Account, AccountClass, NetWorthPoint, ValuePoint};
use crate::core::error::Result;
use async_trait::async_trait;

/// The narrow surface the cache needs from the remote API.
///
/// Implementations return amounts already converted to the store's sign
/// convention (liabilities negative).
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Account metadata for one class. Values are never populated.
    async fn list_accounts(&self, class: AccountClass) -> Result<Vec<Account>>;

    /// Full value series of one account, ascending by timestamp.
    async fn fetch_values(&self, class: AccountClass, name: &str) -> Result<Vec<ValuePoint>>;

    /// Pre-aggregated net worth series.
    async fn fetch_net_worth(&self) -> Result<Vec<NetWorthPoint>>;
}
