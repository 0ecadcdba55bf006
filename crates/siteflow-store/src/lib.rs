//! Site record store
//!
//! Persists [`SiteRecord`]s keyed by site url. The url is the sole uniqueness
//! constraint: `create` rejects duplicates atomically under the store lock.

pub mod error;
mod json;

pub use error::*;
pub use json::*;

use async_trait::async_trait;
use siteflow_core::SiteRecord;

#[async_trait]
pub trait SiteStore: Send + Sync {
    /// Find a site by its primary url
    async fn find(&self, url: &str) -> Result<Option<SiteRecord>>;

    /// Insert a new record, failing with [`StoreError::SiteExists`] on duplicates
    async fn create(&self, record: &SiteRecord) -> Result<String>;

    async fn list(&self) -> Result<Vec<SiteRecord>>;

    async fn delete(&self, url: &str) -> Result<()>;

    /// Find the site (other than `exclude`) that already serves `domain`
    async fn alias_owner(&self, domain: &str, exclude: &str) -> Result<Option<String>> {
        let owner = self
            .list()
            .await?
            .into_iter()
            .filter(|site| site.site_url != exclude)
            .find(|site| {
                site.site_url == domain || site.alias_domains.iter().any(|alias| alias == domain)
            })
            .map(|site| site.site_url);
        Ok(owner)
    }
}
