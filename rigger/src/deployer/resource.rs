//! Application resource lookup

use async_trait::async_trait;

/// Checks that an application artifact can be fetched before it is deployed
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn exists(&self, resource: &str, version: &str) -> anyhow::Result<bool>;
}
