pub mod suse;

use crate::errors::*;

/// Capability interface for mapping an upstream URL to an opaque
/// query-string secret. Only one real implementation exists today
/// (`suse::SuseResolver`); absence of a provider is modeled as
/// `NullResolver`, which always answers "no secret."
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, upstream_url: &str) -> Result<Option<String>>;
}

pub struct NullResolver;

#[async_trait::async_trait]
impl Resolver for NullResolver {
    async fn resolve(&self, _upstream_url: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
