use anyhow::Result;
use ratelimit_controller_k8s_api::{
    DynamicObject, EnvoyFilter, GlobalRateLimitConfig, RateLimitService, Service,
};

/// The declarative object store the reconciler reads desired state from and
/// writes generated EnvoyFilters to.
///
/// Lookups return `Ok(None)` for absent objects. Implementations must not
/// cache reads: every pass re-reads what it decides on.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn get_config(&self, namespace: &str, name: &str)
        -> Result<Option<GlobalRateLimitConfig>>;

    async fn get_ratelimit_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RateLimitService>>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    /// Reads a filter as it is stored, including fields and values this
    /// controller never writes, so that any out-of-band edit is visible.
    async fn get_envoy_filter(&self, namespace: &str, name: &str)
        -> Result<Option<DynamicObject>>;

    async fn create_envoy_filter(&self, filter: &EnvoyFilter) -> Result<()>;

    /// Replaces an existing filter. The filter carries the resource version
    /// it was read at.
    async fn update_envoy_filter(&self, filter: &EnvoyFilter) -> Result<()>;

    /// Deletes a filter. Deleting an absent filter succeeds.
    async fn delete_envoy_filter(&self, namespace: &str, name: &str) -> Result<()>;
}
