use crate::Store;
use tracing::{debug, warn};

/// The port rate-limit services serve gRPC on.
pub const RATELIMIT_SERVICE_PORT: u16 = 8081;

/// The cluster-internal address of a rate-limit service.
///
/// Derived on every pass and never stored, so changes to the referenced
/// service are picked up by the next reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub address: String,
    pub port: u16,
}

impl ResolvedAddress {
    pub fn for_service(name: &str, namespace: &str, cluster_domain: &str) -> Self {
        Self {
            address: format!("{name}.{namespace}.svc.{cluster_domain}"),
            port: RATELIMIT_SERVICE_PORT,
        }
    }
}

/// Resolves a RateLimitService reference to its Service address.
///
/// Returns `None` when either the RateLimitService or its Service cannot be
/// read yet; callers should retry shortly rather than fail.
pub async fn resolve<S>(
    store: &S,
    namespace: &str,
    name: &str,
    cluster_domain: &str,
) -> Option<ResolvedAddress>
where
    S: Store + ?Sized,
{
    match store.get_ratelimit_service(namespace, name).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            debug!(%namespace, %name, "RateLimitService not found");
            return None;
        }
        Err(error) => {
            warn!(%namespace, %name, %error, "Failed to get RateLimitService");
            return None;
        }
    }

    match store.get_service(namespace, name).await {
        Ok(Some(_)) => Some(ResolvedAddress::for_service(name, namespace, cluster_domain)),
        Ok(None) => {
            debug!(%namespace, %name, "Service not found");
            None
        }
        Err(error) => {
            warn!(%namespace, %name, %error, "Failed to get Service");
            None
        }
    }
}
