//! Converges a GlobalRateLimitConfig's EnvoyFilters with the store.
//!
//! A pass fetches the config, resolves its rate-limit service, builds the
//! desired filters, deletes filters for deselected versions and then creates
//! or updates the desired filters. Every decision is made against freshly read
//! store state, so a pass may be interrupted at any point and the next pass
//! picks up where it left off.

use crate::{address, envoy_filter::BuildEnvoyFilters, versions::VersionCatalog, Store};
use ratelimit_controller_k8s_api::{BackendKind, Resource, ResourceExt};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};


pub struct Reconciler<S, B> {
    store: S,
    builder: B,
    catalog: Arc<VersionCatalog>,
    cluster_domain: String,
}

/// How a pass ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The config no longer exists. Its filters are garbage collected by the
    /// store through their owner references.
    Absent,

    /// The referenced rate-limit service isn't available yet.
    Pending,

    /// A missing filter was created. At most one filter is created per pass;
    /// the remaining filters are handled by the next pass.
    Created,

    /// Every selected filter exists with its desired spec.
    Converged,
}

/// Requeue intervals for each pass outcome.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timings {
    /// Delay before reconciling a config again after a successful pass.
    pub resync: Duration,

    /// Delay before retrying a config whose rate-limit service is missing.
    pub pending_retry: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to build envoy filters: {0:#}")]
    Build(anyhow::Error),

    #[error("envoy filter builder returned no filters")]
    EmptyBuild,

    #[error("failed to encode EnvoyFilter {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} has no uid and cannot own envoy filters")]
    MissingOwner(String),

    #[error("failed to {op} {name}: {error:#}")]
    Store {
        op: &'static str,
        name: String,
        error: anyhow::Error,
    },
}

// === impl Outcome ===

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Pending => "pending",
            Self::Created => "created",
            Self::Converged => "converged",
        }
    }
}

// === impl Timings ===

impl Default for Timings {
    fn default() -> Self {
        Self {
            resync: Duration::from_secs(60),
            pending_retry: Duration::from_secs(10),
        }
    }
}

impl Timings {
    /// Returns when the config should be reconciled again, absent any change
    /// notification.
    pub fn requeue_after(&self, outcome: Outcome) -> Option<Duration> {
        match outcome {
            Outcome::Absent => None,
            Outcome::Pending => Some(self.pending_retry),
            Outcome::Created | Outcome::Converged => Some(self.resync),
        }
    }
}

// === impl Error ===

impl Error {
    fn store(op: &'static str, name: impl ToString) -> impl FnOnce(anyhow::Error) -> Self {
        let name = name.to_string();
        move |error| Self::Store { op, name, error }
    }
}

// === impl Reconciler ===

impl<S, B> Reconciler<S, B>
where
    S: Store,
    B: BuildEnvoyFilters,
{
    pub fn new(
        store: S,
        builder: B,
        catalog: Arc<VersionCatalog>,
        cluster_domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            builder,
            catalog,
            cluster_domain: cluster_domain.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs a single convergence pass for the named config.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Outcome, Error> {
        let Some(mut config) = self
            .store
            .get_config(namespace, name)
            .await
            .map_err(Error::store("get GlobalRateLimitConfig", name))?
        else {
            debug!("GlobalRateLimitConfig not found");
            return Ok(Outcome::Absent);
        };

        let backend = &mut config.spec.ratelimit.spec.service;
        if backend.kind == BackendKind::Service {
            let service = backend.name.clone().unwrap_or_default();
            let resolved = if service.is_empty() {
                None
            } else {
                address::resolve(&self.store, namespace, &service, &self.cluster_domain).await
            };
            match resolved {
                Some(resolved) => {
                    debug!(
                        address = %resolved.address,
                        port = resolved.port,
                        "Resolved RateLimitService"
                    );
                    backend.set_socket(resolved.address, resolved.port);
                }
                None => {
                    info!(%service, "Waiting for RateLimitService");
                    return Ok(Outcome::Pending);
                }
            }
        }

        let filters = self.builder.build(&config).map_err(Error::Build)?;
        if filters.is_empty() {
            return Err(Error::EmptyBuild);
        }

        let owner = config
            .controller_owner_ref(&())
            .ok_or_else(|| Error::MissingOwner(format!("{namespace}/{name}")))?;

        let versions = config
            .spec
            .selector
            .istio_version
            .iter()
            .map(String::as_str);
        for stale in self.catalog.stale_names(name, versions) {
            self.prune(namespace, &stale).await?;
        }

        for mut filter in filters {
            filter.metadata.owner_references = Some(vec![owner.clone()]);
            let filter_ns = filter
                .metadata
                .namespace
                .get_or_insert_with(|| namespace.to_string())
                .clone();
            let filter_name = filter.name_any();

            let existing = self
                .store
                .get_envoy_filter(&filter_ns, &filter_name)
                .await
                .map_err(Error::store("get EnvoyFilter", &filter_name))?;
            match existing {
                None => {
                    info!(envoyfilter = %filter_name, "Creating EnvoyFilter");
                    self.store
                        .create_envoy_filter(&filter)
                        .await
                        .map_err(Error::store("create EnvoyFilter", &filter_name))?;
                    return Ok(Outcome::Created);
                }
                Some(existing) => {
                    let desired = serde_json::to_value(&filter.spec).map_err(|source| {
                        Error::Encode {
                            name: filter_name.clone(),
                            source,
                        }
                    })?;
                    if existing.data.get("spec") == Some(&desired) {
                        debug!(envoyfilter = %filter_name, "EnvoyFilter up to date");
                        continue;
                    }

                    info!(envoyfilter = %filter_name, "Updating EnvoyFilter");
                    filter.metadata = existing.metadata;
                    self.store
                        .update_envoy_filter(&filter)
                        .await
                        .map_err(Error::store("update EnvoyFilter", &filter_name))?;
                }
            }
        }

        Ok(Outcome::Converged)
    }

    async fn prune(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let found = self
            .store
            .get_envoy_filter(namespace, name)
            .await
            .map_err(Error::store("get EnvoyFilter", name))?;
        if found.is_none() {
            return Ok(());
        }

        info!(envoyfilter = %name, "Deleting unused EnvoyFilter");
        self.store
            .delete_envoy_filter(namespace, name)
            .await
            .map_err(Error::store("delete EnvoyFilter", name))
    }
}
