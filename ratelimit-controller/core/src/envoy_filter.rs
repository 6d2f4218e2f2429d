use crate::versions::{filter_name, VersionCatalog};
use anyhow::{bail, ensure, Result};
use ratelimit_controller_k8s_api::{
    envoy_filter::{
        ApplyTo, ConfigPatch, FilterChainMatch, FilterMatch, ListenerMatch, ObjectMatch,
        Operation, Patch, PatchContext, ProxyMatch, SubFilterMatch, WorkloadSelector,
    },
    ratelimit::ConfigType,
    EnvoyFilter, EnvoyFilterSpec, GlobalRateLimitConfig, ObjectMeta, ResourceExt,
};
use std::sync::Arc;

/// Produces the EnvoyFilters a config requires, one per selected version.
pub trait BuildEnvoyFilters: Send + Sync {
    /// Builds filters in selector order. The config's backend must already
    /// carry an address and port.
    fn build(&self, config: &GlobalRateLimitConfig) -> Result<Vec<EnvoyFilter>>;
}

/// Inserts Envoy's global rate-limit HTTP filter ahead of the router and
/// declares a cluster for the rate-limit service.
#[derive(Clone, Debug)]
pub struct EnvoyFilterBuilder {
    catalog: Arc<VersionCatalog>,
}

const HTTP_CONNECTION_MANAGER: &str = "envoy.filters.network.http_connection_manager";
const HTTP_ROUTER: &str = "envoy.filters.http.router";
const HTTP_RATELIMIT: &str = "envoy.filters.http.ratelimit";
const HTTP_RATELIMIT_TYPE: &str =
    "type.googleapis.com/envoy.extensions.filters.http.ratelimit.v3.RateLimit";

const DEFAULT_TIMEOUT: &str = "0.25s";
const CLUSTER_CONNECT_TIMEOUT: &str = "1s";

// === impl EnvoyFilterBuilder ===

impl EnvoyFilterBuilder {
    pub fn new(catalog: Arc<VersionCatalog>) -> Self {
        Self { catalog }
    }

    /// The proxy version pattern for a label. Labels outside the catalog
    /// match versions with the label as a literal prefix.
    fn proxy_version(&self, label: &str) -> String {
        match self.catalog.pattern(label) {
            Some(pattern) => pattern.to_string(),
            None => format!("^{}.*", regex::escape(label)),
        }
    }
}

impl BuildEnvoyFilters for EnvoyFilterBuilder {
    fn build(&self, config: &GlobalRateLimitConfig) -> Result<Vec<EnvoyFilter>> {
        let name = config.name_any();
        let namespace = config.namespace();
        let spec = &config.spec;
        let ratelimit = &spec.ratelimit.spec;

        ensure!(
            !spec.selector.istio_version.is_empty(),
            "{name} selects no istio versions"
        );
        ensure!(!ratelimit.domain.is_empty(), "{name} has no rate limit domain");
        let Some((address, port)) = ratelimit.service.socket() else {
            bail!("{name} has no rate limit service address");
        };

        let context = match spec.config_type {
            ConfigType::Gateway => PatchContext::Gateway,
            ConfigType::Sidecar => PatchContext::SidecarInbound,
        };
        let cluster = format!("{name}-ratelimit");
        let timeout = ratelimit.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT);
        let workload_selector = if spec.selector.labels.is_empty() {
            None
        } else {
            Some(WorkloadSelector {
                labels: spec.selector.labels.clone(),
            })
        };

        let http_filter = serde_json::json!({
            "name": HTTP_RATELIMIT,
            "typed_config": {
                "@type": HTTP_RATELIMIT_TYPE,
                "domain": ratelimit.domain,
                "failure_mode_deny": ratelimit.failure_mode_deny,
                "timeout": timeout,
                "rate_limit_service": {
                    "grpc_service": {
                        "envoy_grpc": { "cluster_name": cluster },
                        "timeout": timeout,
                    },
                    "transport_api_version": "V3",
                },
            },
        });
        let cluster_value = serde_json::json!({
            "name": cluster,
            "type": "STRICT_DNS",
            "connect_timeout": CLUSTER_CONNECT_TIMEOUT,
            "lb_policy": "ROUND_ROBIN",
            "http2_protocol_options": {},
            "load_assignment": {
                "cluster_name": cluster,
                "endpoints": [{
                    "lb_endpoints": [{
                        "endpoint": {
                            "address": {
                                "socket_address": {
                                    "address": address,
                                    "port_value": port,
                                },
                            },
                        },
                    }],
                }],
            },
        });

        let filters = spec
            .selector
            .istio_version
            .iter()
            .map(|label| {
                let proxy = Some(ProxyMatch {
                    proxy_version: Some(self.proxy_version(label)),
                });
                let http_patch = ConfigPatch {
                    apply_to: ApplyTo::HttpFilter,
                    match_: Some(ObjectMatch {
                        context: Some(context),
                        proxy: proxy.clone(),
                        listener: Some(ListenerMatch {
                            port_number: None,
                            filter_chain: Some(FilterChainMatch {
                                sni: spec.selector.sni.clone(),
                                filter: Some(FilterMatch {
                                    name: Some(HTTP_CONNECTION_MANAGER.to_string()),
                                    sub_filter: Some(SubFilterMatch {
                                        name: Some(HTTP_ROUTER.to_string()),
                                    }),
                                }),
                            }),
                        }),
                        cluster: None,
                    }),
                    patch: Patch {
                        operation: Operation::InsertBefore,
                        value: http_filter.clone(),
                    },
                };
                let cluster_patch = ConfigPatch {
                    apply_to: ApplyTo::Cluster,
                    match_: Some(ObjectMatch {
                        context: Some(context),
                        proxy,
                        ..ObjectMatch::default()
                    }),
                    patch: Patch {
                        operation: Operation::Add,
                        value: cluster_value.clone(),
                    },
                };

                EnvoyFilter {
                    metadata: ObjectMeta {
                        name: Some(filter_name(&name, label)),
                        namespace: namespace.clone(),
                        ..ObjectMeta::default()
                    },
                    spec: EnvoyFilterSpec {
                        workload_selector: workload_selector.clone(),
                        config_patches: vec![http_patch, cluster_patch],
                    },
                }
            })
            .collect();

        Ok(filters)
    }
}
