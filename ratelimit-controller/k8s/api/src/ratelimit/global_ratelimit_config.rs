use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// GlobalRateLimitConfig declares that a set of workloads should consult an
/// external rate-limit service before handling HTTP requests.
///
/// The controller turns each config into one EnvoyFilter per selected Istio
/// proxy version.
#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ratelimit.zufardhiyaulhaq.com",
    version = "v1alpha1",
    kind = "GlobalRateLimitConfig",
    namespaced
)]
pub struct GlobalRateLimitConfigSpec {
    /// Whether the filter is attached to gateway or sidecar listeners.
    #[serde(rename = "type", default)]
    pub config_type: ConfigType,
    pub selector: Selector,
    pub ratelimit: RateLimit,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    #[default]
    Gateway,
    Sidecar,
}

/// Selects the workloads and the proxy versions that filters are generated
/// for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Selector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Version labels (e.g. `1.10`), one EnvoyFilter is generated for each.
    #[serde(default)]
    pub istio_version: Vec<String>,

    /// Restricts the filter to listener filter chains serving this SNI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RateLimit {
    pub spec: RateLimitSpec,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RateLimitSpec {
    /// The rate-limit domain sent with every descriptor.
    pub domain: String,

    #[serde(default)]
    pub failure_mode_deny: bool,

    /// Rate-limit service call timeout, as an Envoy duration (e.g. `0.25s`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    pub service: Backend,
}

/// The rate-limit service to call.
///
/// A backend either names an address and port directly or, when its type is
/// `service`, names a RateLimitService in the config's namespace whose
/// address is resolved on every reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Backend {
    #[serde(rename = "type", default)]
    pub kind: BackendKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Address,
    Service,
}

// === impl Backend ===

impl Backend {
    /// Returns the concrete address and port, if both are known.
    pub fn socket(&self) -> Option<(&str, u16)> {
        match (self.address.as_deref(), self.port) {
            (Some(address), Some(port)) if !address.is_empty() => Some((address, port)),
            _ => None,
        }
    }

    pub fn set_socket(&mut self, address: impl Into<String>, port: u16) {
        self.address = Some(address.into());
        self.port = Some(port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_service_backend() {
        let spec: GlobalRateLimitConfigSpec = serde_json::from_value(serde_json::json!({
            "type": "gateway",
            "selector": {
                "labels": { "istio": "ingressgateway" },
                "istio_version": ["1.10", "1.11"],
            },
            "ratelimit": {
                "spec": {
                    "domain": "public-gateway",
                    "failure_mode_deny": true,
                    "timeout": "1s",
                    "service": { "type": "service", "name": "public-ratelimit" },
                },
            },
        }))
        .expect("spec must deserialize");

        assert_eq!(spec.config_type, ConfigType::Gateway);
        assert_eq!(spec.selector.istio_version, vec!["1.10", "1.11"]);
        assert_eq!(spec.ratelimit.spec.service.kind, BackendKind::Service);
        assert_eq!(
            spec.ratelimit.spec.service.name.as_deref(),
            Some("public-ratelimit")
        );
        assert_eq!(spec.ratelimit.spec.service.socket(), None);
    }

    #[test]
    fn address_backend_is_not_a_reference() {
        let backend: Backend = serde_json::from_value(serde_json::json!({
            "address": "ratelimit.example.com",
            "port": 8081,
        }))
        .expect("backend must deserialize");

        assert_eq!(backend.kind, BackendKind::Address);
        assert_eq!(backend.name, None);
        assert_eq!(backend.socket(), Some(("ratelimit.example.com", 8081)));
    }

    #[test]
    fn set_socket_resolves_service_backend() {
        let mut backend = Backend {
            kind: BackendKind::Service,
            name: Some("rl".to_string()),
            ..Backend::default()
        };
        backend.set_socket("rl.ns.svc.cluster.local", 8081);
        assert_eq!(backend.socket(), Some(("rl.ns.svc.cluster.local", 8081)));
        // The reference is kept so the next pass resolves it again.
        assert_eq!(backend.kind, BackendKind::Service);
        assert_eq!(backend.name.as_deref(), Some("rl"));
    }
}
