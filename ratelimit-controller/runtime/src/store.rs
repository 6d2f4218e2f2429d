use crate::{
    core::{Store, CONTROLLER_NAME},
    k8s::{
        self, Api, ApiResource, DeleteParams, DynamicObject, EnvoyFilter, GlobalRateLimitConfig,
        PostParams, RateLimitService, ResourceExt, Service,
    },
    ReconcileMetrics,
};
use anyhow::{Context as _, Result};
use tracing::debug;

/// A [`Store`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: k8s::Client,
    metrics: ReconcileMetrics,
}

const ENVOY_FILTER: &str = "EnvoyFilter";

// === impl KubeStore ===

impl KubeStore {
    pub fn new(client: k8s::Client, metrics: ReconcileMetrics) -> Self {
        Self { client, metrics }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        }
    }
}

fn filter_namespace(filter: &EnvoyFilter) -> Result<String> {
    filter
        .namespace()
        .with_context(|| format!("EnvoyFilter {} has no namespace", filter.name_any()))
}

fn is_not_found(error: &k8s::Error) -> bool {
    matches!(error, k8s::Error::Api(response) if response.code == 404)
}

#[async_trait::async_trait]
impl Store for KubeStore {
    async fn get_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GlobalRateLimitConfig>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn get_ratelimit_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RateLimitService>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn get_envoy_filter(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let resource = ApiResource::erase::<EnvoyFilter>(&());
        let api = Api::<DynamicObject>::namespaced_with(self.client.clone(), namespace, &resource);
        Ok(api.get_opt(name).await?)
    }

    async fn create_envoy_filter(&self, filter: &EnvoyFilter) -> Result<()> {
        let api = self.api::<EnvoyFilter>(&filter_namespace(filter)?);
        api.create(&Self::post_params(), filter).await?;
        self.metrics.mutated(ENVOY_FILTER, "create");
        Ok(())
    }

    async fn update_envoy_filter(&self, filter: &EnvoyFilter) -> Result<()> {
        let api = self.api::<EnvoyFilter>(&filter_namespace(filter)?);
        api.replace(&filter.name_any(), &Self::post_params(), filter)
            .await?;
        self.metrics.mutated(ENVOY_FILTER, "update");
        Ok(())
    }

    async fn delete_envoy_filter(&self, namespace: &str, name: &str) -> Result<()> {
        let api = self.api::<EnvoyFilter>(namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                self.metrics.mutated(ENVOY_FILTER, "delete");
                Ok(())
            }
            Err(error) if is_not_found(&error) => {
                debug!(%namespace, %name, "EnvoyFilter already deleted");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}
