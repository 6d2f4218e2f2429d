use crate::{
    controller::{self, Context},
    core::{EnvoyFilterBuilder, Reconciler, Timings, VersionCatalog},
    k8s::{Api, EnvoyFilter, GlobalRateLimitConfig},
    KubeStore, ReconcileMetrics,
};
use anyhow::{bail, Context as _, Result};
use clap::Parser;
use futures::prelude::*;
use kube::runtime::{controller::Config, watcher, Controller};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "ratelimit", about = "A global rate limit controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "ratelimit=info,warn",
        env = "RATELIMIT_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Only reconciles GlobalRateLimitConfigs in this namespace.
    ///
    /// All namespaces are watched by default.
    #[clap(long, env = "RATELIMIT_CONTROLLER_NAMESPACE")]
    namespace: Option<String>,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    /// Interval at which converged configs are reconciled again to heal drift.
    #[clap(long, default_value = "60")]
    resync_interval_secs: u64,

    /// Interval at which configs waiting for a RateLimitService are retried.
    #[clap(long, default_value = "10")]
    pending_retry_secs: u64,

    #[clap(long, default_value = "5")]
    error_requeue_secs: u64,

    #[clap(long, default_value = "30")]
    reconcile_timeout_secs: u64,

    /// Maximum number of configs reconciled at once. Zero is unbounded.
    #[clap(long, default_value = "0")]
    concurrency: u16,

    /// Additional Istio versions, as comma-separated `label=pattern` pairs
    /// (e.g. `1.16=^1\.16.*`).
    #[clap(long)]
    extra_proxy_versions: Option<ProxyVersions>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct ProxyVersions(Vec<(String, String)>);

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            namespace,
            cluster_domain,
            resync_interval_secs,
            pending_retry_secs,
            error_requeue_secs,
            reconcile_timeout_secs,
            concurrency,
            extra_proxy_versions,
        } = self;

        let ProxyVersions(extra) = extra_proxy_versions.unwrap_or_default();
        let catalog = Arc::new(
            VersionCatalog::well_known()
                .extend(extra)
                .context("invalid --extra-proxy-versions")?,
        );

        let mut prom = <Registry>::default();
        let metrics =
            ReconcileMetrics::register(prom.sub_registry_with_prefix("ratelimit_controller"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let client = runtime.client();
        let reconciler = Reconciler::new(
            KubeStore::new(client.clone(), metrics.clone()),
            EnvoyFilterBuilder::new(catalog.clone()),
            catalog.clone(),
            cluster_domain,
        );
        let ctx = Arc::new(Context {
            reconciler,
            timings: Timings {
                resync: Duration::from_secs(resync_interval_secs),
                pending_retry: Duration::from_secs(pending_retry_secs),
            },
            timeout: Duration::from_secs(reconcile_timeout_secs),
            error_requeue: Duration::from_secs(error_requeue_secs),
            metrics,
        });

        let (configs, filters) = match namespace.as_deref() {
            Some(ns) => (
                Api::<GlobalRateLimitConfig>::namespaced(client.clone(), ns),
                Api::<EnvoyFilter>::namespaced(client, ns),
            ),
            None => (Api::all(client.clone()), Api::all(client)),
        };

        info!(
            namespace = namespace.as_deref().unwrap_or("*"),
            versions = catalog.len(),
            "Starting GlobalRateLimitConfig controller"
        );
        tokio::spawn(
            reconcile_configs(configs, filters, concurrency, ctx, runtime.shutdown_handle())
                .instrument(info_span!("globalratelimitconfigs")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Drives the controller until shutdown. Passes still in flight at shutdown
/// are dropped; the next process re-derives their work from the cluster.
async fn reconcile_configs(
    configs: Api<GlobalRateLimitConfig>,
    filters: Api<EnvoyFilter>,
    concurrency: u16,
    ctx: Arc<Context>,
    drain: drain::Watch,
) {
    let passes = Controller::new(configs, watcher::Config::default())
        .owns(filters, watcher::Config::default())
        .with_config(Config::default().concurrency(concurrency))
        .run(controller::reconcile, controller::error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => debug!(%obj, ?action, "Reconciled"),
                Err(error) => warn!(%error, "Controller failed"),
            }
        });

    tokio::select! {
        _ = passes => {}
        release = drain.signaled() => {
            info!("Stopping GlobalRateLimitConfig controller");
            drop(release);
        }
    }
}

impl std::str::FromStr for ProxyVersions {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .filter(|v| !v.trim().is_empty())
            .map(|v| match v.split_once('=') {
                Some((label, pattern)) if !label.trim().is_empty() && !pattern.is_empty() => {
                    Ok((label.trim().to_string(), pattern.trim().to_string()))
                }
                _ => bail!("expected label=pattern, got {v:?}"),
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }
}
