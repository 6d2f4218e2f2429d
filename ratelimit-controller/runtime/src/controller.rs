use crate::{
    core::{reconcile, EnvoyFilterBuilder, Outcome, Reconciler, Timings},
    k8s::{GlobalRateLimitConfig, ResourceExt},
    KubeStore, ReconcileMetrics,
};
use kube::runtime::controller::Action;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time;
use tracing::{info_span, warn, Instrument};

/// Shared state for reconciling GlobalRateLimitConfigs.
pub struct Context {
    pub(crate) reconciler: Reconciler<KubeStore, EnvoyFilterBuilder>,
    pub(crate) timings: Timings,
    pub(crate) timeout: Duration,
    pub(crate) error_requeue: Duration,
    pub(crate) metrics: ReconcileMetrics,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reconcile(#[from] reconcile::Error),

    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),
}

/// Runs a single pass for the config and converts its outcome into a requeue
/// action.
///
/// Only the config's identity is used; the pass re-reads the config itself.
pub(crate) async fn reconcile(
    config: Arc<GlobalRateLimitConfig>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let namespace = config.namespace().unwrap_or_default();
    let name = config.name_any();
    let span = info_span!("reconcile", %namespace, %name);

    let pass = ctx.reconciler.reconcile(&namespace, &name).instrument(span);
    let outcome = bounded(pass, ctx.timeout, &ctx.metrics).await?;
    Ok(action(ctx.timings.requeue_after(outcome)))
}

/// Runs a pass to completion or until `timeout` elapses, recording its
/// outcome. A timed out pass is dropped where it stands.
async fn bounded<F>(
    pass: F,
    timeout: Duration,
    metrics: &ReconcileMetrics,
) -> Result<Outcome, Error>
where
    F: Future<Output = Result<Outcome, reconcile::Error>>,
{
    match time::timeout(timeout, pass).await {
        Ok(Ok(outcome)) => {
            metrics.pass(outcome);
            Ok(outcome)
        }
        Ok(Err(error)) => {
            metrics.failed();
            Err(error.into())
        }
        Err(_) => {
            metrics.timed_out();
            Err(Error::Timeout(timeout))
        }
    }
}

pub(crate) fn error_policy(
    config: Arc<GlobalRateLimitConfig>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    warn!(
        namespace = %config.namespace().unwrap_or_default(),
        name = %config.name_any(),
        %error,
        "Reconciliation failed"
    );
    Action::requeue(ctx.error_requeue)
}

fn action(requeue_after: Option<Duration>) -> Action {
    match requeue_after {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}
