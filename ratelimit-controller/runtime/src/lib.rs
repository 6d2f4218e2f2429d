#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use ratelimit_controller_core as core;
pub use ratelimit_controller_k8s_api as k8s;

mod args;
mod controller;
mod metrics;
mod store;

pub use self::{args::Args, metrics::ReconcileMetrics, store::KubeStore};
