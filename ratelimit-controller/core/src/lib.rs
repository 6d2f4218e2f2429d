#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod address;
pub mod envoy_filter;
pub mod reconcile;
mod store;
pub mod versions;

pub use self::{
    address::ResolvedAddress,
    envoy_filter::{BuildEnvoyFilters, EnvoyFilterBuilder},
    reconcile::{Outcome, Reconciler, Timings},
    store::Store,
    versions::VersionCatalog,
};

pub const CONTROLLER_NAME: &str = "ratelimit-controller";
