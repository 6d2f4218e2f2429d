#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod envoy_filter;
pub mod ratelimit;

pub use self::{
    envoy_filter::{EnvoyFilter, EnvoyFilterSpec},
    ratelimit::{
        BackendKind, GlobalRateLimitConfig, GlobalRateLimitConfigSpec, RateLimitService,
        RateLimitServiceSpec,
    },
};
pub use k8s_openapi::{api::core::v1::Service, apimachinery::pkg::apis::meta::v1::ObjectMeta};
pub use kube::{
    api::{Api, ApiResource, DeleteParams, DynamicObject, PostParams},
    Client, Error, Resource, ResourceExt,
};
