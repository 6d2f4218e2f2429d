pub mod global_ratelimit_config;
pub mod ratelimit_service;

pub use self::{
    global_ratelimit_config::{
        Backend, BackendKind, ConfigType, GlobalRateLimitConfig, GlobalRateLimitConfigSpec,
        RateLimit, RateLimitSpec, Selector,
    },
    ratelimit_service::{RateLimitService, RateLimitServiceSpec},
};
