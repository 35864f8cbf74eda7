//! HTTP surface: inline middleware and the decision service.

mod middleware;
mod server;
mod service;

pub use middleware::{
    rate_limit, retry_after_secs, RateLimitLayerState, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING,
};
pub use server::HttpServer;
pub use service::{router, CheckRequest, CheckResponse, StatsResponse};
