//! Axum middleware that enforces the limiter inline in a request pipeline.
//!
//! Every request is logged. Requests whose method is subject to limiting are
//! keyed by the forwarded-for header (first entry) or the peer address, and
//! short-circuited with `429 Too Many Requests` once the key's window is full.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RateLimitingConfig;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::{ClientKey, LimitStatus, SlidingWindowLimiter};

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Shared state for the [`rate_limit`] middleware.
#[derive(Clone)]
pub struct RateLimitLayerState {
    limiter: Arc<SlidingWindowLimiter>,
    forwarded_header: HeaderName,
    limited_methods: Arc<Vec<Method>>,
}

impl RateLimitLayerState {
    /// Create the middleware state.
    ///
    /// Fails if the header name or any method is not valid HTTP.
    pub fn new(
        limiter: Arc<SlidingWindowLimiter>,
        forwarded_header: &str,
        limited_methods: &[String],
    ) -> Result<Self> {
        let forwarded_header = HeaderName::from_bytes(forwarded_header.trim().as_bytes())
            .map_err(|e| {
                TurnstileError::Configuration(format!(
                    "invalid forwarded header '{}': {}",
                    forwarded_header, e
                ))
            })?;

        let limited_methods = limited_methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).map_err(|e| {
                    TurnstileError::Configuration(format!("invalid HTTP method '{}': {}", m, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            limiter,
            forwarded_header,
            limited_methods: Arc::new(limited_methods),
        })
    }

    /// Create the middleware state from the rate limiting configuration.
    pub fn from_config(limiter: Arc<SlidingWindowLimiter>, config: &RateLimitingConfig) -> Result<Self> {
        Self::new(limiter, &config.forwarded_header, &config.limited_methods)
    }

    /// Get the limiter this layer consults.
    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    fn is_limited(&self, method: &Method) -> bool {
        self.limited_methods.contains(method)
    }
}

/// Rate limiting middleware, to be installed with
/// `axum::middleware::from_fn_with_state`.
pub async fn rate_limit(
    State(state): State<RateLimitLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let forwarded = request
        .headers()
        .get(&state.forwarded_header)
        .and_then(|v| v.to_str().ok());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let key = ClientKey::from_forwarded(forwarded, peer);

    info!(
        method = %request.method(),
        path = %request.uri().path(),
        client = key.as_ref().map(ClientKey::as_str).unwrap_or("unknown"),
        "Incoming request"
    );

    if !state.is_limited(request.method()) {
        return next.run(request).await;
    }

    let key = match key {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "Unable to identify client for rate limiting");
            return (StatusCode::BAD_REQUEST, "Unable to identify client.").into_response();
        }
    };

    let status = state.limiter.check_now(&key);

    if !status.decision.is_admitted() {
        warn!(client = %key, retry_after = ?status.reset_after, "Rejecting request over rate limit");
        let policy = state.limiter.policy();
        let message = format!(
            "Rate limit exceeded. You can only send {} requests per {} seconds.",
            policy.max_requests(),
            policy.window().as_secs()
        );
        let mut response = (StatusCode::TOO_MANY_REQUESTS, message).into_response();
        insert_limit_headers(response.headers_mut(), &status);
        response.headers_mut().insert(
            RETRY_AFTER,
            HeaderValue::from(retry_after_secs(status.reset_after)),
        );
        return response;
    }

    let mut response = next.run(request).await;
    insert_limit_headers(response.headers_mut(), &status);
    response
}

fn insert_limit_headers(headers: &mut HeaderMap, status: &LimitStatus) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(status.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(status.remaining));
}

/// Whole seconds to wait, rounded up and never zero.
pub fn retry_after_secs(reset_after: Duration) -> u64 {
    let secs = reset_after.as_secs() + u64::from(reset_after.subsec_nanos() > 0);
    secs.max(1)
}
