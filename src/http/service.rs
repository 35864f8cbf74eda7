//! Decision service exposing the limiter over HTTP.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use crate::ratelimit::{Decision, LimitStatus, SlidingWindowLimiter};

/// Body of a `POST /v1/check` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Client key to account the request against
    pub key: String,
}

/// Body of a `POST /v1/check` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResponse {
    pub decision: Decision,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_ms: u64,
}

impl From<LimitStatus> for CheckResponse {
    fn from(status: LimitStatus) -> Self {
        Self {
            decision: status.decision,
            limit: status.limit,
            remaining: status.remaining,
            reset_after_ms: u64::try_from(status.reset_after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Body of a `GET /v1/stats` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsResponse {
    pub tracked_keys: usize,
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

/// Build the decision service router.
pub fn router(limiter: Arc<SlidingWindowLimiter>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/check", post(check))
        .route("/v1/stats", get(stats))
        .with_state(limiter)
}

async fn health() -> &'static str {
    "ok"
}

/// Account one request against `key` and report the decision.
///
/// Rejections are answered with `429` so callers can act on the status alone.
#[instrument(skip_all)]
async fn check(
    State(limiter): State<Arc<SlidingWindowLimiter>>,
    Json(request): Json<CheckRequest>,
) -> Response {
    match limiter.check(&request.key, Instant::now()) {
        Ok(status) => {
            debug!(
                key = %request.key,
                decision = ?status.decision,
                remaining = status.remaining,
                "Rate limit decision made"
            );
            let code = if status.decision.is_admitted() {
                StatusCode::OK
            } else {
                StatusCode::TOO_MANY_REQUESTS
            };
            (code, Json(CheckResponse::from(status))).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Received rate limit check with invalid key");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid_key",
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn stats(State(limiter): State<Arc<SlidingWindowLimiter>>) -> Json<StatsResponse> {
    let policy = limiter.policy();
    Json(StatsResponse {
        tracked_keys: limiter.tracked_keys(),
        max_requests: policy.max_requests(),
        window_secs: policy.window().as_secs(),
    })
}
