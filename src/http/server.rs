//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service;
use crate::error::Result;
use crate::ratelimit::SlidingWindowLimiter;

/// HTTP server for the rate limit decision service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The limiter instance
    limiter: Arc<SlidingWindowLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server around a shared limiter.
    pub fn new(addr: SocketAddr, limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self { addr, limiter }
    }

    /// Bind the listener and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;
        Self::serve_listener(listener, self.limiter, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_listener<F>(
        listener: TcpListener,
        limiter: Arc<SlidingWindowLimiter>,
        signal: F,
    ) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = service::router(limiter);

        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP server for rate limit decisions"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            e.into()
        })
    }
}
