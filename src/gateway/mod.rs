//! HTTP gateway in front of the admission controller.
//!
//! Every request, whatever its path or method, is admitted against the limit
//! of the client it came from:
//!
//! - admitted: `200 OK` with `{"message": "<success message>"}`
//! - rejected: `429 Too Many Requests` with `{"error": "Too Many Requests"}`
//! - client address unavailable: `500 Internal Server Error`
//!
//! ## Example
//!
//! ```rust,no_run
//! use admission_gate::gateway::{Gateway, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> admission_gate::Result<()> {
//!     let config = GatewayConfig::builder()
//!         .listen_addr(([127, 0, 0, 1], 8080).into())
//!         .build();
//!
//!     Gateway::new(config)
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

mod handler;

pub use handler::{ErrorBody, MessageBody, TOO_MANY_REQUESTS};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::rate_limit::{AdmissionController, ClientCounterStore, RateLimitConfig};
use handler::GatewayState;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 8080);

/// Default body message for admitted requests.
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Hello, world!";

/// Configuration for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// Message returned to admitted requests.
    pub success_message: String,
    /// Rate limiting policy.
    pub rate_limit: RateLimitConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR,
            success_message: DEFAULT_SUCCESS_MESSAGE.to_string(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::new()
    }
}

/// Builder for [`GatewayConfig`].
#[derive(Debug, Clone, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
        }
    }

    /// Set the listen address.
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.config.listen_addr = addr;
        self
    }

    /// Set the message returned to admitted requests.
    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.config.success_message = message.into();
        self
    }

    /// Set the rate limiting policy.
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

/// Admission-controlled HTTP server.
///
/// The counter store is created with the gateway and lives until it is
/// dropped; it is shared by every connection.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    controller: AdmissionController,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Create a gateway with a fresh counter store.
    pub fn new(config: GatewayConfig) -> Self {
        let controller = AdmissionController::new(&config.rate_limit);
        Self {
            config,
            controller,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Get the shared counter store.
    pub fn store(&self) -> &Arc<ClientCounterStore> {
        self.controller.store()
    }

    /// Build the router. Requests need `ConnectInfo<SocketAddr>` to be admitted.
    pub fn router(&self) -> Router {
        let state = Arc::new(GatewayState {
            controller: self.controller.clone(),
            limit: self.config.rate_limit.max_requests_per_window,
            success_message: self.config.success_message.clone(),
            shutdown: self.shutdown.clone(),
        });

        Router::new().fallback(handler::admit_request).with_state(state)
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> crate::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// On shutdown every request still backing off is abandoned, then the
    /// server drains its open connections.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> crate::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            %addr,
            limit = self.config.rate_limit.max_requests_per_window,
            window_secs = self.config.rate_limit.window.as_secs(),
            "gateway listening"
        );

        if let Some(interval) = self.config.rate_limit.sweep_interval {
            let store = self.store().clone();
            tokio::spawn(sweep_loop(store, interval, self.shutdown.clone()));
        }

        let router = self.router();
        let token = self.shutdown.clone();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("shutting down gateway");
            token.cancel();
        })
        .await?;

        // Covers the server stopping on its own
        self.shutdown.cancel();
        tracing::info!("gateway stopped");
        Ok(())
    }
}

/// Periodically drop expired client records until `shutdown` fires.
async fn sweep_loop(store: Arc<ClientCounterStore>, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let removed = store.sweep_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "swept expired client records");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.success_message, DEFAULT_SUCCESS_MESSAGE);
        assert_eq!(config.rate_limit.max_requests_per_window, 10);
    }

    #[tokio::test]
    async fn test_run_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = GatewayConfig::builder()
            .listen_addr(taken.local_addr().unwrap())
            .build();

        let result = Gateway::new(config).run(async {}).await;
        assert!(matches!(result, Err(crate::GatewayError::Io(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_loop_removes_expired_records() {
        let store = Arc::new(ClientCounterStore::with_window(Duration::from_secs(5)));
        let shutdown = CancellationToken::new();
        store.try_admit("10.0.0.1", 1).await;

        let every = Duration::from_secs(10);
        let task = tokio::spawn(sweep_loop(store.clone(), every, shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.tracked_clients().await, 0);

        shutdown.cancel();
        task.await.unwrap();
    }
}
