use std::net::SocketAddr;
use std::time::Duration;

use admission_gate::gateway::{DEFAULT_SUCCESS_MESSAGE, Gateway, GatewayConfig};
use admission_gate::rate_limit::{RateLimitConfig, limits};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Per-client rate limiting gateway with exponential backoff.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Maximum number of requests per minute per client address
    #[arg(
        long,
        env = "MAX_REQUESTS_PER_MINUTE",
        default_value_t = limits::MAX_REQUESTS_PER_WINDOW
    )]
    max_requests_per_minute: u32,

    /// Listening address for the server
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Reject once this many backoff retries have been attempted
    #[arg(long, env = "MAX_RETRIES", default_value_t = limits::MAX_RETRIES)]
    max_retries: u32,

    /// Reject instead of waiting once the next backoff reaches this many seconds
    #[arg(
        long,
        env = "MAX_BACKOFF_SECS",
        default_value_t = limits::MAX_BACKOFF.as_secs()
    )]
    max_backoff_secs: u64,

    /// Drop expired client records every this many seconds (disabled when unset)
    #[arg(long, env = "SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    /// Message returned to admitted requests
    #[arg(long, env = "SUCCESS_MESSAGE", default_value = DEFAULT_SUCCESS_MESSAGE)]
    success_message: String,
}

impl Args {
    fn into_config(self) -> GatewayConfig {
        let mut rate_limit = RateLimitConfig::builder()
            .max_requests_per_window(self.max_requests_per_minute)
            .max_retries(self.max_retries)
            .max_backoff(Duration::from_secs(self.max_backoff_secs));
        if let Some(secs) = self.sweep_interval_secs {
            rate_limit = rate_limit.sweep_interval(Duration::from_secs(secs));
        }

        GatewayConfig::builder()
            .listen_addr(self.listen)
            .success_message(self.success_message)
            .rate_limit(rate_limit.build())
            .build()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();
    Gateway::new(config)
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_library() {
        let config = Args::parse_from(["admission-gate"]).into_config();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Args::parse_from([
            "admission-gate",
            "--max-requests-per-minute",
            "3",
            "--listen",
            "127.0.0.1:9000",
            "--sweep-interval-secs",
            "120",
        ])
        .into_config();

        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.rate_limit.max_requests_per_window, 3);
        assert_eq!(
            config.rate_limit.sweep_interval,
            Some(Duration::from_secs(120))
        );
    }
}
