//! Recorder Daemon
//!
//! HTTP front for the transaction audit recorder.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p recorderd
//!
//! # Start with custom environment
//! RECORDER_ENV=staging RECORDER_HTTP_PORT=8091 cargo run -p recorderd
//! ```
//!
//! # Environment Variables
//!
//! - `RECORDER_ENV`: Environment name used to gate the sinks (default: dev)
//! - `RECORDER_HTTP_HOST`: API host (default: 0.0.0.0)
//! - `RECORDER_HTTP_PORT`: API port (default: 8090)
//! - `REDIS_URL`, or `REDIS_ADDR`/`REDIS_HOST` with `REDIS_USERNAME`/`REDIS_PASSWORD`
//! - `RECORDER_SKIP_CACHE_UPDATE`, `RECORDER_SKIP_NO_PUSH`, `RECORDER_SKIP_DB_SAVE`
//! - `RECORDER_API_TTL_SECONDS_DEFAULT`: Default per-call TTL (default: 30000)
//! - `RECORDER_CACHE_TTL_SECONDS_DEFAULT`: Default document TTL override (default: 0, keep residual)
//! - `RECORDER_MERGE_MAX_ATTEMPTS`: Compare-and-swap attempts (default: 8)
//! - `RECORDER_FLOW_STATUS_TTL_SECS`: Flow status TTL (default: 18000)
//! - `RECORDER_ASYNC_QUEUE_SIZE`, `RECORDER_ASYNC_WORKERS`, `RECORDER_ASYNC_DROP_ON_FULL`,
//!   `RECORDER_ASYNC_JOB_TIMEOUT_MS`
//! - `RECORDER_NO_URL`, `RECORDER_NO_BEARER_TOKEN`, `RECORDER_NO_TIMEOUT_MS`, `RECORDER_NO_ENABLED_ENVS`
//! - `RECORDER_DB_BASE_URL`, `RECORDER_DB_API_KEY`, `RECORDER_DB_TIMEOUT_MS`, `RECORDER_DB_ENABLED_ENVS`

use recorderd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("recorderd=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Recorder Daemon"
    );

    // Create and run daemon
    #[cfg(feature = "redis")]
    let daemon = Daemon::connect(config).await?;
    #[cfg(not(feature = "redis"))]
    let daemon = Daemon::new_memory(config)?;

    daemon.run().await?;

    Ok(())
}
