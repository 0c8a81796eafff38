//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Document store (Redis, or in-memory for development)
//! - Optimistic merger and flow-status updater
//! - Async dispatcher and the two downstream sinks
//! - API Server (HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Start the dispatcher workers
//! 4. Start API server
//! 5. Graceful shutdown on SIGINT (queued background jobs are dropped)

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use recorder_connectors::{ObservabilityClient, PersistenceClient};
use recorder_exec::{AsyncDispatcher, ObservabilitySink, PersistenceSink};
use recorder_store::{DocumentStore, FlowStatusUpdater, MemoryStore, OptimisticMerger};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::form::FormRecorder;
use crate::ingest::AuditIngestor;
use crate::side_effects::SideEffects;

// =============================================================================
// Daemon
// =============================================================================

/// The main recorder daemon.
pub struct Daemon {
    /// Configuration
    config: Config,
    /// Process-scoped lifetime; background jobs derive from it
    lifetime: CancellationToken,
    /// Background job dispatcher
    dispatcher: Arc<AsyncDispatcher>,
    /// Shared handler state
    state: Arc<ApiState>,
}

impl Daemon {
    /// Create a daemon backed by an in-memory store (for testing/development).
    pub fn new_memory(config: Config) -> DaemonResult<Self> {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    /// Create a daemon backed by Redis at `config.redis_url`.
    #[cfg(feature = "redis")]
    pub async fn connect(config: Config) -> DaemonResult<Self> {
        let store = recorder_store::RedisStore::connect(&config.redis_url).await?;
        store.ping().await?;
        Self::new(config, Arc::new(store))
    }

    /// Create a daemon with the provided store.
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> DaemonResult<Self> {
        let lifetime = CancellationToken::new();
        let dispatcher = Arc::new(AsyncDispatcher::new(
            config.dispatcher.dispatcher_config(),
            lifetime.child_token(),
        ));

        let (observability, persistence) = build_sinks(&config)?;
        let merger = OptimisticMerger::new(store.clone(), config.ingest.merge_max_attempts);

        let ingestor = AuditIngestor::new(
            merger.clone(),
            FlowStatusUpdater::new(store.clone(), config.ingest.flow_status_ttl),
            dispatcher.clone(),
            SideEffects::new(observability, persistence, store),
            config.ingest.clone(),
        );

        let state = Arc::new(ApiState {
            ingestor,
            forms: FormRecorder::new(merger),
        });

        Ok(Self { config, lifetime, dispatcher, state })
    }

    /// HTTP router over this daemon's state.
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Background job dispatcher.
    pub fn dispatcher(&self) -> &Arc<AsyncDispatcher> {
        &self.dispatcher
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting recorder daemon"
        );

        // 1. Start background workers
        self.dispatcher.start();

        // 2. Start API server
        let (api_addr, server) = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 3. Wait for shutdown
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
            _ = self.lifetime.cancelled() => info!("Lifetime cancelled"),
        }

        // 4. Graceful shutdown
        self.shutdown();
        if let Err(e) = server.await {
            error!(error = %e, "API server task failed");
        }
        info!("Shutdown complete");

        Ok(())
    }

    /// Start the API server. It stops accepting connections on shutdown.
    async fn start_api_server(&self) -> DaemonResult<(SocketAddr, JoinHandle<()>)> {
        let router = self.router();
        let addr = self.config.bind_addr();

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        // Spawn the server task
        let lifetime = self.lifetime.clone();
        let handle = tokio::spawn(async move {
            let shutdown = async move { lifetime.cancelled().await };
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown).await {
                error!(error = %e, "API server error");
            }
        });

        Ok((local_addr, handle))
    }

    /// Cancel the process lifetime: the server drains, workers stop.
    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown");
        self.dispatcher.shutdown();
        self.lifetime.cancel();
    }
}

/// Build the sink clients that are configured and enabled for this environment.
fn build_sinks(
    config: &Config,
) -> DaemonResult<(Option<Arc<dyn ObservabilitySink>>, Option<Arc<dyn PersistenceSink>>)> {
    let environment = config.environment.as_str();

    let observability: Option<Arc<dyn ObservabilitySink>> =
        if config.observability.is_enabled_for(environment) {
            let sink = &config.observability;
            let client = ObservabilityClient::new(&sink.url, &sink.credential, sink.timeout)
                .map_err(|e| DaemonError::Config(format!("RECORDER_NO_URL: {}", e)))?;
            info!(endpoint = %client.endpoint(), "Observability sink enabled");
            Some(Arc::new(client))
        } else {
            info!(environment, "Observability sink disabled");
            None
        };

    let persistence: Option<Arc<dyn PersistenceSink>> =
        if config.persistence.is_enabled_for(environment) {
            let sink = &config.persistence;
            let client = PersistenceClient::new(&sink.url, &sink.credential, sink.timeout)
                .map_err(|e| DaemonError::Config(format!("RECORDER_DB_BASE_URL: {}", e)))?;
            info!(base_url = %sink.url, "Persistence sink enabled");
            Some(Arc::new(client))
        } else {
            info!(environment, "Persistence sink disabled");
            None
        };

    Ok((observability, persistence))
}

// =============================================================================
// Tests
// =============================================================================
