//! Recorder Daemon Library
//!
//! Runtime for the transaction audit recorder.
//!
//! # Architecture
//!
//! ```text
//! HTTP → API Server → AuditIngestor → OptimisticMerger → Document Store
//!                          │                 ↑
//!                          │           FormRecorder
//!                          ↓
//!                   AsyncDispatcher → no-push (observability sink)
//!                                   → db-save (persistence sink)
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **AuditIngestor**: Merges audit events and schedules side effects
//! - **FormRecorder**: Appends form submissions to transaction documents
//! - **SideEffects**: Builds the background jobs for the downstream sinks
//! - **API**: HTTP endpoints
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use recorderd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_memory(config).expect("Failed to build daemon");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod form;
pub mod ingest;
pub mod side_effects;

// Re-exports for convenience
pub use api::{create_router, ApiState};
pub use config::{ApiConfig, AsyncConfig, Config, IngestConfig, SinkConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use form::FormRecorder;
pub use ingest::{AuditIngestor, FollowUp, IngestReceipt};
pub use side_effects::SideEffects;
