//! Audit Recorder Storage Layer
//!
//! Shared key-value store access for transaction documents.
//!
//! # Architecture
//!
//! - **`DocumentStore` trait**: the storage port (read with residual TTL,
//!   compare-and-swap, plain get/set/exists)
//! - **In-memory store**: CAS + TTL emulation for tests and development
//! - **Redis store**: production implementation (feature `redis`)
//! - **Merge engine**: one optimistic read → transform → conditional write cycle
//! - **`OptimisticMerger`**: bounded retry around the merge engine
//! - **`FlowStatusUpdater`**: conditional update of the advisory flow status
//!
//! # Usage
//!
//! ```rust
//! use recorder_domain::{transaction_key, FormAppend};
//! use recorder_store::{DocumentStore, Expiry, MemoryStore, OptimisticMerger};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let key = transaction_key("t1", "https://bap.example/");
//!     store.set(&key, "{}".to_string(), Expiry::Persistent).await.unwrap();
//!
//!     let merger = OptimisticMerger::new(store.clone(), 8);
//!     let form = FormAppend { form_id: "f1".to_string(), ..Default::default() };
//!     merger.append_form(&key, &form, None).await.unwrap();
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod controller;
mod error;
mod flow_status;
mod memory;
mod merge;
#[cfg(feature = "redis")]
mod redis_store;
mod repository;

// Re-exports
pub use controller::{OptimisticMerger, DEFAULT_MAX_ATTEMPTS};
pub use error::{MergeError, StoreError, StoreResult};
pub use flow_status::{FlowStatusUpdater, DEFAULT_FLOW_STATUS_TTL, FLOW_STATUS_AVAILABLE};
pub use memory::MemoryStore;
pub use merge::{decode_document, load_document, merge_once, MergeOutcome};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use repository::{CasToken, DocumentStore, Expiry, Snapshot};
