//! Audit Recorder Execution Layer
//!
//! Background work that must never block or fail the caller:
//!
//! - **Dispatcher**: bounded job queue drained by a fixed worker pool
//! - **Ports**: interfaces for the observability and persistence sinks
//! - **Stubs**: recording sink implementations for tests

#![warn(clippy::all)]

pub mod dispatcher;
pub mod error;
pub mod ports;
pub mod stub;

// Re-exports
pub use dispatcher::{
    Admission, AsyncDispatcher, AsyncJob, DispatcherConfig, QueueFullPolicy, DEFAULT_JOB_TIMEOUT,
    DEFAULT_QUEUE_SIZE,
};
pub use error::{ExecError, ExecResult};
pub use ports::{
    ObservabilitySink, PayloadRecord, PersistenceSink, SessionDetails, SessionRecord,
    TxnLogBody, TxnLogRecord,
};
pub use stub::{RecordingObservabilitySink, RecordingPersistenceSink};
