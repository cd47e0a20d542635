/*!
 * Refcount Registry Library
 * Concurrent reference-counted object registry exposed as a library
 */

pub mod core;
pub mod monitoring;
pub mod refcount;

// Re-exports
pub use crate::core::errors::{RefError, RefResult};
pub use crate::core::limits;
pub use monitoring::{init_tracing, span_operation};
pub use refcount::{
    DebugCategory, DebugMask, FileSink, FillFactor, InUseMode, LeakRecord, MemorySink, NoopSink,
    ObjectKind, ObjectRef, Payload, RefcountReport, Registry, RegistryConfig, Released,
    ReportRow, Retained, RunState, ShutdownSummary, TraceEvent, TraceRecord, TraceSink,
    FILL_FACTOR_WARNING,
};
