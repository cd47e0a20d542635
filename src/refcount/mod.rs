/*!
 * Refcount Subsystem
 *
 * Handle-based reference counting for long-lived shared objects (devices,
 * lines, channels, conference participants, ...) accessed from many threads.
 */

pub mod config;
pub mod registry;
pub mod trace;
pub mod traits;
pub mod type_table;
pub mod types;

pub use config::RegistryConfig;
pub use registry::{FillFactor, RefcountReport, Registry, ReportRow, Retained, FILL_FACTOR_WARNING};
pub use trace::{FileSink, MemorySink, NoopSink, TraceEvent, TraceRecord, TraceSink};
pub use traits::{Destructor, Payload};
pub use type_table::TypeTable;
pub use types::{
    DebugCategory, DebugMask, InUseMode, LeakRecord, ObjectKind, ObjectRef, Released, RunState,
    ShutdownSummary,
};
