/*!
 * Refcount Trace Sink
 *
 * Structured per-operation records (allocate, retain, release, destroy, leak,
 * invalid reference) written to a pluggable sink. The default sink drops
 * everything; `FileSink` writes one CSV line per record and `MemorySink`
 * keeps records for inspection in tests.
 */

use super::types::{ObjectKind, ObjectRef};
use crate::core::data_structures::InlineString;
use crate::core::errors::call_site;
use crate::core::types::{Address, RefCount};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Kind of traced event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEvent {
    Allocate,
    Retain,
    Release,
    Destroy,
    Leak,
    Invalid,
}

impl TraceEvent {
    pub const fn name(self) -> &'static str {
        match self {
            TraceEvent::Allocate => "allocate",
            TraceEvent::Retain => "retain",
            TraceEvent::Release => "release",
            TraceEvent::Destroy => "destroy",
            TraceEvent::Leak => "leak",
            TraceEvent::Invalid => "invalid",
        }
    }

    /// Count delta carried by the event
    pub const fn delta(self) -> i32 {
        match self {
            TraceEvent::Allocate | TraceEvent::Retain => 1,
            TraceEvent::Release | TraceEvent::Destroy => -1,
            TraceEvent::Leak | TraceEvent::Invalid => 0,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One traced operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub event: TraceEvent,
    pub address: Address,
    /// Count after the operation
    pub refcount: RefCount,
    pub kind: Option<ObjectKind>,
    pub identifier: InlineString,
    pub thread: InlineString,
    pub location: InlineString,
}

impl TraceRecord {
    /// Record for the calling thread at `location`
    pub fn new(event: TraceEvent, address: Address, location: &Location<'_>) -> Self {
        Self {
            event,
            address,
            refcount: 0,
            kind: None,
            identifier: InlineString::new(),
            thread: current_thread(),
            location: call_site(location),
        }
    }

    pub fn for_object(
        event: TraceEvent,
        handle: ObjectRef,
        kind: ObjectKind,
        identifier: InlineString,
        refcount: RefCount,
        location: &Location<'_>,
    ) -> Self {
        let mut record = Self::new(event, handle.address(), location);
        record.kind = Some(kind);
        record.identifier = identifier;
        record.refcount = refcount;
        record
    }

    /// `address,event,delta,refcount,thread,location,kind:identifier`
    pub fn to_csv(&self) -> String {
        format!(
            "0x{:012x},{},{:+},{},{},{},{}:{}",
            self.address,
            self.event,
            self.event.delta(),
            self.refcount,
            self.thread,
            self.location,
            self.kind.map(ObjectKind::name).unwrap_or("-"),
            self.identifier,
        )
    }
}

fn current_thread() -> InlineString {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.into(),
        None => format!("{:?}", thread.id()).into(),
    }
}

/// Destination for trace records
pub trait TraceSink: Send + Sync {
    fn append(&self, record: &TraceRecord);

    /// Whether records should be built at all
    fn enabled(&self) -> bool {
        true
    }

    /// Flush and release resources; later appends are dropped
    fn close(&self) {}
}

impl<T: TraceSink + ?Sized> TraceSink for Arc<T> {
    fn append(&self, record: &TraceRecord) {
        (**self).append(record)
    }

    fn enabled(&self) -> bool {
        (**self).enabled()
    }

    fn close(&self) {
        (**self).close()
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn append(&self, _record: &TraceRecord) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// In-memory sink for deterministic inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<TraceRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().clone()
    }

    pub fn count(&self, event: TraceEvent) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.event == event)
            .count()
    }

    pub fn events_for(&self, address: Address) -> Vec<TraceEvent> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.address == address)
            .map(|r| r.event)
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl TraceSink for MemorySink {
    fn append(&self, record: &TraceRecord) {
        self.records.lock().push(record.clone());
    }
}

/// CSV trace file, flushed after every record
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl FileSink {
    /// Create (truncate) the trace file
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }
}

impl TraceSink for FileSink {
    fn append(&self, record: &TraceRecord) {
        let mut guard = self.writer.lock();
        if let Some(writer) = guard.as_mut() {
            let result = writeln!(writer, "{}", record.to_csv()).and_then(|_| writer.flush());
            if let Err(e) = result {
                tracing::warn!(path = %self.path.display(), error = %e, "Refcount trace write failed, closing trace file");
                *guard = None;
            }
        }
    }

    fn close(&self) {
        if let Some(mut writer) = self.writer.lock().take() {
            if let Err(e) = writer.flush() {
                tracing::warn!(path = %self.path.display(), error = %e, "Refcount trace flush failed");
            }
            tracing::info!(path = %self.path.display(), "Refcount trace file closed");
        }
    }
}
