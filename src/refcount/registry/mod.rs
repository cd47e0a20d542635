/*!
 * Object Registry
 *
 * Concurrent reference-counted object registry.
 *
 * ## Layout
 *
 * - **Buckets**: fixed prime-sized array of lazily created bucket heads,
 *   published through `ArcSwapOption` so lookups never take a registry-wide lock
 * - **Envelopes**: per-object count, alive marker, identifier and payload
 * - **Objects lock**: registry-wide `RwLock` taken only to create a bucket head,
 *   to walk the table for diagnostics, and during teardown
 *
 * ## Lifetime protocol
 *
 * - `allocate` creates an object holding one reference
 * - `retain` adds a reference, `release` drops one
 * - The release that takes the count from 1 to 0 clears the alive marker,
 *   unlinks the envelope and runs the destructor outside every bucket lock
 * - A zero count is never incremented again, so a racing `retain` either
 *   extends the object's life or fails cleanly with `InvalidReference`
 * - `Retained` guards release their reference on drop
 */

mod allocator;
mod bucket;
mod diagnostics;
mod envelope;
mod guard;
mod protocol;
mod shutdown;

pub use diagnostics::{FillFactor, RefcountReport, ReportRow, FILL_FACTOR_WARNING};
pub use guard::Retained;

use super::config::RegistryConfig;
use super::trace::{NoopSink, TraceRecord, TraceSink};
use super::traits::{Destructor, Payload};
use super::type_table::TypeTable;
use super::types::{ObjectKind, ObjectRef, RunState};
use crate::core::data_structures::InlineString;
use crate::core::errors::{RefError, RefResult};
use crate::core::limits::HANDLE_BASE;
use crate::core::types::{BucketIndex, RefCount};
use arc_swap::{ArcSwap, ArcSwapOption};
use bucket::Bucket;
use envelope::Envelope;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Reference-counted object registry
///
/// One instance is expected per process; share it through an `Arc`.
///
/// # Performance
/// - Cache-line aligned to keep the hot atomics away from neighbouring data
#[repr(C, align(64))]
pub struct Registry<P: Payload> {
    state: AtomicU8,
    next_address: AtomicU64,
    live: AtomicUsize,
    buckets: Box<[ArcSwapOption<Bucket<P>>]>,
    objects_lock: RwLock<()>,
    types: TypeTable<P>,
    sink: ArcSwap<Box<dyn TraceSink>>,
    sink_injected: bool,
    config: RegistryConfig,
}

impl<P: Payload> Registry<P> {
    /// Create a stopped registry; call `init()` before allocating
    pub fn new(config: RegistryConfig) -> RefResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RegistryConfig) -> Self {
        let buckets = (0..config.bucket_count)
            .map(|_| ArcSwapOption::empty())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        info!(
            buckets = config.bucket_count,
            max_objects = ?config.max_objects,
            "Refcount registry created"
        );

        Self {
            state: AtomicU8::new(RunState::Stopped as u8),
            next_address: AtomicU64::new(HANDLE_BASE),
            live: AtomicUsize::new(0),
            buckets,
            objects_lock: RwLock::new(()),
            types: TypeTable::new(),
            sink: ArcSwap::from_pointee(Box::new(NoopSink) as Box<dyn TraceSink>),
            sink_injected: false,
            config,
        }
    }

    /// Create with configuration taken from `REFCOUNT_*` environment variables
    pub fn from_env() -> RefResult<Self> {
        Self::new(RegistryConfig::from_env()?)
    }

    /// Use `sink` for trace records instead of the configured trace file
    pub fn with_sink<S: TraceSink + 'static>(mut self, sink: S) -> Self {
        self.sink = ArcSwap::from_pointee(Box::new(sink) as Box<dyn TraceSink>);
        self.sink_injected = true;
        self
    }

    /// Bind a destructor for `kind` ahead of the first allocation
    ///
    /// Returns `false` if a destructor was already bound.
    pub fn register_destructor(&self, kind: ObjectKind, destructor: Destructor<P>) -> bool {
        self.types.bind(kind, destructor)
    }

    #[inline]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Number of objects currently registered
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Whether `handle` currently refers to a live object
    pub fn contains(&self, handle: ObjectRef) -> bool {
        self.lookup(handle).is_some()
    }

    /// Current count of a live object
    pub fn refcount(&self, handle: ObjectRef) -> Option<RefCount> {
        self.lookup(handle).map(|env| env.refcount())
    }

    pub fn kind_of(&self, handle: ObjectRef) -> Option<ObjectKind> {
        self.lookup(handle).map(|env| env.kind())
    }

    pub fn identifier(&self, handle: ObjectRef) -> Option<InlineString> {
        self.lookup(handle).map(|env| env.identifier())
    }

    /// Borrow the payload of a live object
    ///
    /// The caller must hold a reference to `handle` for the result to be meaningful.
    pub fn with_payload<R, F>(&self, handle: ObjectRef, f: F) -> Option<R>
    where
        F: FnOnce(&P) -> R,
    {
        self.lookup(handle).map(|env| f(env.payload()))
    }

    #[inline]
    fn bucket_index(&self, handle: ObjectRef) -> BucketIndex {
        (handle.address() % self.buckets.len() as u64) as BucketIndex
    }

    /// Find the alive envelope for `handle`
    pub(crate) fn lookup(&self, handle: ObjectRef) -> Option<Arc<Envelope<P>>> {
        let head = self.buckets[self.bucket_index(handle)].load();
        match &*head {
            Some(bucket) => bucket.find(handle),
            None => None,
        }
    }

    /// Bucket head for `index`, created under the objects lock on first use
    fn bucket_or_create(&self, index: BucketIndex) -> RefResult<Arc<Bucket<P>>> {
        if let Some(bucket) = self.buckets[index].load_full() {
            return Ok(bucket);
        }

        let _objects = self.objects_lock.write();
        // Another thread may have created it while we waited
        if let Some(bucket) = self.buckets[index].load_full() {
            return Ok(bucket);
        }
        if !self.is_running() {
            return Err(RefError::NotRunning {
                state: self.state(),
            });
        }

        let bucket = Arc::new(Bucket::new());
        self.buckets[index].store(Some(Arc::clone(&bucket)));
        Ok(bucket)
    }

    /// Unlink `handle` from its bucket
    fn unlink(&self, handle: ObjectRef) -> Option<Arc<Envelope<P>>> {
        let head = self.buckets[self.bucket_index(handle)].load();
        match &*head {
            Some(bucket) => bucket.remove(handle),
            None => None,
        }
    }

    /// Append a trace record, building it only when the sink wants it
    #[inline]
    fn trace<F>(&self, build: F)
    where
        F: FnOnce() -> TraceRecord,
    {
        let sink = self.sink.load();
        if sink.enabled() {
            sink.append(&build());
        }
    }
}

impl<P: Payload> Default for Registry<P> {
    fn default() -> Self {
        Self::build(RegistryConfig::default())
    }
}

impl<P: Payload> Drop for Registry<P> {
    fn drop(&mut self) {
        if self.is_running() {
            self.destroy();
        }
    }
}
