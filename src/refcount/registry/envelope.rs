/*!
 * Envelope
 * Per-object bookkeeping: kind, identifier, count, alive marker and payload
 */

use crate::core::data_structures::InlineString;
use crate::core::limits::{IDENTIFIER_MAX, LIVE_MARKER};
use crate::core::types::{RefCount, Size};
use crate::refcount::traits::Payload;
use crate::refcount::types::{ObjectKind, ObjectRef};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

/// Registry-internal wrapper around a payload
pub(crate) struct Envelope<P> {
    handle: ObjectRef,
    kind: ObjectKind,
    identifier: RwLock<InlineString>,
    size: Size,
    refcount: AtomicU32,
    alive: AtomicU32,
    payload: P,
}

impl<P: Payload> Envelope<P> {
    /// Fresh envelope holding the creator's reference
    pub fn new(handle: ObjectRef, kind: ObjectKind, identifier: &str, payload: P) -> Self {
        let size = payload.size();
        Self {
            handle,
            kind,
            identifier: RwLock::new(InlineString::truncated(identifier, IDENTIFIER_MAX)),
            size,
            refcount: AtomicU32::new(1),
            alive: AtomicU32::new(LIVE_MARKER),
            payload,
        }
    }
}

impl<P> Envelope<P> {
    #[inline]
    pub fn handle(&self) -> ObjectRef {
        self.handle
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    #[inline]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn identifier(&self) -> InlineString {
        self.identifier.read().clone()
    }

    pub fn rename(&self, identifier: &str) {
        *self.identifier.write() = InlineString::truncated(identifier, IDENTIFIER_MAX);
    }

    #[inline]
    pub fn refcount(&self) -> RefCount {
        self.refcount.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) == LIVE_MARKER
    }

    /// Add one reference unless the count already reached zero
    ///
    /// Returns the new count. A zero count means the terminal release has
    /// happened, and the object must not be resurrected.
    #[inline]
    pub fn try_increment(&self) -> Option<RefCount> {
        self.refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count == 0 {
                    None
                } else {
                    count.checked_add(1)
                }
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Drop one reference, never going below zero
    ///
    /// Returns the new count; exactly one caller ever observes `Some(0)`.
    #[inline]
    pub fn try_decrement(&self) -> Option<RefCount> {
        self.refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    /// Clear the alive marker; `true` if this call did the clearing
    ///
    /// Whoever clears the marker owns destruction of the payload.
    #[inline]
    pub fn mark_dead(&self) -> bool {
        self.alive.swap(0, Ordering::AcqRel) == LIVE_MARKER
    }

    /// Forced teardown: zero the count so no retain can succeed afterwards
    ///
    /// Returns the count the object had.
    #[inline]
    pub fn zero(&self) -> RefCount {
        self.refcount.swap(0, Ordering::AcqRel)
    }
}
