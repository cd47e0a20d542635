/*!
 * Object Allocation
 * Envelope creation and insertion into the hash table
 */

use super::envelope::Envelope;
use super::Registry;
use crate::core::errors::{RefError, RefResult};
use crate::core::limits::HANDLE_STRIDE;
use crate::refcount::trace::{TraceEvent, TraceRecord};
use crate::refcount::traits::{Destructor, Payload};
use crate::refcount::types::{ObjectKind, ObjectRef};
use std::panic::Location;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error};

impl<P: Payload> Registry<P> {
    /// Allocate a new object holding one reference
    ///
    /// `destructor` is bound for `kind` unless one is already bound. The
    /// returned handle owes exactly one `release`.
    #[track_caller]
    pub fn allocate(
        &self,
        kind: ObjectKind,
        identifier: &str,
        payload: P,
        destructor: Destructor<P>,
    ) -> RefResult<ObjectRef> {
        let location = Location::caller();
        self.ensure_running(kind, identifier)?;
        self.types.bind(kind, destructor);
        self.insert_new(kind, identifier, payload, location)
    }

    /// Allocate without binding a destructor
    ///
    /// Destruction uses the kind's bound destructor, or `Payload::destroy`.
    #[track_caller]
    pub fn alloc(&self, kind: ObjectKind, identifier: &str, payload: P) -> RefResult<ObjectRef> {
        let location = Location::caller();
        self.ensure_running(kind, identifier)?;
        self.insert_new(kind, identifier, payload, location)
    }

    fn ensure_running(&self, kind: ObjectKind, identifier: &str) -> RefResult<()> {
        if self.is_running() {
            return Ok(());
        }
        let state = self.state();
        error!(%kind, identifier, %state, "Refcount registry not running, allocation rejected");
        Err(RefError::NotRunning { state })
    }

    fn insert_new(
        &self,
        kind: ObjectKind,
        identifier: &str,
        payload: P,
        location: &'static Location<'static>,
    ) -> RefResult<ObjectRef> {
        self.reserve_slot(kind, identifier)?;

        let address = self.next_address.fetch_add(HANDLE_STRIDE, Ordering::Relaxed);
        let handle = match ObjectRef::from_address(address) {
            Some(handle) => handle,
            None => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                return Err(RefError::OutOfMemory {
                    reason: "handle address space exhausted".into(),
                });
            }
        };

        let index = self.bucket_index(handle);
        let envelope = Arc::new(Envelope::new(handle, kind, identifier, payload));

        let inserted = self
            .bucket_or_create(index)
            .and_then(|bucket| bucket.insert(Arc::clone(&envelope)));
        if let Err(e) = inserted {
            self.live.fetch_sub(1, Ordering::AcqRel);
            error!(%kind, identifier, error = %e, "Refcount allocation failed");
            return Err(e);
        }

        // destroy() may have started between the state check and the insert
        if !self.is_running() {
            self.abandon(&envelope);
            let state = self.state();
            error!(%kind, identifier, %state, "Refcount registry stopped during allocation");
            return Err(RefError::NotRunning { state });
        }

        if self.config.debug.verbose(kind) {
            debug!(
                %kind,
                identifier = %envelope.identifier(),
                address = %handle,
                bucket = index,
                "Created refcounted object"
            );
        }
        self.trace(|| {
            TraceRecord::for_object(
                TraceEvent::Allocate,
                handle,
                kind,
                envelope.identifier(),
                1,
                location,
            )
        });

        Ok(handle)
    }

    /// Count the new object against `max_objects`
    fn reserve_slot(&self, kind: ObjectKind, identifier: &str) -> RefResult<()> {
        let live = self.live.fetch_add(1, Ordering::AcqRel);
        if let Some(limit) = self.config.max_objects {
            if live >= limit {
                // Revert the increment
                self.live.fetch_sub(1, Ordering::AcqRel);
                error!(%kind, identifier, live, limit, "Refcount object limit reached");
                return Err(RefError::OutOfMemory {
                    reason: format!("{} live objects, limit {}", live, limit).into(),
                });
            }
        }
        Ok(())
    }

    /// Undo an insert that lost the race against teardown
    fn abandon(&self, envelope: &Arc<Envelope<P>>) {
        if envelope.mark_dead() {
            envelope.zero();
            self.unlink(envelope.handle());
            self.live.fetch_sub(1, Ordering::AcqRel);
            self.types.destroy(envelope.kind(), envelope.payload());
        }
    }
}
