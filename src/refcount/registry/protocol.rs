/*!
 * Retain / Release Protocol
 *
 * Count mutations are compare-and-exchange loops on the envelope. The
 * release that moves the count from 1 to 0 is the single linearization
 * point for destruction: any retain that lands first extends the object's
 * life, any retain that lands later sees zero and fails.
 */

use super::envelope::Envelope;
use super::Registry;
use crate::core::errors::{call_site, RefError, RefResult};
use crate::refcount::trace::{TraceEvent, TraceRecord};
use crate::refcount::traits::Payload;
use crate::refcount::types::{ObjectRef, Released};
use std::panic::Location;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error};

impl<P: Payload> Registry<P> {
    /// Add a reference to a live object
    ///
    /// Returns the same handle so the call can be used inline:
    /// `let mine = registry.retain(theirs)?;`
    #[track_caller]
    pub fn retain(&self, handle: ObjectRef) -> RefResult<ObjectRef> {
        self.acquire(handle, Location::caller()).map(|_| handle)
    }

    /// Drop a reference, destroying the object on the last one
    ///
    /// Always returns `None`, so `slot = registry.release(h)` clears the
    /// caller's copy of the handle. Errors are logged and swallowed; use
    /// `try_release` to observe them.
    #[track_caller]
    pub fn release(&self, handle: ObjectRef) -> Option<ObjectRef> {
        let _ = self.release_at(handle, Location::caller());
        None
    }

    /// Drop a reference and report what happened
    #[track_caller]
    pub fn try_release(&self, handle: ObjectRef) -> RefResult<Released> {
        self.release_at(handle, Location::caller())
    }

    /// Point `slot` at `new`, retaining the new object before releasing the old one
    ///
    /// If `new` cannot be retained the slot is left untouched. Passing `None`
    /// releases the current occupant and clears the slot.
    #[track_caller]
    pub fn replace(&self, slot: &mut Option<ObjectRef>, new: Option<ObjectRef>) -> RefResult<()> {
        let location = Location::caller();
        let retained = match new {
            Some(handle) => {
                self.acquire(handle, location)?;
                Some(handle)
            }
            None => None,
        };

        if let Some(previous) = std::mem::replace(slot, retained) {
            let _ = self.release_at(previous, location);
        }
        Ok(())
    }

    /// Rename a live object; logged and ignored if the handle is not found
    #[track_caller]
    pub fn update_identifier(&self, handle: ObjectRef, identifier: &str) {
        match self.lookup(handle) {
            Some(envelope) => {
                if self.config.debug.verbose(envelope.kind()) {
                    debug!(
                        kind = %envelope.kind(),
                        address = %handle,
                        from = %envelope.identifier(),
                        to = identifier,
                        "Updated object identifier"
                    );
                }
                envelope.rename(identifier);
            }
            None => {
                let location = Location::caller();
                error!(
                    address = %handle,
                    identifier,
                    location = %call_site(location),
                    "Cannot update identifier of unknown object"
                );
            }
        }
    }

    /// Add a reference and hand back the envelope it pins
    pub(crate) fn acquire(
        &self,
        handle: ObjectRef,
        location: &'static Location<'static>,
    ) -> RefResult<Arc<Envelope<P>>> {
        let envelope = self
            .lookup(handle)
            .ok_or_else(|| self.invalid(handle, "retain", location))?;
        // Zero means the terminal release already happened
        let refcount = envelope
            .try_increment()
            .ok_or_else(|| self.invalid(handle, "retain", location))?;

        if self.config.debug.verbose(envelope.kind()) {
            debug!(
                kind = %envelope.kind(),
                identifier = %envelope.identifier(),
                address = %handle,
                refcount,
                "Retained object"
            );
        }
        self.trace(|| {
            TraceRecord::for_object(
                TraceEvent::Retain,
                handle,
                envelope.kind(),
                envelope.identifier(),
                refcount,
                location,
            )
        });
        Ok(envelope)
    }

    pub(crate) fn release_at(
        &self,
        handle: ObjectRef,
        location: &'static Location<'static>,
    ) -> RefResult<Released> {
        let envelope = self
            .lookup(handle)
            .ok_or_else(|| self.invalid(handle, "release", location))?;
        // A failed decrement means the count was already zero
        let remaining = envelope
            .try_decrement()
            .ok_or_else(|| self.invalid(handle, "release", location))?;

        if remaining > 0 {
            if self.config.debug.verbose(envelope.kind()) {
                debug!(
                    kind = %envelope.kind(),
                    identifier = %envelope.identifier(),
                    address = %handle,
                    refcount = remaining,
                    "Released object"
                );
            }
            self.trace(|| {
                TraceRecord::for_object(
                    TraceEvent::Release,
                    handle,
                    envelope.kind(),
                    envelope.identifier(),
                    remaining,
                    location,
                )
            });
            return Ok(Released::Retained { remaining });
        }

        self.finalize(&envelope, location);
        Ok(Released::Destroyed)
    }

    /// Terminal transition: unlink, then destroy outside every bucket lock
    fn finalize(&self, envelope: &Arc<Envelope<P>>, location: &'static Location<'static>) {
        // Teardown may have claimed the object concurrently
        if !envelope.mark_dead() {
            return;
        }

        let handle = envelope.handle();
        self.unlink(handle);
        self.types.destroy(envelope.kind(), envelope.payload());
        self.live.fetch_sub(1, Ordering::AcqRel);

        if self.config.debug.verbose(envelope.kind()) {
            debug!(
                kind = %envelope.kind(),
                identifier = %envelope.identifier(),
                address = %handle,
                "Destroyed object"
            );
        }
        self.trace(|| {
            TraceRecord::for_object(
                TraceEvent::Destroy,
                handle,
                envelope.kind(),
                envelope.identifier(),
                0,
                location,
            )
        });
    }

    /// Log and trace a use of an unknown or dead handle
    #[cold]
    pub(super) fn invalid(
        &self,
        handle: ObjectRef,
        operation: &'static str,
        location: &'static Location<'static>,
    ) -> RefError {
        let err = RefError::invalid(handle.address(), location);
        error!(
            operation,
            address = %handle,
            location = %call_site(location),
            "ALARM: invalid memory reference"
        );
        self.trace(|| TraceRecord::new(TraceEvent::Invalid, handle.address(), location));
        err
    }
}
