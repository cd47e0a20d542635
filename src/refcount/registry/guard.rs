/*!
 * Reference Guards
 *
 * RAII guard owning one reference, released on drop
 */

use super::envelope::Envelope;
use super::Registry;
use crate::core::errors::RefResult;
use crate::refcount::traits::Payload;
use crate::refcount::types::{ObjectKind, ObjectRef, Released};
use std::fmt;
use std::ops::Deref;
use std::panic::Location;
use std::sync::Arc;
use tracing::error;

/// One counted reference to a registry object
///
/// # Example
///
/// ```ignore
/// let line = registry.retained(handle)?;
/// line.ring();
/// // Reference released when `line` goes out of scope
/// ```
pub struct Retained<'r, P: Payload> {
    registry: &'r Registry<P>,
    envelope: Arc<Envelope<P>>,
    location: &'static Location<'static>,
    active: bool,
}

impl<'r, P: Payload> Retained<'r, P> {
    #[inline]
    pub fn handle(&self) -> ObjectRef {
        self.envelope.handle()
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.envelope.kind()
    }

    /// Take another counted reference to the same object
    #[track_caller]
    pub fn duplicate(&self) -> RefResult<Retained<'r, P>> {
        self.registry.retained(self.handle())
    }

    /// Give up the guard without releasing; the caller now owes the release
    pub fn into_handle(mut self) -> ObjectRef {
        self.active = false;
        self.handle()
    }

    /// Release now instead of at drop
    pub fn release_early(mut self) -> RefResult<Released> {
        self.active = false;
        self.registry.release_at(self.handle(), self.location)
    }
}

impl<P: Payload> Deref for Retained<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        self.envelope.payload()
    }
}

impl<P: Payload> fmt::Debug for Retained<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retained")
            .field("handle", &self.handle())
            .field("kind", &self.kind())
            .field("active", &self.active)
            .finish()
    }
}

impl<P: Payload> Drop for Retained<'_, P> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = self.registry.release_at(self.handle(), self.location) {
            error!(address = %self.handle(), error = %e, "Retained guard release failed");
        }
    }
}

impl<P: Payload> Registry<P> {
    /// Retain `handle` and wrap the new reference in a guard
    #[track_caller]
    pub fn retained(&self, handle: ObjectRef) -> RefResult<Retained<'_, P>> {
        let location = Location::caller();
        let envelope = self.acquire(handle, location)?;
        Ok(Retained {
            registry: self,
            envelope,
            location,
            active: true,
        })
    }

    /// Wrap a reference the caller already owns, such as the one `allocate` returns
    #[track_caller]
    pub fn adopt(&self, handle: ObjectRef) -> RefResult<Retained<'_, P>> {
        let location = Location::caller();
        let envelope = self
            .lookup(handle)
            .ok_or_else(|| self.invalid(handle, "adopt", location))?;
        Ok(Retained {
            registry: self,
            envelope,
            location,
            active: true,
        })
    }
}
