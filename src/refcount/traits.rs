/*!
 * Refcount Traits
 * Abstractions implemented by registry payloads
 */

use crate::core::types::Size;

/// A value stored behind a registry handle
///
/// Payloads are shared by every thread holding a reference, so any mutable
/// state they carry must use interior mutability.
pub trait Payload: Send + Sync + 'static {
    /// Type-specific "in use" determination for diagnostics
    ///
    /// Advisory only; never consulted for lifetime decisions.
    fn in_use(&self) -> bool {
        false
    }

    /// Cleanup hook run exactly once when the object is destroyed
    ///
    /// Used when no destructor is bound for the object's kind. May retain or
    /// release other registry objects: it never runs under a bucket lock.
    fn destroy(&self) {}

    /// Payload size reported by diagnostics
    fn size(&self) -> Size {
        std::mem::size_of_val(self)
    }
}

/// Per-kind destructor bound in the type table
pub type Destructor<P> = fn(&P);
