/*!
 * Type Table
 * Per-kind destructor bindings shared by every object of that kind
 */

use super::traits::{Destructor, Payload};
use super::types::{DebugCategory, ObjectKind};
use std::sync::OnceLock;

/// Kind-indexed destructor table
///
/// A destructor is bound at most once per kind; the first binder wins and
/// later bindings are ignored.
pub struct TypeTable<P: Payload> {
    destructors: [OnceLock<Destructor<P>>; ObjectKind::COUNT],
}

impl<P: Payload> TypeTable<P> {
    pub fn new() -> Self {
        Self {
            destructors: std::array::from_fn(|_| OnceLock::new()),
        }
    }

    /// Bind a destructor for `kind`; returns `false` if one was already bound
    pub fn bind(&self, kind: ObjectKind, destructor: Destructor<P>) -> bool {
        self.destructors[kind.index()].set(destructor).is_ok()
    }

    #[inline]
    pub fn destructor(&self, kind: ObjectKind) -> Option<Destructor<P>> {
        self.destructors[kind.index()].get().copied()
    }

    #[inline]
    pub fn is_bound(&self, kind: ObjectKind) -> bool {
        self.destructors[kind.index()].get().is_some()
    }

    /// Run the bound destructor, or the payload's own hook when none is bound
    pub fn destroy(&self, kind: ObjectKind, payload: &P) {
        match self.destructor(kind) {
            Some(destructor) => destructor(payload),
            None => payload.destroy(),
        }
    }

    #[inline]
    pub fn name(&self, kind: ObjectKind) -> &'static str {
        kind.name()
    }

    #[inline]
    pub fn category(&self, kind: ObjectKind) -> DebugCategory {
        kind.category()
    }
}

impl<P: Payload> Default for TypeTable<P> {
    fn default() -> Self {
        Self::new()
    }
}
