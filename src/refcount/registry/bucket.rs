/*!
 * Hash Bucket
 * One lockable slot of the registry's hash table
 */

use super::envelope::Envelope;
use crate::core::errors::{RefError, RefResult};
use crate::refcount::types::{ObjectKind, ObjectRef};
use parking_lot::RwLock;
use std::sync::Arc;

/// Envelopes whose handles hash to the same slot
///
/// Lookups and traversals take the read lock; insert and remove take the
/// write lock. No caller ever holds two bucket locks at once.
pub(crate) struct Bucket<P> {
    entries: RwLock<Vec<Arc<Envelope<P>>>>,
}

impl<P> Bucket<P> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Find an alive envelope for `handle`
    pub fn find(&self, handle: ObjectRef) -> Option<Arc<Envelope<P>>> {
        let entries = self.entries.read();
        entries
            .iter()
            .find(|env| env.handle() == handle)
            .filter(|env| env.is_alive())
            .cloned()
    }

    /// Append an envelope, surfacing storage exhaustion as an error
    pub fn insert(&self, envelope: Arc<Envelope<P>>) -> RefResult<()> {
        let mut entries = self.entries.write();
        entries.try_reserve(1).map_err(|e| RefError::OutOfMemory {
            reason: format!("bucket storage: {}", e).into(),
        })?;
        entries.push(envelope);
        Ok(())
    }

    /// Unlink the envelope for `handle`, alive or not
    pub fn remove(&self, handle: ObjectRef) -> Option<Arc<Envelope<P>>> {
        let mut entries = self.entries.write();
        let position = entries.iter().position(|env| env.handle() == handle)?;
        Some(entries.swap_remove(position))
    }

    /// Unlink every envelope of `kind`
    pub fn drain_kind(&self, kind: ObjectKind) -> Vec<Arc<Envelope<P>>> {
        let mut entries = self.entries.write();
        let (drained, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *entries)
            .into_iter()
            .partition(|env| env.kind() == kind);
        *entries = kept;
        drained
    }

    /// Visit every envelope under the read lock
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Envelope<P>),
    {
        let entries = self.entries.read();
        for env in entries.iter() {
            f(env);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
