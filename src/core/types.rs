/*!
 * Core Types
 * Common types used across the registry
 */

/// Opaque object address (the numeric value behind an `ObjectRef`)
pub type Address = u64;

/// Size type for payload accounting
pub type Size = usize;

/// Reference count value
pub type RefCount = u32;

/// Index of a hash bucket
pub type BucketIndex = usize;
