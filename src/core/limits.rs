/*!
 * Registry Limits and Constants
 *
 * Centralized location for registry-wide limits, thresholds, and magic numbers.
 * Organized by concern for maintainability and discoverability.
 *
 * - Performance-critical constants are marked with [PERF]
 * - Values carried over from the channel driver's on-disk defaults are marked with [COMPAT]
 */

// =============================================================================
// HASH TABLE
// =============================================================================

/// Default bucket count (prime)
/// [PERF] Prime so that stride-aligned addresses spread across every bucket
/// [COMPAT] Matches the driver's default hash size
pub const DEFAULT_BUCKET_COUNT: usize = 563;

/// Fill factor above which operators are told to grow the table
pub const FILL_FACTOR_WARN: f64 = 1.00;

// =============================================================================
// OBJECT HANDLES
// =============================================================================

/// First address handed out by a fresh registry
pub const HANDLE_BASE: u64 = 0x1000;

/// Distance between consecutive handle addresses
/// [PERF] Cache-line sized, mirrors 64-byte aligned payloads
pub const HANDLE_STRIDE: u64 = 64;

/// Sentinel stored in the alive marker while an object is usable
pub const LIVE_MARKER: u32 = 13;

/// Maximum identifier length in bytes (longer identifiers are truncated)
pub const IDENTIFIER_MAX: usize = 32;

// =============================================================================
// DIAGNOSTICS
// =============================================================================

/// Default location of the refcount trace file when tracing is enabled via env
/// [COMPAT]
pub const DEFAULT_TRACE_FILE: &str = "/tmp/sccp_refs";

/// Environment variable: bucket count override
pub const ENV_BUCKETS: &str = "REFCOUNT_BUCKETS";

/// Environment variable: maximum number of live objects
pub const ENV_MAX_OBJECTS: &str = "REFCOUNT_MAX_OBJECTS";

/// Environment variable: trace file path ("1" selects the default path)
pub const ENV_TRACE_FILE: &str = "REFCOUNT_TRACE_FILE";

/// Environment variable: comma separated debug categories
pub const ENV_DEBUG: &str = "REFCOUNT_DEBUG";
