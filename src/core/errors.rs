/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::Address;
use crate::core::data_structures::InlineString;
use crate::refcount::types::RunState;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::panic::Location;
use thiserror::Error;

/// Registry errors with serialization support
///
/// Every variant is reported through a failure return plus a log record;
/// nothing in the registry unwinds.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum RefError {
    #[error("Registry is not running (state: {state})")]
    #[diagnostic(
        code(refcount::not_running),
        help("Call init() before allocating. Allocation is rejected once destroy() has begun.")
    )]
    NotRunning { state: RunState },

    #[error("Out of memory: {reason}")]
    #[diagnostic(
        code(refcount::out_of_memory),
        help("The object was not created. Raise max_objects or release unused objects.")
    )]
    OutOfMemory { reason: InlineString },

    #[error("Invalid reference 0x{address:012x} used at {location}")]
    #[diagnostic(
        code(refcount::invalid_reference),
        help("Double release, use after the final release, or a handle never issued by this registry.")
    )]
    InvalidReference {
        address: Address,
        location: InlineString,
    },

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(refcount::configuration_error),
        help("Invalid configuration. Review configuration parameters.")
    )]
    Configuration(InlineString),
}

impl RefError {
    /// Build an `InvalidReference` for a call site
    pub fn invalid(address: Address, location: &Location<'_>) -> Self {
        RefError::InvalidReference {
            address,
            location: call_site(location),
        }
    }

    pub fn is_invalid_reference(&self) -> bool {
        matches!(self, RefError::InvalidReference { .. })
    }
}

/// Render a caller location as `file:line`
pub fn call_site(location: &Location<'_>) -> InlineString {
    format!("{}:{}", location.file(), location.line()).into()
}

/// Result type for registry operations
pub type RefResult<T> = std::result::Result<T, RefError>;
