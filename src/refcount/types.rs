/*!
 * Refcount Types
 * Object kinds, handles, lifecycle states and shutdown records
 */

use crate::core::data_structures::InlineString;
use crate::core::errors::{RefError, RefResult};
use crate::core::types::{Address, RefCount, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

/// Domain object kinds tracked by the registry
///
/// Declaration order is the teardown priority used by `destroy()`: objects
/// that may still reference other kinds from their destructor go first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Participant,
    Conference,
    Event,
    Channel,
    LineDevice,
    Line,
    Device,
    Test,
}

impl ObjectKind {
    /// Number of kinds
    pub const COUNT: usize = 8;

    /// All kinds in teardown order
    pub const ALL: [ObjectKind; Self::COUNT] = [
        ObjectKind::Participant,
        ObjectKind::Conference,
        ObjectKind::Event,
        ObjectKind::Channel,
        ObjectKind::LineDevice,
        ObjectKind::Line,
        ObjectKind::Device,
        ObjectKind::Test,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Display name used in reports and logs
    pub const fn name(self) -> &'static str {
        match self {
            ObjectKind::Participant => "participant",
            ObjectKind::Conference => "conference",
            ObjectKind::Event => "event",
            ObjectKind::Channel => "channel",
            ObjectKind::LineDevice => "linedevice",
            ObjectKind::Line => "line",
            ObjectKind::Device => "device",
            ObjectKind::Test => "test",
        }
    }

    /// Debug category that gates verbose logging for this kind
    pub const fn category(self) -> DebugCategory {
        match self {
            ObjectKind::Participant | ObjectKind::Conference => DebugCategory::Conference,
            ObjectKind::Event => DebugCategory::Event,
            ObjectKind::Channel => DebugCategory::Channel,
            ObjectKind::LineDevice | ObjectKind::Line => DebugCategory::Line,
            ObjectKind::Device => DebugCategory::Device,
            ObjectKind::Test => DebugCategory::High,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Debug categories for verbose logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugCategory {
    Refcount,
    Conference,
    Event,
    Channel,
    Line,
    Device,
    High,
}

impl DebugCategory {
    pub const ALL: [DebugCategory; 7] = [
        DebugCategory::Refcount,
        DebugCategory::Conference,
        DebugCategory::Event,
        DebugCategory::Channel,
        DebugCategory::Line,
        DebugCategory::Device,
        DebugCategory::High,
    ];

    #[inline]
    const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub const fn name(self) -> &'static str {
        match self {
            DebugCategory::Refcount => "refcount",
            DebugCategory::Conference => "conference",
            DebugCategory::Event => "event",
            DebugCategory::Channel => "channel",
            DebugCategory::Line => "line",
            DebugCategory::Device => "device",
            DebugCategory::High => "high",
        }
    }
}

impl FromStr for DebugCategory {
    type Err = RefError;

    fn from_str(s: &str) -> RefResult<Self> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| RefError::Configuration(format!("unknown debug category '{}'", s).into()))
    }
}

/// Set of enabled debug categories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugMask(u32);

impl DebugMask {
    pub const NONE: DebugMask = DebugMask(0);

    #[inline]
    pub const fn with(self, category: DebugCategory) -> Self {
        DebugMask(self.0 | category.bit())
    }

    #[inline]
    pub const fn contains(self, category: DebugCategory) -> bool {
        self.0 & category.bit() != 0
    }

    /// Every category enabled
    pub fn all() -> Self {
        DebugCategory::ALL
            .iter()
            .fold(Self::NONE, |mask, c| mask.with(*c))
    }

    /// Per-operation logging for `kind` needs both the refcount category and the kind's own
    #[inline]
    pub const fn verbose(self, kind: ObjectKind) -> bool {
        self.contains(DebugCategory::Refcount) && self.contains(kind.category())
    }
}

impl FromStr for DebugMask {
    type Err = RefError;

    /// Parse a comma separated list such as `"refcount,line"`; `"all"` enables everything
    fn from_str(s: &str) -> RefResult<Self> {
        let mut mask = Self::NONE;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("all") {
                return Ok(Self::all());
            }
            mask = mask.with(part.parse()?);
        }
        Ok(mask)
    }
}

/// Opaque handle to a registry object
///
/// The address is minted by the registry, is never zero and is never reused
/// for another object, so a stale handle can only ever fail lookup.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(NonZeroU64);

impl ObjectRef {
    /// Rebuild a handle from a raw address (e.g. one typed by an operator)
    #[inline]
    pub fn from_address(address: Address) -> Option<Self> {
        NonZeroU64::new(address).map(ObjectRef)
    }

    #[inline]
    pub fn address(self) -> Address {
        self.0.get()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("0x{:012x}", self.address()))
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef(0x{:012x})", self.address())
    }
}

/// Registry lifecycle state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not yet initialized
    Stopped = 0,
    /// Accepting allocations
    Running = 1,
    /// Teardown in progress; allocation rejected
    Stopping = 2,
    /// Teardown complete
    Destroyed = 3,
}

impl RunState {
    #[inline]
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Running,
            2 => RunState::Stopping,
            3 => RunState::Destroyed,
            _ => RunState::Stopped,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Stopped => write!(f, "stopped"),
            RunState::Running => write!(f, "running"),
            RunState::Stopping => write!(f, "stopping"),
            RunState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// In-use column handling for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InUseMode {
    /// Column reported as "off"
    #[default]
    Off,
    /// Evaluate and show
    Show,
    /// Evaluate and hide rows that are in use
    Suppress,
}

impl FromStr for InUseMode {
    type Err = RefError;

    fn from_str(s: &str) -> RefResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "off" => Ok(InUseMode::Off),
            "show" => Ok(InUseMode::Show),
            "suppress" => Ok(InUseMode::Suppress),
            other => Err(RefError::Configuration(
                format!("unknown in-use mode '{}'", other).into(),
            )),
        }
    }
}

/// Outcome of a successful release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// Other references remain
    Retained { remaining: RefCount },
    /// That was the final reference; the object has been destroyed
    Destroyed,
}

/// An object found alive at teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakRecord {
    pub bucket: usize,
    pub kind: ObjectKind,
    pub identifier: InlineString,
    pub address: Address,
    pub refcount: RefCount,
    pub size: Size,
}

/// Result of `destroy()`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownSummary {
    pub leaked: Vec<LeakRecord>,
}

impl ShutdownSummary {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty()
    }

    #[inline]
    pub fn leak_count(&self) -> usize {
        self.leaked.len()
    }

    /// Leaks reported for an identifier
    pub fn leaks_of<'a>(&'a self, identifier: &'a str) -> impl Iterator<Item = &'a LeakRecord> + 'a {
        self.leaked
            .iter()
            .filter(move |leak| leak.identifier.as_str() == identifier)
    }
}
