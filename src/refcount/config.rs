/*!
 * Registry Configuration
 *
 * Runtime configuration for the object registry
 */

use super::types::DebugMask;
use crate::core::errors::{RefError, RefResult};
use crate::core::limits::{
    DEFAULT_BUCKET_COUNT, DEFAULT_TRACE_FILE, ENV_BUCKETS, ENV_DEBUG, ENV_MAX_OBJECTS,
    ENV_TRACE_FILE,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of hash buckets (must be prime)
    pub bucket_count: usize,
    /// Upper bound on simultaneously live objects
    pub max_objects: Option<usize>,
    /// CSV trace file opened by `init()`
    pub trace_file: Option<PathBuf>,
    /// Categories that get per-operation logging
    pub debug: DebugMask,
    /// Yield once after leaving the running state so in-flight operations can finish
    pub shutdown_yield: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            max_objects: None,
            trace_file: None,
            debug: DebugMask::NONE,
            shutdown_yield: true,
        }
    }
}

impl RegistryConfig {
    /// Defaults overridden by `REFCOUNT_*` environment variables
    pub fn from_env() -> RefResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, config file section, ...)
    pub fn from_lookup<F>(lookup: F) -> RefResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_BUCKETS) {
            config.bucket_count = parse_count(ENV_BUCKETS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_OBJECTS) {
            config.max_objects = Some(parse_count(ENV_MAX_OBJECTS, &value)?);
        }
        if let Some(value) = lookup(ENV_TRACE_FILE) {
            config.trace_file = match value.trim() {
                "" | "0" | "false" => None,
                "1" | "true" => Some(PathBuf::from(DEFAULT_TRACE_FILE)),
                path => Some(PathBuf::from(path)),
            };
        }
        if let Some(value) = lookup(ENV_DEBUG) {
            config.debug = value.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_bucket_count(mut self, bucket_count: usize) -> Self {
        self.bucket_count = bucket_count;
        self
    }

    pub fn with_max_objects(mut self, max_objects: usize) -> Self {
        self.max_objects = Some(max_objects);
        self
    }

    pub fn with_trace_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_file = Some(path.into());
        self
    }

    pub fn with_debug(mut self, debug: DebugMask) -> Self {
        self.debug = debug;
        self
    }

    pub fn validate(&self) -> RefResult<()> {
        if !is_prime(self.bucket_count) {
            return Err(RefError::Configuration(
                format!("bucket_count must be prime, got {}", self.bucket_count).into(),
            ));
        }
        if self.max_objects == Some(0) {
            return Err(RefError::Configuration(
                "max_objects must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_count(key: &str, value: &str) -> RefResult<usize> {
    value.trim().parse::<usize>().map_err(|e| {
        RefError::Configuration(format!("{}: invalid value '{}': {}", key, value, e).into())
    })
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}
