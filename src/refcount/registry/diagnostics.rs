/*!
 * Registry Diagnostics
 *
 * Operator view of the hash table: one row per linked object plus a fill
 * factor summary. The report serializes to JSON for management interfaces
 * and renders as a fixed-width table for a console.
 */

use super::Registry;
use crate::core::data_structures::InlineString;
use crate::core::limits::FILL_FACTOR_WARN;
use crate::core::types::{Address, BucketIndex, RefCount, Size};
use crate::monitoring::span_operation;
use crate::refcount::traits::Payload;
use crate::refcount::types::{InUseMode, ObjectKind, ObjectRef};
use serde::Serialize;
use std::fmt;
use std::panic::Location;
use tracing::{info, warn};

/// Warning attached to a report whose fill factor is too high
pub const FILL_FACTOR_WARNING: &str = "Please keep fillfactor below 1.00. Increase bucket_count.";

/// One object as seen by the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub bucket: BucketIndex,
    pub kind: ObjectKind,
    pub identifier: InlineString,
    pub address: Address,
    pub refcount: RefCount,
    pub alive: bool,
    /// `None` when in-use evaluation is off
    pub in_use: Option<bool>,
    pub size: Size,
}

/// Hash table health
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FillFactor {
    pub entries: usize,
    pub buckets: usize,
    pub factor: f64,
    pub max_depth: usize,
}

impl FillFactor {
    fn new(entries: usize, buckets: usize, max_depth: usize) -> Self {
        Self {
            entries,
            buckets,
            factor: entries as f64 / buckets as f64,
            max_depth,
        }
    }

    /// More entries than buckets; the bucket count should grow
    #[inline]
    pub fn is_overloaded(&self) -> bool {
        self.factor > FILL_FACTOR_WARN
    }
}

/// Snapshot of every linked object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefcountReport {
    pub mode: InUseMode,
    pub rows: Vec<ReportRow>,
    pub fill: FillFactor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
}

impl RefcountReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Rows for one kind, in table order
    pub fn rows_of(&self, kind: ObjectKind) -> impl Iterator<Item = &ReportRow> + '_ {
        self.rows.iter().filter(move |row| row.kind == kind)
    }
}

impl fmt::Display for RefcountReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<5} {:<17} {:<25} {:<15} {:<4} {:<5} {:<5} {:<4}",
            "Hash", "Type", "Id", "Ptr", "Refc", "Alive", "InUse", "Size"
        )?;

        let mut previous = None;
        for row in &self.rows {
            let hash = if previous == Some(row.bucket) {
                " +-> ".to_string()
            } else {
                format!("[{:3}]", row.bucket)
            };
            previous = Some(row.bucket);

            let in_use = match row.in_use {
                None => "off",
                Some(true) => "yes",
                Some(false) => "no",
            };
            writeln!(
                f,
                "{:<5.5} {:<17.17} {:<25.25} 0x{:<13x} {:<4} {:<5} {:<5} {:<4}",
                hash,
                row.kind,
                row.identifier,
                row.address,
                row.refcount,
                if row.alive { "yes" } else { "no" },
                in_use,
                row.size,
            )?;
        }

        writeln!(f)?;
        writeln!(f, "{:<8} {:<8} {:<8} {:<8}", "Entries", "Buckets", "Factor", "MaxDepth")?;
        writeln!(
            f,
            "{:<8} {:<8} {:08.2} {:<8}",
            self.fill.entries, self.fill.buckets, self.fill.factor, self.fill.max_depth
        )?;
        if let Some(warning) = self.warning {
            writeln!(f, "{}", warning)?;
        }
        Ok(())
    }
}

impl<P: Payload> Registry<P> {
    /// Walk the table and describe every linked object
    ///
    /// `Payload::in_use` is evaluated under the bucket's read lock, and only
    /// for alive objects.
    pub fn report(&self, mode: InUseMode) -> RefcountReport {
        let span = span_operation("refcount_report");
        let mut rows = Vec::new();
        let mut entries = 0;
        let mut max_depth = 0;

        {
            let _objects = self.objects_lock.read();
            for (index, head) in self.buckets.iter().enumerate() {
                let head = head.load();
                let bucket = match &*head {
                    Some(bucket) => bucket,
                    None => continue,
                };

                let mut depth = 0;
                bucket.for_each(|env| {
                    depth += 1;
                    let alive = env.is_alive();
                    let in_use = match mode {
                        InUseMode::Off => None,
                        InUseMode::Show | InUseMode::Suppress => {
                            Some(alive && env.payload().in_use())
                        }
                    };
                    if mode == InUseMode::Suppress && in_use == Some(true) {
                        return;
                    }
                    rows.push(ReportRow {
                        bucket: index,
                        kind: env.kind(),
                        identifier: env.identifier(),
                        address: env.handle().address(),
                        refcount: env.refcount(),
                        alive,
                        in_use,
                        size: env.size(),
                    });
                });
                entries += depth;
                max_depth = max_depth.max(depth);
            }
        }

        let fill = FillFactor::new(entries, self.buckets.len(), max_depth);
        span.record_items_processed(rows.len());
        let warning = if fill.is_overloaded() {
            warn!(factor = fill.factor, buckets = fill.buckets, "{}", FILL_FACTOR_WARNING);
            Some(FILL_FACTOR_WARNING)
        } else {
            None
        };

        RefcountReport {
            mode,
            rows,
            fill,
            warning,
        }
    }

    /// Entries per bucket and the deepest bucket
    pub fn fill_factor(&self) -> FillFactor {
        let _objects = self.objects_lock.read();
        let mut entries = 0;
        let mut max_depth = 0;
        for head in self.buckets.iter() {
            if let Some(bucket) = &*head.load() {
                let depth = bucket.len();
                entries += depth;
                max_depth = max_depth.max(depth);
            }
        }
        FillFactor::new(entries, self.buckets.len(), max_depth)
    }

    /// Operator escape hatch: drop one reference from a leaked object
    ///
    /// Both `address` and `identifier` must match a live object. Returns
    /// whether a release was performed.
    #[track_caller]
    pub fn force_release(&self, address: Address, identifier: &str) -> bool {
        let location = Location::caller();
        let handle = match ObjectRef::from_address(address) {
            Some(handle) => handle,
            None => return false,
        };
        let envelope = match self.lookup(handle) {
            Some(envelope) => envelope,
            None => return false,
        };
        if envelope.identifier() != identifier {
            return false;
        }

        info!(
            kind = %envelope.kind(),
            identifier,
            address = %handle,
            refcount = envelope.refcount(),
            "Forcing release of object"
        );
        self.release_at(handle, location).is_ok()
    }
}
