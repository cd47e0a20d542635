/*!
 * Registry Lifecycle
 *
 * `init` opens the trace sink and starts accepting allocations.
 * `destroy` stops allocation, then forcibly tears down whatever is still
 * linked, kind by kind in teardown order, reporting each survivor as a leak.
 */

use super::Registry;
use crate::core::errors::{RefError, RefResult};
use crate::monitoring::span_operation;
use crate::refcount::trace::{FileSink, TraceEvent, TraceRecord, TraceSink};
use crate::refcount::traits::Payload;
use crate::refcount::types::{LeakRecord, ObjectKind, RunState, ShutdownSummary};
use std::panic::Location;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

impl<P: Payload> Registry<P> {
    /// Start accepting allocations
    ///
    /// Opens the configured trace file unless a sink was injected. A trace
    /// file that cannot be opened is logged and tracing stays off. Calling
    /// `init` again after `destroy` restarts the registry.
    pub fn init(&self) -> RefResult<()> {
        let current = self.state();
        match current {
            RunState::Running => {
                warn!("Refcount registry already running, init ignored");
                return Ok(());
            }
            RunState::Stopping => {
                return Err(RefError::NotRunning { state: current });
            }
            RunState::Stopped | RunState::Destroyed => {}
        }

        if !self.sink_injected {
            if let Some(path) = &self.config.trace_file {
                match FileSink::create(path) {
                    Ok(sink) => {
                        info!(path = %path.display(), "Refcount trace file opened");
                        self.sink.store(Arc::new(Box::new(sink) as Box<dyn TraceSink>));
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "Cannot open refcount trace file, tracing disabled");
                    }
                }
            }
        }

        if self
            .state
            .compare_exchange(
                current as u8,
                RunState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            warn!("Refcount registry state changed during init, init ignored");
            return Ok(());
        }

        info!(buckets = self.buckets.len(), "Refcount registry running");
        Ok(())
    }

    /// Tear down every remaining object and stop the registry
    ///
    /// Survivors are destroyed regardless of their count. Safe to call more
    /// than once; later calls find nothing to do.
    #[track_caller]
    pub fn destroy(&self) -> ShutdownSummary {
        let location = Location::caller();
        let previous = RunState::from_u8(self.state.swap(RunState::Stopping as u8, Ordering::AcqRel));
        if previous == RunState::Stopping {
            // Another thread is already tearing down
            return ShutdownSummary::default();
        }

        let span = span_operation("refcount_shutdown");
        info!(state = %previous, "Refcount registry shutting down, checking for clean shutdown");
        if self.config.shutdown_yield {
            // Let operations that passed the state check finish
            std::thread::yield_now();
        }

        let mut summary = ShutdownSummary::default();
        {
            let _objects = self.objects_lock.write();
            for kind in ObjectKind::ALL {
                for (index, head) in self.buckets.iter().enumerate() {
                    let bucket = match head.load_full() {
                        Some(bucket) => bucket,
                        None => continue,
                    };

                    // Destructors run after the bucket lock is released
                    for env in bucket.drain_kind(kind) {
                        if !env.mark_dead() {
                            continue;
                        }
                        let refcount = env.zero();
                        let leak = LeakRecord {
                            bucket: index,
                            kind,
                            identifier: env.identifier(),
                            address: env.handle().address(),
                            refcount,
                            size: env.size(),
                        };
                        warn!(
                            bucket = index,
                            %kind,
                            identifier = %leak.identifier,
                            address = %env.handle(),
                            refcount,
                            alive = true,
                            size = leak.size,
                            "Cleaning up leaked object"
                        );
                        self.trace(|| {
                            TraceRecord::for_object(
                                TraceEvent::Leak,
                                env.handle(),
                                kind,
                                leak.identifier.clone(),
                                refcount,
                                location,
                            )
                        });

                        self.types.destroy(kind, env.payload());
                        self.live.fetch_sub(1, Ordering::AcqRel);
                        summary.leaked.push(leak);
                    }
                }
            }

            for head in self.buckets.iter() {
                head.store(None);
            }
        }

        span.record_items_processed(summary.leak_count());
        if summary.is_clean() {
            info!("Refcount registry shut down cleanly");
        } else {
            warn!(
                count = summary.leak_count(),
                "Found objects which had to be forcefully removed during refcount shutdown, see above"
            );
        }

        self.sink.load().close();
        self.state.store(RunState::Destroyed as u8, Ordering::Release);
        summary
    }
}
