/*!
 * Shutdown Tests
 * Forced teardown, leak reporting and allocation during teardown
 */

use super::support::*;
use pretty_assertions::assert_eq;
use refcount_registry::{InUseMode, ObjectKind, RunState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_leaked_line_is_reported_and_destroyed() {
    let registry = running();
    let destroyed_count = counter();
    let h = registry
        .alloc(ObjectKind::Line, "line-100", Object::line(0, &destroyed_count))
        .unwrap();
    registry.retain(h).unwrap();

    let summary = registry.destroy();

    assert_eq!(summary.leak_count(), 1);
    let leak = &summary.leaked[0];
    assert_eq!(leak.kind, ObjectKind::Line);
    assert_eq!(leak.identifier.as_str(), "line-100");
    assert_eq!(leak.refcount, 2);
    assert_eq!(leak.address, h.address());

    assert_eq!(destroyed(&destroyed_count), 1);
    assert_eq!(registry.live_count(), 0);
    assert_eq!(registry.state(), RunState::Destroyed);
    assert!(registry.report(InUseMode::Off).rows.is_empty());
}

#[test]
fn test_each_leak_reported_once() {
    let registry = running();
    let destroyed_count = counter();
    let names = ["SEP1", "SEP2", "SEP3", "SEP4"];
    for name in names {
        let h = alloc_plain(&registry, ObjectKind::Device, name, &destroyed_count);
        registry.retain(h).unwrap();
    }
    let released = alloc_plain(&registry, ObjectKind::Device, "gone", &destroyed_count);
    registry.release(released);

    let summary = registry.destroy();

    assert_eq!(summary.leak_count(), names.len());
    for name in names {
        assert_eq!(summary.leaks_of(name).count(), 1, "{}", name);
    }
    assert_eq!(summary.leaks_of("gone").count(), 0);
    assert_eq!(destroyed(&destroyed_count), names.len() + 1);
}

#[test]
fn test_handles_invalid_after_destroy() {
    let registry = running();
    let destroyed_count = counter();
    let h = alloc_plain(&registry, ObjectKind::Event, "ev", &destroyed_count);
    registry.destroy();

    assert!(registry.retain(h).unwrap_err().is_invalid_reference());
    assert!(registry.try_release(h).unwrap_err().is_invalid_reference());
}

#[test]
fn test_drop_tears_down_running_registry() {
    let destroyed_count = counter();
    {
        let registry = running();
        alloc_plain(&registry, ObjectKind::Conference, "conf", &destroyed_count);
        alloc_plain(&registry, ObjectKind::Participant, "p1", &destroyed_count);
    }
    assert_eq!(destroyed(&destroyed_count), 2);
}

#[test]
fn test_allocation_racing_destroy() {
    let registry = Arc::new(running());
    let destroyed_count = counter();
    let successes = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(5));

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let registry = Arc::clone(&registry);
            let destroyed_count = Arc::clone(&destroyed_count);
            let successes = Arc::clone(&successes);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut i = 0;
                while registry
                    .alloc(ObjectKind::Test, &format!("{}-{}", t, i), Object::plain(&destroyed_count))
                    .is_ok()
                {
                    successes.fetch_add(1, Ordering::SeqCst);
                    i += 1;
                }
            })
        })
        .collect();

    barrier.wait();
    thread::sleep(std::time::Duration::from_millis(5));
    let summary = registry.destroy();

    for worker in workers {
        worker.join().unwrap();
    }

    // Every successful allocation was still linked when teardown ran
    assert!(summary.leak_count() >= successes.load(Ordering::SeqCst));
    assert!(destroyed(&destroyed_count) >= summary.leak_count());
    assert_eq!(registry.live_count(), 0);
    assert_eq!(registry.fill_factor().entries, 0);
}
