/*!
 * Concurrency Tests
 * Multi-threaded retain/release interleavings and count arithmetic
 */

use super::support::*;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use refcount_registry::{ObjectKind, ObjectRef, Released};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_paired_cycles_from_two_threads() {
    let registry = Arc::new(running());
    let destroyed_count = counter();
    let h = alloc_plain(&registry, ObjectKind::Line, "shared", &destroyed_count);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..10_000 {
                    registry.retain(h).unwrap();
                    assert!(matches!(
                        registry.try_release(h),
                        Ok(Released::Retained { .. })
                    ));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.refcount(h), Some(1));
    assert_eq!(destroyed(&destroyed_count), 0);
}

#[test]
fn test_random_stress_keeps_counts_balanced() {
    const THREADS: usize = 10;
    const LOOPS: usize = 5;
    const OBJECTS: usize = 500;

    let registry = Arc::new(running());
    let destroyed_count = counter();
    let objects: Arc<Vec<ObjectRef>> = Arc::new(
        (0..OBJECTS)
            .map(|i| alloc_plain(&registry, ObjectKind::Test, &format!("obj-{}", i), &destroyed_count))
            .collect(),
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = Arc::clone(&registry);
            let objects = Arc::clone(&objects);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t as u64);
                let mut order: Vec<usize> = (0..objects.len()).collect();
                for _ in 0..LOOPS {
                    order.shuffle(&mut rng);
                    for &i in &order {
                        let h = objects[i];
                        registry.retain(h).unwrap();
                        registry.retain(h).unwrap();
                        registry.try_release(h).unwrap();
                        registry.try_release(h).unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for h in objects.iter() {
        assert_eq!(registry.refcount(*h), Some(1));
    }
    assert_eq!(destroyed(&destroyed_count), 0);

    for h in objects.iter() {
        registry.release(*h);
    }
    assert_eq!(destroyed(&destroyed_count), OBJECTS);
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn test_retain_racing_final_release() {
    for round in 0..500 {
        let registry = Arc::new(running());
        let destroyed_count = counter();
        let h = alloc_plain(&registry, ObjectKind::Channel, "race", &destroyed_count);
        let barrier = Arc::new(Barrier::new(2));
        let retained = Arc::new(AtomicBool::new(false));

        let retainer = {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            let retained = Arc::clone(&retained);
            thread::spawn(move || {
                barrier.wait();
                if registry.retain(h).is_ok() {
                    retained.store(true, Ordering::SeqCst);
                    registry.release(h);
                }
            })
        };

        barrier.wait();
        registry.release(h);
        retainer.join().unwrap();

        assert_eq!(destroyed(&destroyed_count), 1, "round {}", round);
        assert!(!registry.contains(h));
        assert_eq!(registry.live_count(), 0);
    }
}

#[test]
fn test_concurrent_allocation_spreads_over_buckets() {
    let registry = Arc::new(running());
    let destroyed_count = counter();
    let allocated = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let registry = Arc::clone(&registry);
            let destroyed_count = Arc::clone(&destroyed_count);
            let allocated = Arc::clone(&allocated);
            thread::spawn(move || {
                let mine: Vec<ObjectRef> = (0..250)
                    .map(|i| alloc_plain(&registry, ObjectKind::Event, &format!("{}-{}", t, i), &destroyed_count))
                    .collect();
                allocated.fetch_add(mine.len(), Ordering::SeqCst);
                mine
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }

    all.sort();
    all.dedup();
    assert_eq!(all.len(), 2000);
    assert_eq!(allocated.load(Ordering::SeqCst), 2000);
    assert_eq!(registry.fill_factor().entries, 2000);
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Retain,
    Release,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Retain), Just(Op::Release)]
}

proptest! {
    #[test]
    fn prop_count_matches_model(ops in prop::collection::vec(op(), 0..64)) {
        let registry = running();
        let destroyed_count = counter();
        let h = alloc_plain(&registry, ObjectKind::Test, "model", &destroyed_count);
        let mut model: u32 = 1;

        for op in ops {
            match op {
                Op::Retain => {
                    let result = registry.retain(h);
                    if model == 0 {
                        prop_assert!(result.is_err());
                    } else {
                        prop_assert!(result.is_ok());
                        model += 1;
                    }
                }
                Op::Release => {
                    let result = registry.try_release(h);
                    if model == 0 {
                        prop_assert!(result.is_err());
                    } else {
                        model -= 1;
                        let expected = if model == 0 {
                            Released::Destroyed
                        } else {
                            Released::Retained { remaining: model }
                        };
                        prop_assert_eq!(result.unwrap(), expected);
                    }
                }
            }

            let expected_count = if model == 0 { None } else { Some(model) };
            prop_assert_eq!(registry.refcount(h), expected_count);
        }

        let expected_destroyed = if model == 0 { 1 } else { 0 };
        prop_assert_eq!(destroyed(&destroyed_count), expected_destroyed);
    }
}
