/*!
 * Trace Tests
 * Trace sinks, the CSV trace file and environment configuration
 */

use super::support::*;
use pretty_assertions::assert_eq;
use refcount_registry::limits::{ENV_BUCKETS, ENV_DEBUG, ENV_MAX_OBJECTS, ENV_TRACE_FILE};
use refcount_registry::{
    DebugCategory, MemorySink, ObjectKind, RefError, Registry, RegistryConfig, RunState,
    TraceEvent,
};
use serial_test::serial;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_memory_sink_records_lifecycle() {
    let sink = Arc::new(MemorySink::new());
    let registry = Registry::new(RegistryConfig::default())
        .unwrap()
        .with_sink(Arc::clone(&sink));
    registry.init().unwrap();

    let destroyed_count = counter();
    let h = alloc_plain(&registry, ObjectKind::Line, "100", &destroyed_count);
    registry.retain(h).unwrap();
    registry.release(h);
    registry.release(h);
    registry.release(h);

    assert_eq!(
        sink.events_for(h.address()),
        vec![
            TraceEvent::Allocate,
            TraceEvent::Retain,
            TraceEvent::Release,
            TraceEvent::Destroy,
            TraceEvent::Invalid,
        ]
    );

    let records = sink.records();
    assert_eq!(records[1].refcount, 2);
    assert_eq!(records[2].refcount, 1);
    assert_eq!(records[3].refcount, 0);
    assert_eq!(records[0].kind, Some(ObjectKind::Line));
    assert!(records[4].kind.is_none());
    // The allocation happened inside the fixture helper
    assert!(records[0].location.as_str().contains("support.rs"));
    assert!(records[1..]
        .iter()
        .all(|r| r.location.as_str().contains("trace_test.rs")));
}

#[test]
fn test_trace_file_written_as_csv() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("refs.csv");
    let registry = running_with(RegistryConfig::default().with_trace_file(&path));

    let destroyed_count = counter();
    let h = alloc_plain(&registry, ObjectKind::Device, "SEP0001", &destroyed_count);
    registry.retain(h).unwrap();
    registry.release(h);
    let leaked = alloc_plain(&registry, ObjectKind::Line, "leaky", &destroyed_count);
    registry.release(h);
    registry.destroy();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 6);

    let first: Vec<&str> = lines[0].split(',').collect();
    assert_eq!(first[0], format!("0x{:012x}", h.address()));
    assert_eq!(first[1], "allocate");
    assert_eq!(first[2], "+1");
    assert_eq!(first[3], "1");
    assert!(first[5].contains("support.rs:"));
    assert_eq!(first[6], "device:SEP0001");

    assert!(lines[1].contains(",retain,+1,2,"));
    assert!(lines[2].contains(",release,-1,1,"));
    assert!(lines[3].starts_with(&format!("0x{:012x},allocate", leaked.address())));
    assert!(lines[4].contains(",destroy,-1,0,"));
    assert!(lines[5].contains(",leak,+0,1,"));
    assert!(lines[5].contains("trace_test.rs:"));
    assert!(lines[5].ends_with("line:leaky"));
}

#[test]
fn test_unwritable_trace_file_keeps_running() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("refs.csv");
    let registry = running_with(RegistryConfig::default().with_trace_file(&path));

    assert_eq!(registry.state(), RunState::Running);
    let destroyed_count = counter();
    let h = alloc_plain(&registry, ObjectKind::Test, "t", &destroyed_count);
    registry.release(h);
    assert!(!path.exists());
}

fn clear_env() {
    for key in [ENV_BUCKETS, ENV_MAX_OBJECTS, ENV_TRACE_FILE, ENV_DEBUG] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_registry_from_env() {
    clear_env();
    std::env::set_var(ENV_BUCKETS, "101");
    std::env::set_var(ENV_MAX_OBJECTS, "2");
    std::env::set_var(ENV_DEBUG, "refcount,line");

    let registry: Registry<Object> = Registry::from_env().unwrap();
    clear_env();

    assert_eq!(registry.bucket_count(), 101);
    assert!(registry.config().debug.contains(DebugCategory::Line));
    registry.init().unwrap();

    let destroyed_count = counter();
    alloc_plain(&registry, ObjectKind::Line, "a", &destroyed_count);
    alloc_plain(&registry, ObjectKind::Line, "b", &destroyed_count);
    let err = registry
        .alloc(ObjectKind::Line, "c", Object::plain(&destroyed_count))
        .unwrap_err();
    assert!(matches!(err, RefError::OutOfMemory { .. }));
}

#[test]
#[serial]
fn test_registry_from_env_rejects_bad_buckets() {
    clear_env();
    std::env::set_var(ENV_BUCKETS, "100");
    let result: Result<Registry<Object>, _> = Registry::from_env();
    clear_env();
    assert!(matches!(result, Err(RefError::Configuration(_))));
}

#[test]
#[serial]
fn test_tracing_subscriber_initializes() {
    std::env::set_var(refcount_registry::monitoring::TRACE_JSON_ENV, "1");
    let _ = refcount_registry::init_tracing();
    std::env::remove_var(refcount_registry::monitoring::TRACE_JSON_ENV);

    // A second install is refused
    assert!(!refcount_registry::init_tracing());

    let registry = running();
    let destroyed_count = counter();
    let h = alloc_plain(&registry, ObjectKind::Device, "logged", &destroyed_count);
    registry.release(h);
}
