/*!
 * Diagnostics Tests
 * Operator report, in-use modes, fill factor and admin operations
 */

use super::support::*;
use pretty_assertions::assert_eq;
use refcount_registry::{InUseMode, ObjectKind, RegistryConfig};

fn populated() -> (refcount_registry::Registry<Object>, [refcount_registry::ObjectRef; 4]) {
    let registry = running();
    let destroyed_count = counter();
    let busy_device = registry
        .alloc(ObjectKind::Device, "SEP-BUSY", Object::device(true, &destroyed_count))
        .unwrap();
    let idle_device = registry
        .alloc(ObjectKind::Device, "SEP-IDLE", Object::device(false, &destroyed_count))
        .unwrap();
    let busy_line = registry
        .alloc(ObjectKind::Line, "200", Object::line(1, &destroyed_count))
        .unwrap();
    let orphan_channel = registry
        .alloc(ObjectKind::Channel, "200-1", Object::channel(false, &destroyed_count))
        .unwrap();
    (registry, [busy_device, idle_device, busy_line, orphan_channel])
}

#[test]
fn test_report_without_in_use() {
    let (registry, handles) = populated();
    let report = registry.report(InUseMode::Off);

    assert_eq!(report.rows.len(), handles.len());
    assert!(report.rows.iter().all(|row| row.in_use.is_none()));
    assert!(report.rows.iter().all(|row| row.alive && row.refcount == 1));
    assert_eq!(report.fill.entries, 4);
    assert_eq!(report.fill.buckets, 563);
    assert!(report.warning.is_none());
}

#[test]
fn test_report_shows_in_use() {
    let (registry, [busy_device, idle_device, busy_line, orphan_channel]) = populated();
    let report = registry.report(InUseMode::Show);

    let in_use = |address: u64| {
        report
            .rows
            .iter()
            .find(|row| row.address == address)
            .and_then(|row| row.in_use)
    };
    assert_eq!(in_use(busy_device.address()), Some(true));
    assert_eq!(in_use(idle_device.address()), Some(false));
    assert_eq!(in_use(busy_line.address()), Some(true));
    assert_eq!(in_use(orphan_channel.address()), Some(false));
}

#[test]
fn test_report_suppresses_in_use_rows() {
    let (registry, [_, idle_device, _, orphan_channel]) = populated();
    let report = registry.report(InUseMode::Suppress);

    let mut shown: Vec<u64> = report.rows.iter().map(|row| row.address).collect();
    shown.sort();
    assert_eq!(shown, vec![idle_device.address(), orphan_channel.address()]);
    // Suppressed rows still count towards the fill factor
    assert_eq!(report.fill.entries, 4);
}

#[test]
fn test_report_table_layout() {
    let (registry, _) = populated();
    let text = registry.report(InUseMode::Show).to_string();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(
        lines[0],
        "Hash  Type              Id                        Ptr             Refc Alive InUse Size"
    );
    assert!(lines[1].starts_with('['));
    assert!(text.contains("SEP-BUSY"));
    assert!(text.contains("Entries  Buckets  Factor   MaxDepth"));
    assert!(text.contains("00000.01"));
    assert!(!text.contains("Please keep fillfactor"));
}

#[test]
fn test_report_json() {
    let (registry, _) = populated();
    let json = registry.report(InUseMode::Show).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["mode"], "show");
    assert_eq!(value["rows"].as_array().unwrap().len(), 4);
    assert_eq!(value["fill"]["entries"], 4);
    assert!(value.get("warning").is_none());
}

#[test]
fn test_overloaded_table_warns() {
    let registry = running_with(RegistryConfig::default().with_bucket_count(3));
    let destroyed_count = counter();
    for i in 0..7 {
        alloc_plain(&registry, ObjectKind::Test, &format!("t{}", i), &destroyed_count);
    }

    let fill = registry.fill_factor();
    assert_eq!(fill.entries, 7);
    assert_eq!(fill.max_depth, 3);
    assert!(fill.is_overloaded());

    let report = registry.report(InUseMode::Off);
    assert!(report.warning.is_some());
    assert!(report
        .to_string()
        .contains(refcount_registry::FILL_FACTOR_WARNING));
}

#[test]
fn test_force_release_clears_leak() {
    let registry = running();
    let destroyed_count = counter();
    let h = alloc_plain(&registry, ObjectKind::LineDevice, "100@SEP1", &destroyed_count);

    assert!(!registry.force_release(h.address(), "100@SEP2"));
    assert!(registry.force_release(h.address(), "100@SEP1"));
    assert!(!registry.contains(h));
    assert_eq!(destroyed(&destroyed_count), 1);

    // Nothing left to find
    assert!(!registry.force_release(h.address(), "100@SEP1"));
    assert!(registry.destroy().is_clean());
}

#[test]
fn test_update_identifier_shows_in_report() {
    let registry = running();
    let destroyed_count = counter();
    let h = alloc_plain(&registry, ObjectKind::Channel, "SCCP/100-00000001", &destroyed_count);

    registry.update_identifier(h, "SCCP/100-00000002");
    let report = registry.report(InUseMode::Off);
    assert_eq!(report.rows[0].identifier.as_str(), "SCCP/100-00000002");

    let rows: Vec<_> = report.rows_of(ObjectKind::Channel).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(report.rows_of(ObjectKind::Line).count(), 0);
}
