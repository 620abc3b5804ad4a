// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the object-store syncer's classification and the
//! snapshot.json reader.

use super::{file_info_matches, partition, read_snapshot_resource, SyncToggles};
use crate::cluster::snapshot::write_tgz;
use crate::crd::{Snapshot, SnapshotSpec, SnapshotStatus};
use crate::objectstore::ObjectInfo;
use chrono::{TimeZone, Utc};

fn object(name: &str, size: i64, bucket_config_name: &str) -> ObjectInfo {
    ObjectInfo {
        name: name.to_string(),
        size,
        timestamp: Utc.with_ymd_and_hms(2001, 5, 20, 23, 59, 59).unwrap(),
        bucket_config_name: bucket_config_name.to_string(),
    }
}

fn snapshot(name: &str, phase: &str) -> Snapshot {
    let mut snap = Snapshot::new(
        name,
        SnapshotSpec {
            cluster_name: name.to_string(),
            kubeconfig: "kubeconfig".to_string(),
            objectstore_config: "objectstoreConfig".to_string(),
            available_until: None,
            ttl: None,
        },
    );
    snap.status = Some(SnapshotStatus {
        phase: phase.to_string(),
        stored_file_size: 131_072,
        stored_timestamp: Some(Utc.with_ymd_and_hms(2001, 5, 20, 23, 59, 59).unwrap()),
        ..SnapshotStatus::default()
    });
    snap
}

#[test]
fn test_toggles_any() {
    assert!(!SyncToggles::default().any());
    assert!(SyncToggles {
        delete_orphans: true,
        ..SyncToggles::default()
    }
    .any());
}

#[test]
fn test_orphan_object_detected() {
    // An archive with no matching Snapshot is an orphan.
    let objects = vec![object("orphan.tgz", 131_072, "objectstoreConfig")];
    let plan = partition(&objects, &[]);
    assert_eq!(plan.orphan_objects.len(), 1);
    assert_eq!(plan.orphan_objects[0].name, "orphan.tgz");
}

#[test]
fn test_matching_snapshot_is_valid() {
    let objects = vec![object("test1.tgz", 131_072, "objectstoreConfig")];
    let snaps = vec![snapshot("test1", "Completed")];
    let plan = partition(&objects, &snaps);
    assert!(plan.orphan_objects.is_empty());
    assert!(plan.object_invalid.is_empty());
    assert!(plan.rehome.is_empty());
    assert_eq!(plan.valid.len(), 1);
}

#[test]
fn test_size_mismatch_is_invalid() {
    let objects = vec![object("test1.tgz", 999, "objectstoreConfig")];
    let snaps = vec![snapshot("test1", "Completed")];
    let plan = partition(&objects, &snaps);
    assert_eq!(plan.object_invalid.len(), 1);
    assert!(plan.valid.is_empty());
}

#[test]
fn test_timestamp_mismatch_is_invalid() {
    let mut objects = vec![object("test1.tgz", 131_072, "objectstoreConfig")];
    objects[0].timestamp = Utc.with_ymd_and_hms(2002, 1, 1, 0, 0, 0).unwrap();
    let snaps = vec![snapshot("test1", "Completed")];
    let plan = partition(&objects, &snaps);
    assert_eq!(plan.object_invalid.len(), 1);
}

#[test]
fn test_subsecond_difference_still_matches() {
    let mut objects = vec![object("test1.tgz", 131_072, "objectstoreConfig")];
    objects[0].timestamp += chrono::Duration::milliseconds(431);
    let snaps = vec![snapshot("test1", "Completed")];
    assert!(file_info_matches(&snaps[0], &objects[0]));
}

#[test]
fn test_missing_archive_detected() {
    let snaps = vec![snapshot("test1", "Completed")];
    let plan = partition(&[], &snaps);
    assert_eq!(plan.object_not_found.len(), 1);
}

#[test]
fn test_non_terminal_snapshots_are_skipped() {
    for phase in ["", "InQueue", "InProgress"] {
        let plan = partition(&[], &[snapshot("test1", phase)]);
        assert!(plan.object_not_found.is_empty(), "phase {phase}");
    }
}

#[test]
fn test_valid_archive_in_other_bucket_is_rehomed() {
    // The archive is valid but lives under a different ObjectstoreConfig:
    // the snapshot is re-homed, not failed.
    let objects = vec![object("test1.tgz", 131_072, "bucket")];
    let snaps = vec![snapshot("test1", "Completed")];
    let plan = partition(&objects, &snaps);
    assert!(plan.object_invalid.is_empty());
    assert_eq!(plan.rehome.len(), 1);
    assert_eq!(plan.rehome[0].1, "bucket");
    assert_eq!(plan.valid.len(), 1);
}

fn archive_with_snapshot_json(dir: &std::path::Path, value: &serde_json::Value) -> std::path::PathBuf {
    let path = dir.join("test1.tgz");
    let entries = vec![
        ("test1/namespaces/default.json".to_string(), b"{}".to_vec()),
        (
            "test1/snapshot.json".to_string(),
            serde_json::to_vec(value).unwrap(),
        ),
    ];
    write_tgz(&path, &entries).unwrap();
    path
}

#[test]
fn test_read_snapshot_resource() {
    let dir = tempfile::tempdir().unwrap();
    let snap = snapshot("test1", "");
    let path = archive_with_snapshot_json(dir.path(), &serde_json::to_value(&snap).unwrap());

    let restored = read_snapshot_resource(&path, "test1").unwrap();
    assert_eq!(restored.metadata.name.as_deref(), Some("test1"));
    assert_eq!(restored.spec.objectstore_config, "objectstoreConfig");
}

#[test]
fn test_read_snapshot_resource_rejects_missing_type_meta() {
    // Archives from before snapshot.json carried kind/apiVersion are
    // rejected, not defaulted.
    let dir = tempfile::tempdir().unwrap();
    let mut value = serde_json::to_value(snapshot("test1", "")).unwrap();
    value.as_object_mut().unwrap().remove("kind");
    value.as_object_mut().unwrap().remove("apiVersion");
    let path = archive_with_snapshot_json(dir.path(), &value);

    let err = read_snapshot_resource(&path, "test1").unwrap_err();
    assert!(err.to_string().contains("not a"), "{err}");
}

#[test]
fn test_read_snapshot_resource_requires_member() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test1.tgz");
    write_tgz(
        &path,
        &[("test1/namespaces/default.json".to_string(), b"{}".to_vec())],
    )
    .unwrap();

    let err = read_snapshot_resource(&path, "test1").unwrap_err();
    assert!(err.to_string().contains("Cannot find snapshot.json"));
}
