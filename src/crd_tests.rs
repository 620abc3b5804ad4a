// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

use crate::crd::{
    ObjectstoreConfigSpec, RestorePreferenceSpec, RestoreSpec, Snapshot, SnapshotSpec,
    SnapshotStatus,
};
use chrono::{TimeZone, Utc};

fn snapshot_spec() -> SnapshotSpec {
    SnapshotSpec {
        cluster_name: "test1".to_string(),
        kubeconfig: "kubeconfig".to_string(),
        objectstore_config: "objectstoreConfig".to_string(),
        available_until: None,
        ttl: Some("720h".to_string()),
    }
}

#[test]
fn test_snapshot_spec_wire_names_are_camel_case() {
    let json = serde_json::to_value(snapshot_spec()).unwrap();
    assert_eq!(json["clusterName"], "test1");
    assert_eq!(json["objectstoreConfig"], "objectstoreConfig");
    assert_eq!(json["ttl"], "720h");
    assert!(json.get("availableUntil").is_none());
}

#[test]
fn test_snapshot_available_until_rfc3339() {
    let mut spec = snapshot_spec();
    spec.available_until = Some(Utc.with_ymd_and_hms(2020, 7, 1, 2, 3, 4).unwrap());
    spec.ttl = None;
    let json = serde_json::to_value(&spec).unwrap();
    let round: SnapshotSpec = serde_json::from_value(json.clone()).unwrap();
    assert_eq!(round.available_until, spec.available_until);
    assert!(json["availableUntil"]
        .as_str()
        .unwrap()
        .starts_with("2020-07-01T02:03:04"));
}

#[test]
fn test_snapshot_serializes_kind_and_api_version() {
    let snapshot = Snapshot::new("test1", snapshot_spec());
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["kind"], "Snapshot");
    assert_eq!(json["apiVersion"], "clustersnap.firestoned.io/v1alpha1");
    assert_eq!(json["metadata"]["name"], "test1");
}

#[test]
fn test_snapshot_phase_and_object_name() {
    let mut snapshot = Snapshot::new("test1", snapshot_spec());
    assert_eq!(snapshot.phase(), "");
    assert_eq!(snapshot.object_name(), "test1.tgz");

    snapshot.status = Some(SnapshotStatus {
        phase: "Completed".to_string(),
        ..SnapshotStatus::default()
    });
    assert_eq!(snapshot.phase(), "Completed");
}

#[test]
fn test_snapshot_status_contents_round_trip() {
    let status = SnapshotStatus {
        phase: "Completed".to_string(),
        contents: vec![
            "/api/v1/namespaces/default/configmaps/cm1".to_string(),
            "/namespaces/default".to_string(),
        ],
        number_of_contents: 2,
        stored_file_size: 131_072,
        ..SnapshotStatus::default()
    };
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["numberOfContents"], 2);
    assert_eq!(json["storedFileSize"], 131_072);
    let round: SnapshotStatus = serde_json::from_value(json).unwrap();
    assert_eq!(round.contents.len(), 2);
}

#[test]
fn test_restore_spec_wire_names() {
    let spec = RestoreSpec {
        cluster_name: "test1".to_string(),
        snapshot_name: "snapshot".to_string(),
        kubeconfig: "kubeconfig".to_string(),
        restore_preference_name: "restorePreference".to_string(),
        available_until: None,
        ttl: Some("168h".to_string()),
    };
    let json = serde_json::to_value(&spec).unwrap();
    assert_eq!(json["snapshotName"], "snapshot");
    assert_eq!(json["restorePreferenceName"], "restorePreference");
}

#[test]
fn test_restore_preference_wire_names() {
    let spec = RestorePreferenceSpec {
        exclude_namespaces: vec!["kube-system".to_string()],
        exclude_crds: vec!["felixconfigurations".to_string()],
        exclude_api_pathes: vec!["/apis/rbac".to_string()],
        restore_app_api_pathes: vec!["/apis/apps".to_string()],
        restore_nfs_storage_classes: vec!["nfs".to_string()],
        restore_options: vec![],
    };
    let json = serde_json::to_value(&spec).unwrap();
    assert_eq!(json["excludeCRDs"][0], "felixconfigurations");
    assert_eq!(json["excludeApiPathes"][0], "/apis/rbac");
    assert_eq!(json["restoreNfsStorageClasses"][0], "nfs");
}

#[test]
fn test_restore_preference_defaults_to_empty_lists() {
    let spec: RestorePreferenceSpec = serde_json::from_value(serde_json::json!({})).unwrap();
    assert!(spec.exclude_namespaces.is_empty());
    assert!(spec.exclude_crds.is_empty());
}

#[test]
fn test_objectstore_config_wire_names() {
    let spec = ObjectstoreConfigSpec {
        region: "us-east-1".to_string(),
        endpoint: "https://objectstore.example.com".to_string(),
        cloud_credential_secret: "cloudCredentialSecret".to_string(),
        bucket: "snapshots".to_string(),
    };
    let json = serde_json::to_value(&spec).unwrap();
    assert_eq!(json["cloudCredentialSecret"], "cloudCredentialSecret");
    assert_eq!(json["bucket"], "snapshots");
}
