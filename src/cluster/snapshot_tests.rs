// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the snapshot engine's merge rules and archive writer.

use super::{
    archive_local_path, ensure_types, excluded_resource, is_newer_resource_version,
    is_older_resource_version, merge_event, truncate_to_seconds, write_tgz, EventKind,
};
use crate::cluster::resources::ServerResourceIndex;
use chrono::{TimeZone, Utc};
use flate2::read::GzDecoder;
use kube::api::{ApiResource, DynamicObject};
use std::collections::BTreeMap;
use std::io::Read;

fn configmap_ar() -> ApiResource {
    ApiResource {
        group: String::new(),
        version: "v1".to_string(),
        api_version: "v1".to_string(),
        kind: "ConfigMap".to_string(),
        plural: "configmaps".to_string(),
    }
}

fn index() -> ServerResourceIndex {
    ServerResourceIndex::new(vec![configmap_ar()])
}

fn cm(name: &str, rv: &str) -> DynamicObject {
    let mut item = DynamicObject::new(name, &configmap_ar());
    item.metadata.namespace = Some("default".to_string());
    item.metadata.resource_version = Some(rv.to_string());
    item
}

fn base_with(items: &[DynamicObject]) -> BTreeMap<String, DynamicObject> {
    let index = index();
    items
        .iter()
        .map(|item| (index.resource_path(item).unwrap(), item.clone()))
        .collect()
}

#[test]
fn test_resource_version_comparisons() {
    assert!(is_older_resource_version("99", "100"));
    assert!(!is_older_resource_version("100", "100"));
    assert!(!is_older_resource_version("101", "100"));

    assert!(is_newer_resource_version("101", "100"));
    assert!(!is_newer_resource_version("100", "100"));
    assert!(!is_newer_resource_version("99", "100"));

    // Non-numeric versions count as neither older nor newer.
    assert!(!is_older_resource_version("abc", "100"));
    assert!(!is_newer_resource_version("abc", "100"));
    assert!(!is_older_resource_version("100", "abc"));
}

#[test]
fn test_merge_ignores_events_at_or_past_end_marker() {
    let index = index();
    let mut base = base_with(&[cm("cm1", "10")]);
    let outcome = merge_event(&mut base, &index, EventKind::Modified, cm("cm1", "100"), "100");
    assert_eq!(outcome, "ignored, not older than end resource version");
    let stored = base.values().next().unwrap();
    assert_eq!(stored.metadata.resource_version.as_deref(), Some("10"));
}

#[test]
fn test_merge_applies_newer_modification() {
    let index = index();
    let mut base = base_with(&[cm("cm1", "10")]);
    let outcome = merge_event(&mut base, &index, EventKind::Modified, cm("cm1", "50"), "100");
    assert_eq!(outcome, "applied");
    let stored = base.values().next().unwrap();
    assert_eq!(stored.metadata.resource_version.as_deref(), Some("50"));
}

#[test]
fn test_merge_ignores_older_than_stored() {
    let index = index();
    let mut base = base_with(&[cm("cm1", "60")]);
    let outcome = merge_event(&mut base, &index, EventKind::Modified, cm("cm1", "50"), "100");
    assert_eq!(outcome, "ignored, resource version is older than stored");

    // Equal versions are not "newer" either; equality is the safety margin.
    let outcome = merge_event(&mut base, &index, EventKind::Modified, cm("cm1", "60"), "100");
    assert_eq!(outcome, "ignored, resource version is older than stored");
}

#[test]
fn test_merge_deletes_listed_object() {
    let index = index();
    let mut base = base_with(&[cm("cm1", "10")]);
    let outcome = merge_event(&mut base, &index, EventKind::Deleted, cm("cm1", "50"), "100");
    assert_eq!(outcome, "deleted");
    assert!(base.is_empty());
}

#[test]
fn test_merge_adds_unlisted_object() {
    let index = index();
    let mut base = base_with(&[]);
    let outcome = merge_event(&mut base, &index, EventKind::Added, cm("cm2", "50"), "100");
    assert_eq!(outcome, "added");
    assert_eq!(base.len(), 1);
}

#[test]
fn test_merge_ignores_delete_of_absent_object() {
    let index = index();
    let mut base = base_with(&[]);
    let outcome = merge_event(&mut base, &index, EventKind::Deleted, cm("cm2", "50"), "100");
    assert_eq!(outcome, "already deleted");
    assert!(base.is_empty());
}

#[test]
fn test_nodes_and_events_are_excluded() {
    assert!(excluded_resource("nodes"));
    assert!(excluded_resource("events"));
    assert!(!excluded_resource("configmaps"));
    assert!(!excluded_resource("pods"));
}

#[test]
fn test_ensure_types_fills_missing_type_meta() {
    let ar = configmap_ar();
    let mut item = DynamicObject::new("cm1", &ar);
    item.types = None;
    ensure_types(&mut item, &ar);
    let types = item.types.as_ref().unwrap();
    assert_eq!(types.api_version, "v1");
    assert_eq!(types.kind, "ConfigMap");
}

#[test]
fn test_archive_local_path() {
    assert_eq!(
        archive_local_path("test1"),
        std::path::PathBuf::from("/tmp/test1.tgz")
    );
}

#[test]
fn test_write_tgz_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test1.tgz");
    let entries = vec![
        (
            "test1/api/v1/namespaces/default/configmaps/cm1.json".to_string(),
            br#"{"kind":"ConfigMap"}"#.to_vec(),
        ),
        ("test1/namespaces/default.json".to_string(), b"{}".to_vec()),
        ("test1/snapshot.json".to_string(), b"{}".to_vec()),
    ];
    write_tgz(&path, &entries).unwrap();

    let mut archive = tar::Archive::new(GzDecoder::new(std::fs::File::open(&path).unwrap()));
    let mut members = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        assert_eq!(entry.header().mode().unwrap(), 0o755);
        let member = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        members.push((member, content));
    }

    assert_eq!(members.len(), 3);
    assert_eq!(
        members[0].0,
        "test1/api/v1/namespaces/default/configmaps/cm1.json"
    );
    assert_eq!(members[0].1, br#"{"kind":"ConfigMap"}"#.to_vec());
    // snapshot.json is the terminal member
    assert_eq!(members[2].0, "test1/snapshot.json");
}

#[test]
fn test_truncate_to_seconds() {
    let ts = Utc.with_ymd_and_hms(2001, 5, 20, 23, 59, 59).unwrap()
        + chrono::Duration::milliseconds(587);
    assert_eq!(
        truncate_to_seconds(ts),
        Utc.with_ymd_and_hms(2001, 5, 20, 23, 59, 59).unwrap()
    );
}
