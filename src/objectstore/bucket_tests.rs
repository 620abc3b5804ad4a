// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `bucket.rs`

use super::Bucket;
use crate::objectstore::Objectstore;

fn test_bucket() -> Bucket {
    Bucket::new(
        "objectstoreConfig",
        "accesskey",
        "secretkey",
        "https://objectstore.example.com",
        "us-east-1",
        "snapshots",
        false,
    )
}

#[test]
fn test_accessors() {
    let bucket = test_bucket();
    assert_eq!(bucket.config_name(), "objectstoreConfig");
    assert_eq!(bucket.endpoint(), "https://objectstore.example.com");
    assert_eq!(bucket.bucket_name(), "snapshots");
}

#[test]
fn test_object_info_carries_config_name() {
    let bucket = test_bucket();
    let info = bucket.object_info_from("test1.tgz", Some(131_072), Some(990_403_199));
    assert_eq!(info.name, "test1.tgz");
    assert_eq!(info.size, 131_072);
    assert_eq!(info.bucket_config_name, "objectstoreConfig");
    assert_eq!(info.timestamp.timestamp(), 990_403_199);
}

#[test]
fn test_object_info_defaults_when_store_omits_fields() {
    let bucket = test_bucket();
    let info = bucket.object_info_from("x.tgz", None, None);
    assert_eq!(info.size, 0);
    assert_eq!(info.timestamp.timestamp(), 0);
}
