// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the restore engine's pure pieces.

use super::{
    mark_already_existed, mark_create_result, mark_created, mark_excluded, mark_failed,
};
use crate::crd::{Restore, RestoreSpec};

fn restore() -> Restore {
    Restore::new(
        "test1",
        RestoreSpec {
            cluster_name: "test1".to_string(),
            snapshot_name: "snapshot".to_string(),
            kubeconfig: "kubeconfig".to_string(),
            restore_preference_name: "restorePreference".to_string(),
            available_until: None,
            ttl: None,
        },
    )
}

#[test]
fn test_outcome_counters() {
    let mut r = restore();
    mark_excluded(&mut r, "/api/v1/namespaces/web/secrets/token", "service account token secret");
    mark_created(&mut r, "/api/v1/namespaces/web/configmaps/cm1");
    mark_already_existed(&mut r, "/namespaces/web");
    mark_failed(&mut r, "/api/v1/namespaces/web/pods/p1", "pods is forbidden");

    let status = r.status.as_ref().unwrap();
    assert_eq!(status.num_excluded, 1);
    assert_eq!(status.num_created, 1);
    assert_eq!(status.num_already_existed, 1);
    assert_eq!(status.num_failed, 1);
    assert_eq!(
        status.excluded,
        vec!["/api/v1/namespaces/web/secrets/token : service account token secret"]
    );
    assert_eq!(status.created, vec!["/api/v1/namespaces/web/configmaps/cm1"]);
    assert_eq!(
        status.failed,
        vec!["/api/v1/namespaces/web/pods/p1 : pods is forbidden"]
    );
}

#[test]
fn test_create_result_classification() {
    let mut r = restore();

    mark_create_result(&mut r, "/namespaces/web", Ok(()));
    mark_create_result(
        &mut r,
        "/namespaces/web",
        Err("namespaces \"web\" already exists".to_string()),
    );
    mark_create_result(
        &mut r,
        "/api/v1/namespaces/web/pods/p1",
        Err("pods is forbidden: User cannot create resource".to_string()),
    );

    let status = r.status.as_ref().unwrap();
    assert_eq!(status.num_created, 1);
    assert_eq!(status.num_already_existed, 1);
    assert_eq!(status.num_failed, 1);
}
