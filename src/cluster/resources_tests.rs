// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `resources.rs`

use super::{supports_snapshot_verbs, ServerResourceIndex};
use kube::api::{ApiResource, DynamicObject};
use kube::discovery::{ApiCapabilities, Scope};

fn ar(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    let api_version = if group.is_empty() {
        version.to_string()
    } else {
        format!("{group}/{version}")
    };
    ApiResource {
        group: group.to_string(),
        version: version.to_string(),
        api_version,
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}

fn test_index() -> ServerResourceIndex {
    ServerResourceIndex::new(vec![
        ar("", "v1", "ConfigMap", "configmaps"),
        ar("", "v1", "Namespace", "namespaces"),
        ar("", "v1", "PersistentVolume", "persistentvolumes"),
        ar("apps", "v1", "Deployment", "deployments"),
        ar(
            "apiextensions.k8s.io",
            "v1",
            "CustomResourceDefinition",
            "customresourcedefinitions",
        ),
    ])
}

fn obj(ar: &ApiResource, name: &str, namespace: Option<&str>) -> DynamicObject {
    let mut item = DynamicObject::new(name, ar);
    item.metadata.namespace = namespace.map(str::to_string);
    item
}

#[test]
fn test_resource_name_lookup() {
    let index = test_index();
    assert_eq!(index.resource_name("v1", "ConfigMap").unwrap(), "configmaps");
    assert_eq!(
        index.resource_name("apps/v1", "Deployment").unwrap(),
        "deployments"
    );
}

#[test]
fn test_resource_name_is_kind_driven_for_hoisted_kinds() {
    // Namespaces and CRDs are archived at shorthand paths; the reverse
    // mapping back to a creatable resource must come from the kind.
    let index = test_index();
    assert_eq!(
        index.resource_name("v1", "Namespace").unwrap(),
        "namespaces"
    );
    assert_eq!(
        index
            .resource_name("apiextensions.k8s.io/v1", "CustomResourceDefinition")
            .unwrap(),
        "customresourcedefinitions"
    );
}

#[test]
fn test_unknown_kind_is_an_error() {
    let index = test_index();
    let err = index.resource_name("batch/v1", "Job").unwrap_err();
    assert_eq!(
        err.to_string(),
        "unable to find batch/v1/Job in server resources"
    );
}

#[test]
fn test_core_namespaced_resource_path() {
    let index = test_index();
    let item = obj(&ar("", "v1", "ConfigMap", "configmaps"), "cm1", Some("default"));
    assert_eq!(
        index.resource_path(&item).unwrap(),
        "/api/v1/namespaces/default/configmaps/cm1"
    );
}

#[test]
fn test_group_namespaced_resource_path() {
    let index = test_index();
    let item = obj(&ar("apps", "v1", "Deployment", "deployments"), "nginx", Some("web"));
    assert_eq!(
        index.resource_path(&item).unwrap(),
        "/apis/apps/v1/namespaces/web/deployments/nginx"
    );
}

#[test]
fn test_cluster_scoped_resource_path() {
    let index = test_index();
    let item = obj(&ar("", "v1", "PersistentVolume", "persistentvolumes"), "pv001", None);
    assert_eq!(
        index.resource_path(&item).unwrap(),
        "/api/v1/persistentvolumes/pv001"
    );
}

#[test]
fn test_archive_path_hoists_namespaces_and_crds() {
    let index = test_index();

    let ns = obj(&ar("", "v1", "Namespace", "namespaces"), "default", None);
    assert_eq!(index.archive_path(&ns).unwrap(), "/namespaces/default");

    let crd = obj(
        &ar(
            "apiextensions.k8s.io",
            "v1",
            "CustomResourceDefinition",
            "customresourcedefinitions",
        ),
        "foos.example.com",
        None,
    );
    assert_eq!(index.archive_path(&crd).unwrap(), "/crds/foos.example.com");

    let cm = obj(&ar("", "v1", "ConfigMap", "configmaps"), "cm1", Some("default"));
    assert_eq!(
        index.archive_path(&cm).unwrap(),
        "/api/v1/namespaces/default/configmaps/cm1"
    );
}

#[test]
fn test_verb_filter() {
    let full = ApiCapabilities {
        scope: Scope::Namespaced,
        subresources: vec![],
        operations: ["list", "create", "get", "delete", "watch"]
            .iter()
            .map(ToString::to_string)
            .collect(),
    };
    assert!(supports_snapshot_verbs(&full));

    let read_only = ApiCapabilities {
        scope: Scope::Cluster,
        subresources: vec![],
        operations: ["list", "get"].iter().map(ToString::to_string).collect(),
    };
    assert!(!supports_snapshot_verbs(&read_only));
}
