// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for cluster-state snapshots.
//!
//! This module defines all Kubernetes Custom Resource Definitions used by
//! Clustersnap to snapshot and restore target clusters declaratively.
//!
//! # Resource Types
//!
//! - [`Snapshot`] - Requests a point-in-time snapshot of a target cluster
//! - [`Restore`] - Requests a restore of a stored snapshot onto a target cluster
//! - [`RestorePreference`] - Inclusion/exclusion policy applied by a restore
//! - [`ObjectstoreConfig`] - Bucket endpoint, region and credential reference
//!
//! # Example: Requesting a Snapshot
//!
//! ```rust,no_run
//! use clustersnap::crd::SnapshotSpec;
//!
//! let spec = SnapshotSpec {
//!     cluster_name: "staging".to_string(),
//!     kubeconfig: "<kubeconfig yaml>".to_string(),
//!     objectstore_config: "default-bucket".to_string(),
//!     available_until: None,
//!     ttl: Some("720h".to_string()),
//! };
//! ```
//!
//! The `phase`/`reason` pair on each status is the primary observability
//! surface: phases move `"" -> InQueue -> InProgress -> Completed | Failed`
//! and the reason carries the failure message verbatim.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `Snapshot` requests a point-in-time snapshot of a target cluster.
///
/// The resource name doubles as the archive stem: a snapshot named `test1`
/// is stored as `test1.tgz` in the referenced bucket.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "clustersnap.firestoned.io",
    version = "v1alpha1",
    kind = "Snapshot",
    plural = "snapshots",
    namespaced,
    status = "SnapshotStatus",
    shortname = "csnap",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"AvailableUntil","type":"string","jsonPath":".status.availableUntil"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSpec {
    /// Display name of the target cluster.
    pub cluster_name: String,

    /// Opaque kubeconfig granting access to the target cluster.
    pub kubeconfig: String,

    /// Name of the sibling [`ObjectstoreConfig`] naming the bucket the
    /// archive is uploaded to.
    pub objectstore_config: String,

    /// Absolute expiry. Takes precedence over `ttl` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_until: Option<DateTime<Utc>>,

    /// Relative expiry as a Go-style duration string (e.g. "720h").
    /// Used iff `availableUntil` is unset; defaulted to 720h by the queuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

/// Status of a [`Snapshot`], mutated only by the reconciler.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStatus {
    /// One of "", `InQueue`, `InProgress`, `Completed`, `Failed`.
    #[serde(default)]
    pub phase: String,

    /// Failure message, verbatim from the failing call. Empty on success.
    #[serde(default)]
    pub reason: String,

    /// Resource version of the end marker; the snapshot is equivalent to an
    /// atomic capture at this version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snapshot_resource_version: String,

    /// Creation time of the end marker; the nominal snapshot time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_timestamp: Option<DateTime<Utc>>,

    /// Materialized expiry; the resource is deleted once this passes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_until: Option<DateTime<Utc>>,

    /// Materialized TTL as a Go-style duration string.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ttl: String,

    /// Sorted canonical resource paths of every archived object.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<String>,

    /// Number of archived objects (excludes `snapshot.json`).
    #[serde(default)]
    pub number_of_contents: i32,

    /// Size in bytes the bucket reported after upload.
    #[serde(default)]
    pub stored_file_size: i64,

    /// Timestamp the bucket reported after upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_timestamp: Option<DateTime<Utc>>,
}

/// `Restore` requests re-creation of a stored snapshot's objects on a
/// target cluster, filtered through a [`RestorePreference`].
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "clustersnap.firestoned.io",
    version = "v1alpha1",
    kind = "Restore",
    plural = "restores",
    namespaced,
    status = "RestoreStatus",
    shortname = "crst",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Snapshot","type":"string","jsonPath":".spec.snapshotName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    /// Display name of the target cluster.
    pub cluster_name: String,

    /// Name of the `Snapshot` resource whose archive is restored.
    pub snapshot_name: String,

    /// Opaque kubeconfig granting access to the target cluster.
    pub kubeconfig: String,

    /// Name of the [`RestorePreference`] driving path classification.
    pub restore_preference_name: String,

    /// Absolute expiry. Takes precedence over `ttl` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_until: Option<DateTime<Utc>>,

    /// Relative expiry as a Go-style duration string (e.g. "168h").
    /// Used iff `availableUntil` is unset; defaulted to 168h by the queuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

/// Status of a [`Restore`]. Besides the phase machine fields it carries the
/// per-object outcome lists of the last restore run.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStatus {
    /// One of "", `InQueue`, `InProgress`, `Completed`, `Failed`.
    #[serde(default)]
    pub phase: String,

    /// Failure message, verbatim from the failing call. Empty on success.
    #[serde(default)]
    pub reason: String,

    /// Resource version of the target cluster when the restore completed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub restore_resource_version: String,

    /// Completion time of the restore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_timestamp: Option<DateTime<Utc>>,

    /// Materialized expiry; the resource is deleted once this passes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_until: Option<DateTime<Utc>>,

    /// Materialized TTL as a Go-style duration string.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ttl: String,

    /// Number of object members in the downloaded archive.
    #[serde(default)]
    pub num_snapshot_contents: i32,

    /// Paths excluded by preference or per-object policy, with the reason.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
    #[serde(default)]
    pub num_excluded: i32,

    /// Paths created on the target cluster.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created: Vec<String>,
    #[serde(default)]
    pub num_created: i32,

    /// Paths updated on the target cluster.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<String>,
    #[serde(default)]
    pub num_updated: i32,

    /// Paths that already existed on the target cluster.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub already_existed: Vec<String>,
    #[serde(default)]
    pub num_already_existed: i32,

    /// Paths whose creation failed, with the error message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
    #[serde(default)]
    pub num_failed: i32,
}

/// `RestorePreference` drives which archive entries a restore re-creates.
///
/// Exclusion entries match namespaces and CRDs by substring; API path
/// entries are a prefix with an optional comma-separated substring filter
/// (e.g. `/apis/apps/v1,deployments`).
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "clustersnap.firestoned.io",
    version = "v1alpha1",
    kind = "RestorePreference",
    plural = "restorepreferences",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RestorePreferenceSpec {
    /// Namespaces whose objects are not restored.
    #[serde(default)]
    pub exclude_namespaces: Vec<String>,

    /// CRD names that are not restored.
    #[serde(default, rename = "excludeCRDs")]
    pub exclude_crds: Vec<String>,

    /// API path prefixes (with optional `,substring` filter) to exclude.
    #[serde(default)]
    pub exclude_api_pathes: Vec<String>,

    /// API path prefixes (with optional `,substring` filter) restored last,
    /// as application workloads.
    #[serde(default)]
    pub restore_app_api_pathes: Vec<String>,

    /// Storage class name prefixes whose PV/PVC pairs are restored.
    #[serde(default)]
    pub restore_nfs_storage_classes: Vec<String>,

    /// Free-form restore options.
    #[serde(default)]
    pub restore_options: Vec<String>,
}

/// `ObjectstoreConfig` names a bucket and the credential secret to reach it.
///
/// The referenced Secret must hold `accesskey` and `secretkey` entries.
/// The controller only reads this resource.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "clustersnap.firestoned.io",
    version = "v1alpha1",
    kind = "ObjectstoreConfig",
    plural = "objectstoreconfigs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectstoreConfigSpec {
    /// Object store region.
    pub region: String,

    /// Object store endpoint URL.
    pub endpoint: String,

    /// Name of the Secret holding `accesskey`/`secretkey`.
    pub cloud_credential_secret: String,

    /// Bucket name.
    pub bucket: String,
}

impl Snapshot {
    /// Current phase, or "" when no status has been written yet.
    #[must_use]
    pub fn phase(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.phase.as_str())
    }

    /// Name of the archive object for this snapshot (`<name>.tgz`).
    #[must_use]
    pub fn object_name(&self) -> String {
        format!("{}.tgz", self.metadata.name.as_deref().unwrap_or_default())
    }
}

impl Restore {
    /// Current phase, or "" when no status has been written yet.
    #[must_use]
    pub fn phase(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.phase.as_str())
    }
}
