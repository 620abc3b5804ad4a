// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Clustersnap controller.
//!
//! This module contains all numeric and string constants used throughout the
//! codebase. Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all Clustersnap CRDs
pub const API_GROUP: &str = "clustersnap.firestoned.io";

/// API version for all Clustersnap CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "clustersnap.firestoned.io/v1alpha1";

/// Kind name for the `Snapshot` resource
pub const KIND_SNAPSHOT: &str = "Snapshot";

/// Kind name for the `Restore` resource
pub const KIND_RESTORE: &str = "Restore";

/// Kind name for the `RestorePreference` resource
pub const KIND_RESTORE_PREFERENCE: &str = "RestorePreference";

/// Kind name for the `ObjectstoreConfig` resource
pub const KIND_OBJECTSTORE_CONFIG: &str = "ObjectstoreConfig";

// ============================================================================
// Phase Constants
// ============================================================================

/// Phase of a resource the queuer has not seen yet
pub const PHASE_NONE: &str = "";

/// Phase of a resource accepted by the queuer, waiting for an executor
pub const PHASE_IN_QUEUE: &str = "InQueue";

/// Phase of a resource an executor is working on
pub const PHASE_IN_PROGRESS: &str = "InProgress";

/// Terminal phase of a successful snapshot/restore
pub const PHASE_COMPLETED: &str = "Completed";

/// Terminal phase of a failed snapshot/restore
pub const PHASE_FAILED: &str = "Failed";

// ============================================================================
// Expiration Constants
// ============================================================================

/// Default TTL applied to a Snapshot when neither `ttl` nor `availableUntil`
/// is set (30 days)
pub const DEFAULT_SNAPSHOT_TTL: &str = "720h";

/// Default TTL applied to a Restore when neither `ttl` nor `availableUntil`
/// is set (7 days)
pub const DEFAULT_RESTORE_TTL: &str = "168h";

/// Minimum remaining lifetime granted to a Snapshot resource rebuilt from an
/// orphaned archive (30 days)
pub const ORPHAN_RESTORE_MIN_TTL_HOURS: i64 = 720;

// ============================================================================
// Reason Strings
// ============================================================================

/// Reason set when `spec.availableUntil` is already past at queuing time
pub const REASON_PAST_AVAILABLE_UNTIL: &str = "AvailableUntil is set as past.";

/// Reason set when a restart finds a Snapshot still `InProgress`
pub const REASON_SNAPSHOT_STALE: &str = "Controller stopped while taking the snapshot";

/// Reason set when a restart finds a Restore still `InProgress`
pub const REASON_RESTORE_STALE: &str = "Controller stopped while processing the restore";

/// Reason set by the syncer when stored size/timestamp disagree with the bucket
pub const REASON_FILE_MISMATCH: &str = "Snapshot file size or timestamp not matched";

/// Reason set by the syncer when a snapshot's archive is gone from the bucket
pub const REASON_FILE_NOT_FOUND: &str = "Snapshot file not found";

/// Reason set when a Restore references a Snapshot that is not `Completed`
pub const REASON_SNAPSHOT_NOT_COMPLETED: &str = "Snapshot data is not in status 'Completed'";

// ============================================================================
// Marker Constants
// ============================================================================

/// Name prefix of the create-then-delete ConfigMap used as a resource-version
/// marker on the target cluster
pub const MARKER_NAME_PREFIX: &str = "resource-version-marker-";

/// Length of the random lowercase-alphanumeric marker name suffix
pub const MARKER_SUFFIX_LEN: usize = 10;

/// Namespace the marker ConfigMap is created in on the target cluster
pub const MARKER_NAMESPACE: &str = "default";

// ============================================================================
// Snapshot Engine Constants
// ============================================================================

/// Resource plurals never included in a snapshot
pub const EXCLUDED_RESOURCES: [&str; 2] = ["nodes", "events"];

/// Directory snapshot archives are staged in before upload / after download
pub const ARCHIVE_TMP_DIR: &str = "/tmp";

/// File mode of every archive member
pub const ARCHIVE_FILE_MODE: u32 = 0o755;

/// Target-cluster API errors never retried
pub const API_PERM_ERRORS: [&str; 1] = ["Unauthorized"];

/// Object store errors never retried
pub const OBJECTSTORE_PERM_ERRORS: [&str; 3] =
    ["SignatureDoesNotMatch", "InvalidAccessKeyId", "NoSuchBucket"];

// ============================================================================
// Restore Engine Constants
// ============================================================================

/// Secret type excluded from restores (recreated by the token controller)
pub const SA_TOKEN_SECRET_TYPE: &str = "kubernetes.io/service-account-token";

/// Legacy annotation carrying a PVC's storage class
pub const STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";

/// PVC annotation removed before re-creation so binding restarts cleanly
pub const BIND_COMPLETED_ANNOTATION: &str = "pv.kubernetes.io/bind-completed";

/// Seconds between PV bound-phase polls
pub const PV_BOUND_POLL_SECS: u64 = 5;

/// Number of PV bound-phase polls before the restore fails
pub const PV_BOUND_POLL_ATTEMPTS: u32 = 10;

// ============================================================================
// Controller Defaults
// ============================================================================

/// Default namespace the controller watches
pub const DEFAULT_NAMESPACE: &str = "clustersnap";

/// Default number of concurrent snapshot workers
pub const DEFAULT_SNAPSHOT_WORKERS: usize = 5;

/// Default number of concurrent restore workers
pub const DEFAULT_RESTORE_WORKERS: usize = 2;

/// Default retry budget for one snapshot/restore operation, in minutes
pub const DEFAULT_MAX_RETRY_MIN: u64 = 5;

/// Default period of the object-store syncer, in seconds
pub const DEFAULT_SYNC_PERIOD_SECS: u64 = 3600;

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for the Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path of the Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for the metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
