// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status update helpers for Snapshot and Restore resources.
//!
//! The reconciler exclusively owns status mutations. Updates write the full
//! status block with the given phase/reason through the status subresource,
//! so engine-filled fields (contents, stored size, outcome lists) land in
//! the same write as the phase transition.

use crate::crd::{Restore, Snapshot};
use anyhow::{Context, Result};
use kube::api::{Patch, PatchParams};
use kube::Api;
use serde_json::json;

/// Write a Snapshot's status with the given phase and reason.
///
/// # Errors
///
/// Propagates the API error with the snapshot name attached.
pub async fn update_snapshot_status(
    api: &Api<Snapshot>,
    snapshot: &Snapshot,
    phase: &str,
    reason: &str,
) -> Result<Snapshot> {
    let name = snapshot.metadata.name.clone().unwrap_or_default();
    let mut status = snapshot.status.clone().unwrap_or_default();
    status.phase = phase.to_string();
    status.reason = reason.to_string();
    api.patch_status(
        &name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "status": status })),
    )
    .await
    .with_context(|| format!("Failed to update snapshot status for {name}"))
}

/// Write a Restore's status with the given phase and reason.
///
/// # Errors
///
/// Propagates the API error with the restore name attached.
pub async fn update_restore_status(
    api: &Api<Restore>,
    restore: &Restore,
    phase: &str,
    reason: &str,
) -> Result<Restore> {
    let name = restore.metadata.name.clone().unwrap_or_default();
    let mut status = restore.status.clone().unwrap_or_default();
    status.phase = phase.to_string();
    status.reason = reason.to_string();
    api.patch_status(
        &name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "status": status })),
    )
    .await
    .with_context(|| format!("Failed to update restore status for {name}"))
}
