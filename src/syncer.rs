// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Object-store syncer: periodic reconciliation of stored archives against
//! Snapshot resources.
//!
//! Each pass enumerates every known bucket and every terminal-phase
//! Snapshot, then classifies:
//!
//! - **orphan objects**: archive with no matching Snapshot
//! - **object-not-found snapshots**: Snapshot whose archive is gone
//! - **object-invalid snapshots**: archive whose size/timestamp disagree
//! - **re-homed snapshots**: valid archive living in a different bucket
//!   than the Snapshot records; the spec is rewritten to the found bucket
//!
//! Three independently toggleable behaviors: delete orphans, rebuild
//! Snapshot resources from orphaned archives, and strict vs. permissive
//! file-info validation.

use crate::cluster::snapshot::truncate_to_seconds;
use crate::constants::{
    ARCHIVE_TMP_DIR, API_GROUP_VERSION, KIND_SNAPSHOT, ORPHAN_RESTORE_MIN_TTL_HOURS,
    PHASE_COMPLETED, PHASE_FAILED, REASON_FILE_MISMATCH, REASON_FILE_NOT_FOUND,
};
use crate::context::Context;
use crate::crd::{ObjectstoreConfig, Snapshot};
use crate::metrics;
use crate::objectstore::ObjectInfo;
use crate::reconcilers::status::update_snapshot_status;
use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use chrono::{Duration, Utc};
use flate2::read::GzDecoder;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::Api;
use serde_json::json;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The three independently toggleable syncer behaviors.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncToggles {
    /// Delete archives with no matching Snapshot.
    pub delete_orphans: bool,
    /// Rebuild Snapshot resources from orphaned archives instead.
    pub restore_orphans: bool,
    /// Fail snapshots whose stored size/timestamp disagree; re-complete
    /// them otherwise.
    pub validate_fileinfo: bool,
}

impl SyncToggles {
    /// Whether the syncer has anything to do.
    #[must_use]
    pub fn any(self) -> bool {
        self.delete_orphans || self.restore_orphans || self.validate_fileinfo
    }
}

/// Result of classifying archives against Snapshot resources.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Archives with no matching Snapshot resource.
    pub orphan_objects: Vec<ObjectInfo>,
    /// Terminal snapshots whose archive is gone.
    pub object_not_found: Vec<Snapshot>,
    /// Terminal snapshots whose archive disagrees on size/timestamp.
    pub object_invalid: Vec<Snapshot>,
    /// Valid snapshots recorded against the wrong bucket, with the config
    /// name the archive was actually found under.
    pub rehome: Vec<(Snapshot, String)>,
    /// Valid snapshots (including re-homed ones).
    pub valid: Vec<Snapshot>,
}

/// Whether a snapshot's stored file info matches an archive's.
///
/// Timestamps are compared at second precision, the precision statuses
/// carry.
#[must_use]
pub fn file_info_matches(snapshot: &Snapshot, object: &ObjectInfo) -> bool {
    let Some(status) = snapshot.status.as_ref() else {
        return false;
    };
    let stored = status.stored_timestamp.map(truncate_to_seconds);
    stored == Some(truncate_to_seconds(object.timestamp)) && status.stored_file_size == object.size
}

/// Classify archives and snapshots into the syncer's work lists.
///
/// Orphan matching considers every Snapshot; validity checks only terminal
/// (`Completed`/`Failed`) ones.
#[must_use]
pub fn partition(objects: &[ObjectInfo], snapshots: &[Snapshot]) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for object in objects {
        let matched = snapshots
            .iter()
            .any(|snap| snap.object_name() == object.name);
        if !matched {
            info!(
                "Orphan object : {} {} {}",
                object.name, object.timestamp, object.size
            );
            plan.orphan_objects.push(object.clone());
        }
    }

    for snap in snapshots {
        if snap.phase() != PHASE_COMPLETED && snap.phase() != PHASE_FAILED {
            continue;
        }
        match objects.iter().find(|o| o.name == snap.object_name()) {
            None => {
                info!("Object not found snap : {}", snap.object_name());
                plan.object_not_found.push(snap.clone());
            }
            Some(object) => {
                if file_info_matches(snap, object) {
                    if object.bucket_config_name != snap.spec.objectstore_config {
                        plan.rehome
                            .push((snap.clone(), object.bucket_config_name.clone()));
                    }
                    plan.valid.push(snap.clone());
                } else {
                    info!("Object invalid snap   : {}", snap.object_name());
                    plan.object_invalid.push(snap.clone());
                }
            }
        }
    }

    plan
}

/// Run one syncer pass.
///
/// # Errors
///
/// Fails on control-plane list/update failures; per-object bucket errors
/// are logged and skipped.
pub async fn sync_objects(ctx: &Context, toggles: SyncToggles) -> Result<()> {
    if !toggles.any() {
        return Ok(());
    }

    let objects = get_object_list(ctx).await?;

    let snapshots_api: Api<Snapshot> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let snapshots = snapshots_api
        .list(&ListParams::default())
        .await
        .context("List snapshots error")?
        .items;

    let plan = partition(&objects, &snapshots);

    // Re-home snapshots whose archive lives in another bucket.
    for (snap, config_name) in &plan.rehome {
        let name = snap.metadata.name.clone().unwrap_or_default();
        info!(snapshot = %name, bucket_config = %config_name, "re-homing snapshot to found bucket");
        snapshots_api
            .patch(
                &name,
                &PatchParams::default(),
                &Patch::Merge(json!({ "spec": { "objectstoreConfig": config_name } })),
            )
            .await
            .with_context(|| format!("re-homing snapshot {name}"))?;
    }

    if toggles.delete_orphans {
        for object in &plan.orphan_objects {
            info!("Deleting orphan object {}", object.name);
            match ctx.get_bucket(&object.bucket_config_name).await {
                Ok(bucket) => {
                    if let Err(e) = bucket.delete(&object.name).await {
                        warn!("- Cannot delete object {} : {e}", object.name);
                    }
                }
                Err(e) => warn!("- Cannot resolve bucket for {} : {e}", object.name),
            }
        }
    } else if toggles.restore_orphans {
        for object in &plan.orphan_objects {
            info!("Restoring orphaned snapshot from {}", object.name);
            if let Err(e) = restore_snapshot_from_object(ctx, object).await {
                warn!("- Cannot restore snapshot from {} : {e}", object.name);
            }
        }
    }

    // Strict validation fails mismatches; permissive mode re-completes them.
    if toggles.validate_fileinfo {
        for snap in &plan.object_invalid {
            if snap.phase() != PHASE_FAILED {
                update_snapshot_status(&snapshots_api, snap, PHASE_FAILED, REASON_FILE_MISMATCH)
                    .await?;
            }
        }
    } else {
        for snap in &plan.object_invalid {
            if snap.phase() != PHASE_COMPLETED {
                update_snapshot_status(&snapshots_api, snap, PHASE_COMPLETED, "").await?;
            }
        }
    }

    if toggles.delete_orphans {
        for snap in &plan.object_not_found {
            if snap.phase() != PHASE_FAILED {
                update_snapshot_status(&snapshots_api, snap, PHASE_FAILED, REASON_FILE_NOT_FOUND)
                    .await?;
            }
        }
    }

    for snap in &plan.valid {
        if snap.phase() != PHASE_COMPLETED {
            update_snapshot_status(&snapshots_api, snap, PHASE_COMPLETED, "").await?;
        }
    }

    metrics::record_sync("success");
    Ok(())
}

/// Enumerate objects across every known `ObjectstoreConfig`.
async fn get_object_list(ctx: &Context) -> Result<Vec<ObjectInfo>> {
    let configs: Api<ObjectstoreConfig> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let configs = configs
        .list(&ListParams::default())
        .await
        .context("List Objectstore Config error")?;

    let mut objects = Vec::new();
    for config in configs.items {
        let config_name = config.metadata.name.clone().unwrap_or_default();
        let bucket = match ctx.get_bucket(&config_name).await {
            Ok(bucket) => bucket,
            Err(e) => {
                warn!("Get bucket error for ObjectstoreConfig {config_name} : {e}");
                continue;
            }
        };
        let listed = bucket
            .list_object_info()
            .await
            .context("List objects error")?;
        objects.extend(listed);
    }
    Ok(objects)
}

/// Download an orphaned archive and rebuild its Snapshot resource.
async fn restore_snapshot_from_object(ctx: &Context, object: &ObjectInfo) -> Result<()> {
    let local_path = PathBuf::from(ARCHIVE_TMP_DIR).join(&object.name);
    let bucket = ctx.get_bucket(&object.bucket_config_name).await?;
    bucket.download(&local_path, &object.name).await?;
    let result = restore_snapshot_from_object_file(ctx, object, &local_path).await;
    if let Err(e) = std::fs::remove_file(&local_path) {
        warn!("could not remove downloaded archive: {e}");
    }
    result
}

/// Rebuild a Snapshot resource from a downloaded archive's `snapshot.json`.
///
/// The stored object's size/timestamp land on the status, the expiry is
/// raised to at least 30 days out, and the snapshot completes.
pub async fn restore_snapshot_from_object_file(
    ctx: &Context,
    object: &ObjectInfo,
    local_path: &Path,
) -> Result<()> {
    let stem = object.name.strip_suffix(".tgz").unwrap_or(&object.name);
    let mut restored = read_snapshot_resource(local_path, stem)?;

    restored.metadata.resource_version = None;
    restored.metadata.uid = None;
    restored.metadata.namespace = None;

    let api: Api<Snapshot> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    api.create(&PostParams::default(), &restored)
        .await
        .map_err(|e| anyhow!("Create snapshot error : {e}"))?;

    let mut status = restored.status.clone().unwrap_or_default();
    status.stored_file_size = object.size;
    status.stored_timestamp = Some(truncate_to_seconds(object.timestamp));
    let min_until = Utc::now() + Duration::hours(ORPHAN_RESTORE_MIN_TTL_HOURS);
    if status.available_until.is_none_or(|until| until < min_until) {
        status.available_until = Some(min_until);
    }
    restored.status = Some(status);

    update_snapshot_status(&api, &restored, PHASE_COMPLETED, "").await?;
    Ok(())
}

/// Locate and parse `snapshot.json` inside an archive.
///
/// The member must carry `kind`/`apiVersion`; archives from before the
/// schema carried them are rejected.
///
/// # Errors
///
/// Fails when the member is missing, unparsable, or not a Snapshot.
pub fn read_snapshot_resource(archive_path: &Path, stem: &str) -> Result<Snapshot> {
    let file = File::open(archive_path)
        .with_context(|| format!("opening {}", archive_path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    for entry in archive.entries().context("reading tgz entries")? {
        let mut entry = entry.context("reading tgz entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let member = entry.path().context("reading tgz entry path")?;
        let member = member.to_string_lossy().into_owned();
        if member.replacen(stem, "", 1) != "/snapshot.json" {
            continue;
        }

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .context("reading snapshot.json")?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).context("decoding snapshot.json")?;
        let kind = value.get("kind").and_then(|v| v.as_str()).unwrap_or("");
        let api_version = value
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if kind != KIND_SNAPSHOT || api_version != API_GROUP_VERSION {
            bail!(
                "snapshot.json in {} is not a {API_GROUP_VERSION} Snapshot (kind={kind:?}, apiVersion={api_version:?})",
                archive_path.display()
            );
        }
        let snapshot: Snapshot =
            serde_json::from_value(value).context("decoding snapshot.json")?;
        return Ok(snapshot);
    }
    bail!("Cannot find snapshot.json file in {}", archive_path.display())
}

#[cfg(test)]
#[path = "syncer_tests.rs"]
mod syncer_tests;
