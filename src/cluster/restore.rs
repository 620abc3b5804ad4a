// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Restore engine: re-create a stored snapshot's objects on a target cluster.
//!
//! The archive is expanded into a staging directory partitioned by tier,
//! then created tier by tier: Namespaces, CRDs, PV/PVC pairs, everything
//! else, application workloads last. Per-object failures are counted on the
//! Restore status and never abort the run.

use super::preference::{is_in_list, staged_files, Preference, Tier};
use super::pv::restore_pv;
use super::resources::ServerResourceIndex;
use super::{build_target_client, config_map_marker, get_str, load_item, rand_string};
use crate::constants::{
    ARCHIVE_TMP_DIR, MARKER_NAME_PREFIX, MARKER_SUFFIX_LEN, SA_TOKEN_SECRET_TYPE,
};
use crate::crd::{Restore, RestorePreference};
use crate::errors::{kube_error_message, EngineError};
use crate::objectstore::Objectstore;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use flate2::read::GzDecoder;
use kube::api::{ApiResource, DynamicObject, PostParams};
use kube::{Api, Client};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Record one excluded object with its reason.
pub(crate) fn mark_excluded(restore: &mut Restore, path: &str, msg: &str) {
    info!(restore = restore.metadata.name.as_deref().unwrap_or_default(),
          "@@@@@ Excluded : {msg} - {path}");
    let status = restore.status.get_or_insert_with(Default::default);
    status.excluded.push(format!("{path} : {msg}"));
    status.num_excluded += 1;
}

/// Record one created object.
pub(crate) fn mark_created(restore: &mut Restore, path: &str) {
    info!(restore = restore.metadata.name.as_deref().unwrap_or_default(),
          "@@@@@ Restored : {path}");
    let status = restore.status.get_or_insert_with(Default::default);
    status.created.push(path.to_string());
    status.num_created += 1;
}

/// Record one object that already existed on the target.
pub(crate) fn mark_already_existed(restore: &mut Restore, path: &str) {
    info!(restore = restore.metadata.name.as_deref().unwrap_or_default(),
          "@@@@@ Already exists : {path}");
    let status = restore.status.get_or_insert_with(Default::default);
    status.already_existed.push(path.to_string());
    status.num_already_existed += 1;
}

/// Record one object whose creation failed.
pub(crate) fn mark_failed(restore: &mut Restore, path: &str, msg: &str) {
    warn!(restore = restore.metadata.name.as_deref().unwrap_or_default(),
          "@@@@@ Cannot create item : {msg} - {path}");
    let status = restore.status.get_or_insert_with(Default::default);
    status.failed.push(format!("{path} : {msg}"));
    status.num_failed += 1;
}

/// Classify a create error into AlreadyExisted vs Failed.
pub(crate) fn mark_create_result(
    restore: &mut Restore,
    path: &str,
    result: Result<(), String>,
) {
    match result {
        Ok(()) => mark_created(restore, path),
        Err(msg) if msg.contains("already exists") => mark_already_existed(restore, path),
        Err(msg) => mark_failed(restore, path, &msg),
    }
}

/// Create an archived object on the target cluster.
///
/// The GroupVersionResource is rebuilt from the object's `apiVersion` and
/// `kind` through the target cluster's discovery index; the archive layout
/// never drives the plural (Namespaces and CRDs are archived at shorthand
/// paths).
pub(crate) async fn create_item(
    target: &Client,
    index: &ServerResourceIndex,
    item: &DynamicObject,
) -> Result<(), String> {
    let api_version = item
        .types
        .as_ref()
        .map(|t| t.api_version.clone())
        .unwrap_or_default();
    let kind = item
        .types
        .as_ref()
        .map(|t| t.kind.clone())
        .unwrap_or_default();
    let plural = match index.resource_name(&api_version, &kind) {
        Ok(plural) => plural.to_string(),
        Err(e) => return Err(e.to_string()),
    };
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.clone()),
    };
    let ar = ApiResource {
        group,
        version,
        api_version,
        kind,
        plural,
    };
    let api: Api<DynamicObject> = match item.metadata.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => Api::namespaced_with(target.clone(), ns, &ar),
        _ => Api::all_with(target.clone(), &ar),
    };
    api.create(&PostParams::default(), item)
        .await
        .map(|_| ())
        .map_err(|e| kube_error_message(&e))
}

/// Restore one staged tier onto the target cluster, applying the per-object
/// policies.
async fn restore_dir(
    dir: &Path,
    tier: Tier,
    target: &Client,
    index: &ServerResourceIndex,
    pref: &Preference,
    restore: &mut Restore,
) -> Result<(), EngineError> {
    for file in staged_files(dir, tier).map_err(EngineError::Retryable)? {
        let file_name = file.file_name().unwrap_or_default().to_string_lossy();
        let resource_path = file_name.replace('|', "/");
        info!("---- {resource_path}");

        let mut item = load_item(&file).map_err(EngineError::Retryable)?;

        // Controlled objects are recreated by their owner.
        if item
            .metadata
            .owner_references
            .as_ref()
            .is_some_and(|o| !o.is_empty())
        {
            mark_excluded(restore, &resource_path, "Owned by another resource");
            continue;
        }

        let kind = item
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .unwrap_or_default();
        match kind.as_str() {
            "Secret" => {
                if get_str(&item.data, "type") == SA_TOKEN_SECRET_TYPE {
                    mark_excluded(restore, &resource_path, "service account token secret");
                    continue;
                }
            }
            "ClusterRole" => {
                let name = item.metadata.name.as_deref().unwrap_or_default();
                if !is_in_list(name, &pref.included_cluster_roles) {
                    mark_excluded(restore, &resource_path, "not binding to user namespaces");
                    continue;
                }
            }
            "ClusterRoleBinding" => {
                let name = item.metadata.name.as_deref().unwrap_or_default();
                if !is_in_list(name, &pref.included_cluster_role_bindings) {
                    mark_excluded(restore, &resource_path, "not binding to user namespaces");
                    continue;
                }
            }
            "PersistentVolume" | "PersistentVolumeClaim" => {
                warn!("@@@@@ Excluded : PVs/PVCs must not be included here");
                continue;
            }
            "Endpoints" => {
                let key = format!(
                    "{}/{}",
                    item.metadata.namespace.as_deref().unwrap_or_default(),
                    item.metadata.name.as_deref().unwrap_or_default()
                );
                if is_in_list(&key, &pref.service_list) {
                    mark_excluded(restore, &resource_path, "a same name service exists");
                    continue;
                }
            }
            _ => {}
        }

        item.metadata.resource_version = None;
        item.metadata.uid = None;
        let result = create_item(target, index, &item).await;
        mark_create_result(restore, &resource_path, result);
    }
    Ok(())
}

/// Restore a stored snapshot onto the cluster the spec kubeconfig points at.
///
/// # Errors
///
/// Permanent on object-store credential/bucket rejections; retryable on
/// everything else, including the PV bound timeout.
pub async fn restore(
    restore: &mut Restore,
    pref: &RestorePreference,
    bucket: &dyn Objectstore,
) -> Result<(), EngineError> {
    let snapshot_name = restore.spec.snapshot_name.clone();
    let object_name = format!("{snapshot_name}.tgz");
    let local_path = PathBuf::from(ARCHIVE_TMP_DIR).join(&object_name);

    info!("Downloading file {object_name}");
    bucket
        .download(&local_path, &object_name)
        .await
        .map_err(EngineError::from_objectstore)?;

    // Reset outcome lists from any earlier attempt.
    let status = restore.status.get_or_insert_with(Default::default);
    status.num_snapshot_contents = 0;
    status.excluded.clear();
    status.num_excluded = 0;
    status.created.clear();
    status.num_created = 0;
    status.updated.clear();
    status.num_updated = 0;
    status.already_existed.clear();
    status.num_already_existed = 0;
    status.failed.clear();
    status.num_failed = 0;

    let mut preference = Preference::new(pref);
    let staging = tempfile::TempDir::new()
        .context("creating staging dir")
        .map_err(EngineError::Retryable)?;

    extract_archive(restore, &mut preference, &local_path, &snapshot_name, staging.path())
        .map_err(EngineError::Retryable)?;

    let target = build_target_client(&restore.spec.kubeconfig)
        .await
        .map_err(EngineError::Retryable)?;

    let mut index = ServerResourceIndex::from_cluster(target.clone())
        .await
        .map_err(|e| {
            EngineError::from_api(anyhow!("Get server preferred resources failed : {}", e))
        })?;

    preference
        .initialize_by_dir(staging.path())
        .map_err(EngineError::Retryable)?;

    if preference.has_tier(Tier::Namespace) {
        info!("Restore Namespaces :");
        restore_dir(staging.path(), Tier::Namespace, &target, &index, &preference, restore)
            .await?;
    }
    if preference.has_tier(Tier::Crd) {
        info!("Restore CRDs :");
        restore_dir(staging.path(), Tier::Crd, &target, &index, &preference, restore).await?;

        // Re-discover so resources served by the just-created CRDs resolve.
        index = ServerResourceIndex::from_cluster(target.clone())
            .await
            .map_err(|e| {
                EngineError::from_api(anyhow!("Get server preferred resources failed : {}", e))
            })?;
    }
    if preference.has_tier(Tier::Pv) && preference.has_tier(Tier::Pvc) {
        info!("Restore PV/PVC :");
        restore_pv(staging.path(), &target, &index, &preference, restore).await?;
    }
    if preference.has_tier(Tier::Restore) {
        info!("Restore resources except Apps :");
        restore_dir(staging.path(), Tier::Restore, &target, &index, &preference, restore)
            .await?;
    }
    if preference.has_tier(Tier::App) {
        info!("Restore Apps :");
        restore_dir(staging.path(), Tier::App, &target, &index, &preference, restore).await?;
    }

    // Record where the target cluster ended up.
    let marker_name = format!("{MARKER_NAME_PREFIX}{}", rand_string(MARKER_SUFFIX_LEN));
    let marker = config_map_marker(&target, &marker_name)
        .await
        .map_err(|e| {
            EngineError::Retryable(anyhow!("Making restore config map marker failed : {}", e))
        })?;
    let status = restore.status.get_or_insert_with(Default::default);
    status.restore_resource_version = marker
        .metadata
        .resource_version
        .clone()
        .unwrap_or_default();
    status.restore_timestamp = Some(
        marker
            .metadata
            .creation_timestamp
            .as_ref()
            .map_or_else(Utc::now, |t| t.0),
    );

    if let Err(e) = std::fs::remove_file(&local_path) {
        warn!("could not remove downloaded archive: {e}");
    }

    if let Some(status) = restore.status.as_ref() {
        info!("Restore completed ======");
        info!("Excluded       : {}", status.num_excluded);
        info!("Created        : {}", status.num_created);
        info!("Already exists : {}", status.num_already_existed);
        info!("Failed         : {}", status.num_failed);
    }

    Ok(())
}

/// Expand the downloaded archive into the staging directory, classifying
/// every member to its tier. Excluded members are counted, not staged.
fn extract_archive(
    restore: &mut Restore,
    preference: &mut Preference,
    archive_path: &Path,
    snapshot_name: &str,
    staging: &Path,
) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("opening {}", archive_path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    info!("Extract files in snapshot tgz :");
    for entry in archive.entries().context("reading tgz entries")? {
        let mut entry = entry.context("reading tgz entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let member = entry.path().context("reading tgz entry path")?;
        let member = member.to_string_lossy().into_owned();
        let path = member.replacen(snapshot_name, "", 1);

        if path == "/snapshot.json" {
            info!("-- [Snapshot resource file] {path}");
            continue;
        }

        {
            let status = restore.status.get_or_insert_with(Default::default);
            status.num_snapshot_contents += 1;
        }

        let tier = preference.tier_for(&path);
        if tier == Tier::Exclude {
            info!("-- [{}] {path}", tier.as_str());
            mark_excluded(restore, &path, "preference");
            continue;
        }

        let staged = staging
            .join(tier.as_str())
            .join(path.replace('/', "|"));
        if let Some(parent) = staged.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .context("reading tgz entry content")?;
        std::fs::write(&staged, &content)
            .with_context(|| format!("writing {}", staged.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "restore_tests.rs"]
mod restore_tests;
