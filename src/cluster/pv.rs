// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! PV/PVC pairing: restore bound volumes one pair at a time.
//!
//! A PVC is only restored together with the PV it was bound to. The PV goes
//! first with its claim reference cleared; the PVC follows with its volume
//! name cleared so the control plane re-binds them, and the restore waits
//! for the PV to report `Bound` before moving on.

use super::preference::{staged_files, Preference, Tier};
use super::resources::ServerResourceIndex;
use super::restore::{create_item, mark_create_result, mark_excluded};
use super::{get_map, load_item};
use crate::constants::{
    BIND_COMPLETED_ANNOTATION, PV_BOUND_POLL_ATTEMPTS, PV_BOUND_POLL_SECS,
    STORAGE_CLASS_ANNOTATION,
};
use crate::crd::Restore;
use crate::errors::EngineError;
use anyhow::anyhow;
use kube::api::{ApiResource, DynamicObject};
use kube::{Api, Client};
use std::path::Path;
use std::time::Duration;
use tracing::info;

fn pv_api_resource() -> ApiResource {
    ApiResource {
        group: String::new(),
        version: "v1".to_string(),
        api_version: "v1".to_string(),
        kind: "PersistentVolume".to_string(),
        plural: "persistentvolumes".to_string(),
    }
}

/// Whether a PVC names an eligible storage class.
///
/// The spec class qualifies when it is set and included; otherwise the
/// legacy beta annotation gets the same chance. A spec class outside the
/// preference does not veto an included annotation class.
pub(crate) fn has_included_storage_class(item: &DynamicObject, pref: &Preference) -> bool {
    let spec_class = get_map(&item.data, "spec")
        .and_then(|spec| spec.get("storageClassName"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if !spec_class.is_empty() && pref.is_included_storage_class(spec_class) {
        return true;
    }
    let annotation_class = item
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(STORAGE_CLASS_ANNOTATION))
        .map(String::as_str)
        .unwrap_or("");
    !annotation_class.is_empty() && pref.is_included_storage_class(annotation_class)
}

/// Clear the fields that would pin a restored PV to its old claim.
pub(crate) fn prepare_pv(item: &mut DynamicObject) {
    if let Some(spec) = item.data.get_mut("spec").and_then(|v| v.as_object_mut()) {
        spec.insert("claimRef".to_string(), serde_json::Value::Null);
    }
    if let Some(obj) = item.data.as_object_mut() {
        obj.insert("status".to_string(), serde_json::Value::Null);
    }
    item.metadata.resource_version = None;
    item.metadata.uid = None;
}

/// Clear the fields that would pin a restored PVC to its old volume.
pub(crate) fn prepare_pvc(item: &mut DynamicObject) {
    if let Some(spec) = item.data.get_mut("spec").and_then(|v| v.as_object_mut()) {
        spec.insert("volumeName".to_string(), serde_json::Value::Null);
    }
    if let Some(obj) = item.data.as_object_mut() {
        obj.insert("status".to_string(), serde_json::Value::Null);
    }
    if let Some(annotations) = item.metadata.annotations.as_mut() {
        annotations.remove(BIND_COMPLETED_ANNOTATION);
    }
    item.metadata.resource_version = None;
    item.metadata.uid = None;
}

/// Whether a PV on the target cluster reports `status.phase == Bound`.
async fn is_pv_bound(target: &Client, pv_name: &str) -> Result<bool, kube::Error> {
    let api: Api<DynamicObject> = Api::all_with(target.clone(), &pv_api_resource());
    let pv = api.get(pv_name).await?;
    let phase = get_map(&pv.data, "status")
        .map(|status| {
            status
                .get("phase")
                .and_then(|p| p.as_str())
                .unwrap_or("")
                .to_string()
        })
        .unwrap_or_default();
    info!("     Checking PV:{pv_name} status:{phase}");
    Ok(phase == "Bound")
}

/// Restore PV/PVC pairs one by one, waiting for each bind.
///
/// # Errors
///
/// Retryable on API failures; the bound-wait timeout fails the restore.
pub async fn restore_pv(
    dir: &Path,
    target: &Client,
    index: &ServerResourceIndex,
    pref: &Preference,
    restore: &mut Restore,
) -> Result<(), EngineError> {
    for pvc_file in staged_files(dir, Tier::Pvc).map_err(EngineError::Retryable)? {
        let pvc_file_name = pvc_file.file_name().unwrap_or_default().to_string_lossy();
        let resource_path = pvc_file_name.replace('|', "/");
        let mut pvc_item = load_item(&pvc_file).map_err(EngineError::Retryable)?;
        info!("---- {resource_path}");

        if get_map(&pvc_item.data, "spec").is_none() {
            mark_excluded(restore, &resource_path, "no-pvc-spec");
            continue;
        }

        if !has_included_storage_class(&pvc_item, pref) {
            mark_excluded(restore, &resource_path, "no-storageclass");
            continue;
        }

        let volume_name = get_map(&pvc_item.data, "spec")
            .and_then(|spec| spec.get("volumeName"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if volume_name.is_empty() {
            mark_excluded(restore, &resource_path, "not-bounded");
            continue;
        }

        // Find the PV this claim was bound to.
        let pv_needle = format!("|persistentvolumes|{volume_name}.json");
        let mut pv_item: Option<(DynamicObject, String)> = None;
        for pv_file in staged_files(dir, Tier::Pv).map_err(EngineError::Retryable)? {
            let pv_file_name = pv_file.file_name().unwrap_or_default().to_string_lossy();
            if pv_file_name.contains(&pv_needle) {
                let item = load_item(&pv_file).map_err(EngineError::Retryable)?;
                pv_item = Some((item, pv_file_name.replace('|', "/")));
                break;
            }
        }
        let Some((mut pv_item, pv_resource_path)) = pv_item else {
            mark_excluded(restore, &resource_path, "pv-not-found");
            continue;
        };

        // PV first
        let pv_name = pv_item.metadata.name.clone().unwrap_or_default();
        info!("     Restoring PV {pv_name}");
        if get_map(&pv_item.data, "spec").is_none() {
            mark_excluded(restore, &pv_resource_path, "no-pv-spec");
            continue;
        }
        prepare_pv(&mut pv_item);
        let result = create_item(target, index, &pv_item).await;
        let failed = result.is_err();
        mark_create_result(restore, &pv_resource_path, result);
        if failed {
            continue;
        }

        // Then the PVC
        let pvc_name = pvc_item.metadata.name.clone().unwrap_or_default();
        info!("     Restoring PVC {pvc_name}");
        prepare_pvc(&mut pvc_item);
        let result = create_item(target, index, &pvc_item).await;
        let failed = result.is_err();
        mark_create_result(restore, &resource_path, result);
        if failed {
            continue;
        }

        // Wait for the pair to bind
        let mut bound = false;
        for _ in 0..PV_BOUND_POLL_ATTEMPTS {
            if is_pv_bound(target, &pv_name)
                .await
                .map_err(|e| EngineError::Retryable(anyhow!("{e}")))?
            {
                info!("     PV:{pv_name} - PVC:{pvc_name} bound successfully");
                bound = true;
                break;
            }
            tokio::time::sleep(Duration::from_secs(PV_BOUND_POLL_SECS)).await;
        }
        if !bound {
            return Err(EngineError::Retryable(anyhow!(
                "Timeout : waiting for PV/PVC bound {pv_name}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "pv_tests.rs"]
mod pv_tests;
