// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Snapshot engine: capture every listable object of the target cluster.
//!
//! Listing across many resource kinds cannot be atomic, so the engine
//! brackets the listing phase with two resource-version markers and watches
//! every kind while listing. Replaying the buffered watch events up to the
//! end marker turns the listed sets into an image equivalent to one atomic
//! capture at the end marker.

use super::{build_target_client, config_map_marker, rand_string};
use crate::cluster::resources::ServerResourceIndex;
use crate::constants::{
    ARCHIVE_FILE_MODE, ARCHIVE_TMP_DIR, DEFAULT_SNAPSHOT_TTL, EXCLUDED_RESOURCES,
    MARKER_NAME_PREFIX, MARKER_SUFFIX_LEN,
};
use crate::crd::Snapshot;
use crate::duration::{format_duration, parse_duration};
use crate::errors::EngineError;
use crate::objectstore::Objectstore;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use kube::api::{ApiResource, DynamicObject, ListParams, TypeMeta, WatchParams};
use kube::core::WatchEvent;
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Watch event kinds the merge step distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EventKind {
    Added,
    Modified,
    Deleted,
}

/// Whether `rv` parses as an integer strictly below `refrv`.
///
/// Non-numeric resource versions never count as older.
pub(crate) fn is_older_resource_version(rv: &str, refrv: &str) -> bool {
    match (rv.parse::<i64>(), refrv.parse::<i64>()) {
        (Ok(a), Ok(b)) => a < b,
        _ => false,
    }
}

/// Whether `rv` parses as an integer strictly above `refrv`.
///
/// Non-numeric resource versions never count as newer.
pub(crate) fn is_newer_resource_version(rv: &str, refrv: &str) -> bool {
    match (rv.parse::<i64>(), refrv.parse::<i64>()) {
        (Ok(a), Ok(b)) => a > b,
        _ => false,
    }
}

/// Whether a resource plural is excluded from snapshots.
pub(crate) fn excluded_resource(plural: &str) -> bool {
    EXCLUDED_RESOURCES.contains(&plural)
}

/// Fill in the type info watch/list payloads omit for items of a known
/// resource.
pub(crate) fn ensure_types(item: &mut DynamicObject, ar: &ApiResource) {
    if item.types.is_none() {
        item.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        });
    }
}

/// Apply one buffered watch event to the listed base set.
///
/// Events at or past the end marker are outside the snapshot window; events
/// older than what the base set already holds lose. Returns the outcome for
/// logging.
pub(crate) fn merge_event(
    base: &mut BTreeMap<String, DynamicObject>,
    index: &ServerResourceIndex,
    kind: EventKind,
    obj: DynamicObject,
    end_rv: &str,
) -> &'static str {
    let Ok(path) = index.resource_path(&obj) else {
        return "ignored, unknown resource path";
    };
    let rv = obj.metadata.resource_version.clone().unwrap_or_default();
    if !is_older_resource_version(&rv, end_rv) {
        return "ignored, not older than end resource version";
    }
    if let Some(stored) = base.get(&path) {
        let stored_rv = stored.metadata.resource_version.clone().unwrap_or_default();
        if is_newer_resource_version(&rv, &stored_rv) {
            match kind {
                EventKind::Added | EventKind::Modified => {
                    base.insert(path, obj);
                    "applied"
                }
                EventKind::Deleted => {
                    base.remove(&path);
                    "deleted"
                }
            }
        } else {
            "ignored, resource version is older than stored"
        }
    } else {
        match kind {
            EventKind::Added | EventKind::Modified => {
                base.insert(path, obj);
                "added"
            }
            EventKind::Deleted => "already deleted",
        }
    }
}

/// Local staging path of a snapshot archive.
#[must_use]
pub fn archive_local_path(snapshot_name: &str) -> PathBuf {
    Path::new(ARCHIVE_TMP_DIR).join(format!("{snapshot_name}.tgz"))
}

/// Take a snapshot of the cluster the spec kubeconfig points at.
///
/// # Errors
///
/// Permanent on authorization failures, retryable otherwise.
pub async fn snapshot(snapshot: &mut Snapshot) -> Result<(), EngineError> {
    let target = build_target_client(&snapshot.spec.kubeconfig)
        .await
        .map_err(EngineError::Retryable)?;
    snapshot_with_client(snapshot, target).await
}

/// Take a snapshot using an already-built target-cluster client.
///
/// # Errors
///
/// Permanent on authorization failures, retryable otherwise.
pub async fn snapshot_with_client(
    snapshot: &mut Snapshot,
    target: Client,
) -> Result<(), EngineError> {
    let name = snapshot.metadata.name.clone().unwrap_or_default();
    info!(snapshot = %name, "Backing up resources");

    let index = ServerResourceIndex::from_cluster(target.clone())
        .await
        .map_err(|e| {
            EngineError::from_api(anyhow!(
                "Get server preferred resources failed : {}",
                e
            ))
        })?;

    let marker_name = format!("{MARKER_NAME_PREFIX}{}", rand_string(MARKER_SUFFIX_LEN));

    // Start resource version
    let marker = config_map_marker(&target, &marker_name)
        .await
        .map_err(|e| {
            EngineError::Retryable(anyhow!("Making start config map marker failed : {}", e))
        })?;
    let start_rv = marker
        .metadata
        .resource_version
        .clone()
        .unwrap_or_default();

    let (tx, mut rx) = mpsc::unbounded_channel::<(ApiResource, WatchEvent<DynamicObject>)>();
    let mut watch_tasks = Vec::new();
    let mut base: BTreeMap<String, DynamicObject> = BTreeMap::new();

    let listed = async {
        for ar in index.resources() {
            if excluded_resource(&ar.plural) {
                continue;
            }

            let api: Api<DynamicObject> = Api::all_with(target.clone(), ar);
            let list = api.list(&ListParams::default()).await.map_err(|e| {
                EngineError::Retryable(anyhow!(
                    "Get resource {} list failed : {}",
                    ar.plural,
                    e
                ))
            })?;
            info!(snapshot = %name, "-- {:3} {}", list.items.len(), ar.plural);

            for mut item in list.items {
                ensure_types(&mut item, ar);
                match index.resource_path(&item) {
                    Ok(path) => {
                        base.insert(path, item);
                    }
                    Err(e) => warn!(snapshot = %name, "skipping listed item: {e}"),
                }
            }

            // Watch from the start marker so every change during the listing
            // phase lands in the event buffer.
            let stream = api
                .watch(&WatchParams::default(), &start_rv)
                .await
                .map_err(|e| {
                    EngineError::Retryable(anyhow!(
                        "Watch resource {} failed : {}",
                        ar.plural,
                        e
                    ))
                })?;
            let tx = tx.clone();
            let watched = ar.clone();
            watch_tasks.push(tokio::spawn(async move {
                debug!("+++ {} watch started", watched.plural);
                let mut stream = stream.boxed();
                while let Some(next) = stream.next().await {
                    match next {
                        Ok(event) => {
                            if tx.send((watched.clone(), event)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!("+++ {} watch error: {e}", watched.plural);
                            break;
                        }
                    }
                }
                debug!("+++ {} watch exiting", watched.plural);
            }));
        }
        Ok::<(), EngineError>(())
    }
    .await;

    // Watches must not outlive this call on any path.
    let stop_watches = |tasks: &[tokio::task::JoinHandle<()>]| {
        for task in tasks {
            task.abort();
        }
    };

    if let Err(e) = listed {
        stop_watches(&watch_tasks);
        return Err(e);
    }

    // End resource version
    let marker = match config_map_marker(&target, &marker_name).await {
        Ok(marker) => marker,
        Err(e) => {
            stop_watches(&watch_tasks);
            return Err(EngineError::Retryable(anyhow!(
                "Making end config map marker failed : {}",
                e
            )));
        }
    };
    let end_rv = marker
        .metadata
        .resource_version
        .clone()
        .unwrap_or_default();
    let marker_timestamp = marker
        .metadata
        .creation_timestamp
        .as_ref()
        .map_or_else(Utc::now, |t| t.0);
    info!(snapshot = %name, "Start resource version : {start_rv}");
    info!(snapshot = %name, "End resource version   : {end_rv}");

    // Stop watches and drain the event buffer; dropping the senders closes
    // the channel, which is the drain barrier.
    stop_watches(&watch_tasks);
    drop(tx);
    let mut events = Vec::new();
    while let Some(tagged) = rx.recv().await {
        events.push(tagged);
    }

    info!(snapshot = %name, "Syncing modified resources: {} events", events.len());
    for (ar, event) in events {
        let (kind, mut obj) = match event {
            WatchEvent::Added(obj) => (EventKind::Added, obj),
            WatchEvent::Modified(obj) => (EventKind::Modified, obj),
            WatchEvent::Deleted(obj) => (EventKind::Deleted, obj),
            WatchEvent::Bookmark(_) | WatchEvent::Error(_) => continue,
        };
        ensure_types(&mut obj, &ar);
        let rv = obj.metadata.resource_version.clone().unwrap_or_default();
        let path = index.resource_path(&obj).unwrap_or_default();
        let message = merge_event(&mut base, &index, kind, obj, &end_rv);
        info!(snapshot = %name, "-- [{kind:?}] rv:{rv} {path} - {message}");
    }

    // Build archive entries and contents
    let mut contents = Vec::with_capacity(base.len());
    let mut entries = Vec::with_capacity(base.len() + 1);
    for item in base.values() {
        let item_path = index
            .archive_path(item)
            .map_err(|e| EngineError::Retryable(anyhow!("{e}")))?;
        let content = serde_json::to_vec(item)
            .map_err(|e| EngineError::Retryable(anyhow!("Marshalling json failed : {}", e)))?;
        entries.push((format!("{name}{item_path}.json"), content));
        contents.push(item_path);
    }
    contents.sort();

    // Status fields as of capture
    let status = snapshot.status.get_or_insert_with(Default::default);
    status.number_of_contents = i32::try_from(contents.len()).unwrap_or(i32::MAX);
    status.contents = contents;
    status.snapshot_resource_version = end_rv;
    status.snapshot_timestamp = Some(marker_timestamp);
    // Expiry derives from the creation timestamp; the reconciler's
    // expiration pass recomputes the same instant and must agree.
    let creation = snapshot
        .metadata
        .creation_timestamp
        .as_ref()
        .map_or(marker_timestamp, |t| t.0);
    if let Some(until) = snapshot.spec.available_until {
        status.available_until = Some(until);
        let ttl = (until - creation).to_std().unwrap_or_default();
        status.ttl = format_duration(ttl);
    } else {
        let ttl_str = snapshot
            .spec
            .ttl
            .clone()
            .unwrap_or_else(|| DEFAULT_SNAPSHOT_TTL.to_string());
        let ttl = parse_duration(&ttl_str)
            .map_err(|e| EngineError::Retryable(anyhow!("Parsing TTL failed : {}", e)))?;
        status.available_until = Some(
            creation
                + chrono::Duration::from_std(ttl)
                    .unwrap_or_else(|_| chrono::Duration::hours(720)),
        );
        status.ttl = ttl_str;
    }

    // snapshot.json carries the resource as of capture, minus identity
    info!(snapshot = %name, "Making snapshot.json");
    let mut snapshot_copy = snapshot.clone();
    snapshot_copy.metadata.resource_version = None;
    snapshot_copy.metadata.uid = None;
    snapshot_copy.metadata.managed_fields = None;
    if let Some(status) = snapshot_copy.status.as_mut() {
        status.phase = String::new();
    }
    let snapshot_resource = serde_json::to_vec(&snapshot_copy)
        .map_err(|e| EngineError::Retryable(anyhow!("Marshalling snapshot.json failed : {}", e)))?;
    entries.push((format!("{name}/snapshot.json"), snapshot_resource));

    write_tgz(&archive_local_path(&name), &entries)
        .map_err(EngineError::Retryable)?;

    Ok(())
}

/// Write a gzip-compressed tar of regular-file members.
///
/// # Errors
///
/// Fails on any file or archive write error.
pub(crate) fn write_tgz(path: &Path, entries: &[(String, Vec<u8>)]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Creating tgz file {} failed", path.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (member, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(ARCHIVE_FILE_MODE);
        header.set_mtime(u64::try_from(Utc::now().timestamp()).unwrap_or(0));
        header.set_cksum();
        builder
            .append_data(&mut header, member, content.as_slice())
            .context("Tar writer writing content failed")?;
    }
    let encoder = builder.into_inner().context("Closing tar writer failed")?;
    encoder.finish().context("Closing gzip writer failed")?;
    Ok(())
}

/// Upload a staged archive and record the stored size/timestamp.
///
/// # Errors
///
/// Permanent when the staged file is gone or the store rejects the
/// credentials/bucket; retryable otherwise. A missing stored object right
/// after upload is retryable.
pub async fn upload_snapshot(
    snapshot: &mut Snapshot,
    bucket: &dyn Objectstore,
) -> Result<(), EngineError> {
    let name = snapshot.metadata.name.clone().unwrap_or_default();
    let object_name = format!("{name}.tgz");
    let local_path = archive_local_path(&name);
    if !local_path.exists() {
        return Err(EngineError::Permanent(anyhow!(
            "Re-opening tgz file failed : {} not found",
            local_path.display()
        )));
    }

    info!(snapshot = %name, "Uploading file {object_name}");
    bucket.upload(&local_path, &object_name).await.map_err(|e| {
        EngineError::from_objectstore(anyhow!("Uploading tgz file failed : {}", e))
    })?;

    let info = bucket.get_object_info(&object_name).await.map_err(|e| {
        EngineError::Retryable(anyhow!("Getting objectstore file info failed : {}", e))
    })?;

    let status = snapshot.status.get_or_insert_with(Default::default);
    status.stored_file_size = info.size;
    status.stored_timestamp = Some(truncate_to_seconds(info.timestamp));
    info!(snapshot = %name, "Upload completed");
    info!(snapshot = %name, "-- resource version : {}", status.snapshot_resource_version);
    info!(snapshot = %name, "-- num resources    : {}", status.number_of_contents);
    info!(snapshot = %name, "-- stored file size : {}", status.stored_file_size);

    if let Err(e) = std::fs::remove_file(&local_path) {
        warn!(snapshot = %name, "could not remove staged archive: {e}");
    }

    Ok(())
}

/// Truncate a timestamp to whole seconds, the precision statuses carry.
#[must_use]
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod snapshot_tests;
