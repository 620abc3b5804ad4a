// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Snapshot and restore engines against the target cluster.
//!
//! The target cluster is always reached through the opaque kubeconfig on the
//! Snapshot/Restore spec, never through the controller's own credentials.
//!
//! # Modules
//!
//! - [`resources`] - Discovery-backed server-resource index and canonical paths
//! - [`snapshot`] - List-and-watch-merge snapshot engine and uploader
//! - [`restore`] - Tier-ordered restore engine
//! - [`preference`] - Archive path classification and staging-area indexes
//! - [`pv`] - PV/PVC pairing with bound waiting

pub mod preference;
pub mod pv;
pub mod resources;
pub mod restore;
pub mod snapshot;

use crate::constants::MARKER_NAMESPACE;
use crate::crd::{Restore, RestorePreference, Snapshot};
use crate::errors::EngineError;
use crate::objectstore::Objectstore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use rand::Rng;
use std::path::Path;

/// Cluster-facing operations the reconciler drives.
///
/// A trait so controller tests can substitute a mock cluster.
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// Take a snapshot of the target cluster into `/tmp/<name>.tgz`,
    /// filling the snapshot's status fields.
    async fn snapshot(&self, snapshot: &mut Snapshot) -> Result<(), EngineError>;

    /// Upload the staged archive and record stored size/timestamp.
    async fn upload_snapshot(
        &self,
        snapshot: &mut Snapshot,
        bucket: &dyn Objectstore,
    ) -> Result<(), EngineError>;

    /// Restore a stored snapshot onto the target cluster.
    async fn restore(
        &self,
        restore: &mut Restore,
        pref: &RestorePreference,
        bucket: &dyn Objectstore,
    ) -> Result<(), EngineError>;
}

/// The production [`ClusterOps`] implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterCmd;

impl ClusterCmd {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClusterOps for ClusterCmd {
    async fn snapshot(&self, snapshot: &mut Snapshot) -> Result<(), EngineError> {
        snapshot::snapshot(snapshot).await
    }

    async fn upload_snapshot(
        &self,
        snapshot: &mut Snapshot,
        bucket: &dyn Objectstore,
    ) -> Result<(), EngineError> {
        snapshot::upload_snapshot(snapshot, bucket).await
    }

    async fn restore(
        &self,
        restore: &mut Restore,
        pref: &RestorePreference,
        bucket: &dyn Objectstore,
    ) -> Result<(), EngineError> {
        restore::restore(restore, pref, bucket).await
    }
}

/// Build a client for the target cluster from an in-spec kubeconfig.
///
/// # Errors
///
/// Fails when the kubeconfig is empty, unparsable, or yields no usable
/// client configuration.
pub async fn build_target_client(kubeconfig: &str) -> Result<Client> {
    if kubeconfig.is_empty() {
        return Err(anyhow!("Cannot create Kubeconfig : Kubeconfig not given"));
    }
    let parsed =
        Kubeconfig::from_yaml(kubeconfig).context("Error building kubeconfig")?;
    let config = Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
        .await
        .context("Error building kubeconfig")?;
    let client = Client::try_from(config).context("Error building kubernetes client")?;
    Ok(client)
}

/// Create and delete a ConfigMap to obtain a resource-version marker.
///
/// The returned object's `resourceVersion` is a monotonic token and its
/// `creationTimestamp` the nominal marker time. Any write on the API server
/// advances the resource version, so a create observes a version at or after
/// every earlier write.
///
/// # Errors
///
/// Propagates create/delete failures; a marker whose delete fails is
/// reported rather than silently left behind.
pub async fn config_map_marker(client: &Client, name: &str) -> Result<ConfigMap> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), MARKER_NAMESPACE);
    let marker = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(MARKER_NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        ..ConfigMap::default()
    };
    let created = api.create(&PostParams::default(), &marker).await?;
    api.delete(name, &DeleteParams::default()).await?;
    Ok(created)
}

const MARKER_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase-alphanumeric string for marker names.
#[must_use]
pub fn rand_string(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| MARKER_LETTERS[rng.gen_range(0..MARKER_LETTERS.len())] as char)
        .collect()
}

/// Load an archived object from a staged JSON file.
pub(crate) fn load_item(path: &Path) -> Result<kube::api::DynamicObject> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading staged item {}", path.display()))?;
    let item = serde_json::from_slice(&bytes)
        .with_context(|| format!("decoding staged item {}", path.display()))?;
    Ok(item)
}

/// Fetch a nested JSON map from an unstructured object.
pub(crate) fn get_map<'a>(
    obj: &'a serde_json::Value,
    name: &str,
) -> Option<&'a serde_json::Map<String, serde_json::Value>> {
    obj.get(name)?.as_object()
}

/// Fetch a nested JSON array from an unstructured object.
pub(crate) fn get_slice<'a>(
    obj: &'a serde_json::Value,
    name: &str,
) -> Option<&'a Vec<serde_json::Value>> {
    obj.get(name)?.as_array()
}

/// Fetch a nested JSON string from an unstructured object, "" when absent.
pub(crate) fn get_str<'a>(obj: &'a serde_json::Value, name: &str) -> &'a str {
    obj.get(name).and_then(|v| v.as_str()).unwrap_or("")
}
