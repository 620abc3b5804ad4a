// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Server-resource index for the target cluster.
//!
//! Discovery output is filtered to the resources a snapshot can both read
//! and later re-create: everything supporting all of list, create, get and
//! delete. The index also resolves an object's **canonical resource path**,
//! used both as the archive layout and as the equality key when merging
//! watch events into listed sets.

use crate::errors::UnknownKind;
use kube::api::{ApiResource, DynamicObject};
use kube::discovery::{verbs, ApiCapabilities, Discovery};
use kube::Client;
use std::collections::HashMap;

/// Verbs a resource must support to be part of a snapshot.
const REQUIRED_VERBS: [&str; 4] = [verbs::LIST, verbs::CREATE, verbs::GET, verbs::DELETE];

/// Whether a discovered resource supports every verb a snapshot needs.
#[must_use]
pub fn supports_snapshot_verbs(caps: &ApiCapabilities) -> bool {
    REQUIRED_VERBS.iter().all(|v| caps.supports_operation(v))
}

/// Index of the target cluster's listable API resources.
pub struct ServerResourceIndex {
    resources: Vec<ApiResource>,
    // (apiVersion, kind) -> plural resource name
    names: HashMap<(String, String), String>,
}

impl ServerResourceIndex {
    /// Build an index from already-discovered resources.
    #[must_use]
    pub fn new(resources: Vec<ApiResource>) -> Self {
        let names = resources
            .iter()
            .map(|ar| {
                (
                    (ar.api_version.clone(), ar.kind.clone()),
                    ar.plural.clone(),
                )
            })
            .collect();
        Self { resources, names }
    }

    /// Run discovery against a cluster and index the snapshot-capable
    /// resources of every group's recommended version.
    ///
    /// # Errors
    ///
    /// Propagates discovery failures (including `Unauthorized`).
    pub async fn from_cluster(client: Client) -> Result<Self, kube::Error> {
        let discovery = Discovery::new(client).run().await?;
        let mut resources = Vec::new();
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                if supports_snapshot_verbs(&caps) {
                    resources.push(ar);
                }
            }
        }
        Ok(Self::new(resources))
    }

    /// The indexed resources.
    #[must_use]
    pub fn resources(&self) -> &[ApiResource] {
        &self.resources
    }

    /// Resolve the plural resource name for an `apiVersion`/`kind` pair.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownKind`] when the pair is not in the index.
    pub fn resource_name(&self, api_version: &str, kind: &str) -> Result<&str, UnknownKind> {
        self.names
            .get(&(api_version.to_string(), kind.to_string()))
            .map(String::as_str)
            .ok_or_else(|| UnknownKind {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            })
    }

    /// Canonical API path of an object:
    /// `/api/v1/...` or `/apis/<group>/<version>/...`, with
    /// `/namespaces/<ns>` for namespaced objects, ending
    /// `/<resourceName>/<name>`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownKind`] when the object's type is missing or not in
    /// the index.
    pub fn resource_path(&self, item: &DynamicObject) -> Result<String, UnknownKind> {
        let (api_version, kind) = item_type(item)?;
        let mut path = if api_version == "v1" {
            "/api/v1".to_string()
        } else {
            format!("/apis/{api_version}")
        };
        if let Some(namespace) = item.metadata.namespace.as_deref() {
            if !namespace.is_empty() {
                path.push_str("/namespaces/");
                path.push_str(namespace);
            }
        }
        let resource_name = self.resource_name(&api_version, &kind)?;
        path.push('/');
        path.push_str(resource_name);
        path.push('/');
        path.push_str(item.metadata.name.as_deref().unwrap_or_default());
        Ok(path)
    }

    /// Archive path of an object. Namespaces and CRDs go at the top level;
    /// everything else at its canonical resource path.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownKind`] as [`Self::resource_path`] does.
    pub fn archive_path(&self, item: &DynamicObject) -> Result<String, UnknownKind> {
        let (_, kind) = item_type(item)?;
        let name = item.metadata.name.as_deref().unwrap_or_default();
        match kind.as_str() {
            "Namespace" => Ok(format!("/namespaces/{name}")),
            "CustomResourceDefinition" => Ok(format!("/crds/{name}")),
            _ => self.resource_path(item),
        }
    }
}

fn item_type(item: &DynamicObject) -> Result<(String, String), UnknownKind> {
    item.types
        .as_ref()
        .map(|t| (t.api_version.clone(), t.kind.clone()))
        .ok_or_else(|| UnknownKind {
            api_version: String::new(),
            kind: String::new(),
        })
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
