// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the Snapshot and Restore controllers.
//!
//! Both controllers receive an `Arc<Context>` carrying the control-plane
//! client, the watched namespace, the tunables, and the two injectable
//! collaborators: the cluster engine and the bucket factory. Tests swap the
//! collaborators for mocks.

use crate::cluster::ClusterOps;
use crate::objectstore::{BucketFactory, Objectstore};
use anyhow::Result;
use kube::Client;
use std::sync::Arc;

/// Shared context passed to both controllers and the syncer.
#[derive(Clone)]
pub struct Context {
    /// Control-plane client (the cluster the CRDs live in).
    pub client: Client,

    /// Namespace the controller accepts resources from.
    pub namespace: String,

    /// Snapshot/restore engine against target clusters.
    pub cluster: Arc<dyn ClusterOps>,

    /// Resolves `ObjectstoreConfig` names to ready buckets.
    pub bucket_factory: Arc<dyn BucketFactory>,

    /// Retry budget for one snapshot/restore operation, in minutes.
    pub max_retry_min: u64,

    /// Permit plain-HTTP object-store endpoints.
    pub insecure: bool,
}

impl Context {
    /// Resolve the bucket behind an `ObjectstoreConfig` name.
    ///
    /// # Errors
    ///
    /// Propagates config/secret resolution failures with the API server's
    /// message verbatim.
    pub async fn get_bucket(&self, config_name: &str) -> Result<Arc<dyn Objectstore>> {
        self.bucket_factory
            .get_bucket(&self.client, &self.namespace, config_name, self.insecure)
            .await
    }
}
