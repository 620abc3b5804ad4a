// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Object store abstraction.
//!
//! Snapshot archives live in an S3-compatible bucket behind the
//! [`Objectstore`] trait: upload, download, delete, info and listing. The
//! concrete implementation is [`bucket::Bucket`]; tests substitute their own
//! trait impls.
//!
//! Bucket resolution is indirect: a Snapshot/Restore names an
//! `ObjectstoreConfig`, which names a credential Secret. [`get_bucket`]
//! follows both references under a read-only view; nothing is cached across
//! reconciliations.

pub mod bucket;

use crate::crd::ObjectstoreConfig;
use crate::errors::kube_error_message;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::path::Path;
use std::sync::Arc;

pub use bucket::Bucket;

/// Info of one stored archive object.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    /// Object key, `<snapshot name>.tgz`.
    pub name: String,
    /// Size in bytes.
    pub size: i64,
    /// Last-modified timestamp the store reports.
    pub timestamp: DateTime<Utc>,
    /// Name of the `ObjectstoreConfig` whose bucket holds the object.
    pub bucket_config_name: String,
}

/// Operations every object store backing must provide.
#[async_trait]
pub trait Objectstore: Send + Sync {
    /// Whether the configured bucket exists.
    async fn chk_bucket(&self) -> Result<bool>;

    /// Create the configured bucket.
    async fn create_bucket(&self) -> Result<()>;

    /// Upload the file at `path` as object `name`.
    async fn upload(&self, path: &Path, name: &str) -> Result<()>;

    /// Download object `name` into the file at `path`.
    async fn download(&self, path: &Path, name: &str) -> Result<()>;

    /// Delete object `name`.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Size and timestamp of object `name`.
    async fn get_object_info(&self, name: &str) -> Result<ObjectInfo>;

    /// Info of every object in the bucket.
    async fn list_object_info(&self) -> Result<Vec<ObjectInfo>>;

    /// Name of the `ObjectstoreConfig` this bucket was built from.
    fn config_name(&self) -> &str;

    /// Endpoint URL.
    fn endpoint(&self) -> &str;

    /// Bucket name.
    fn bucket_name(&self) -> &str;
}

/// Resolves an `ObjectstoreConfig` name to a ready [`Objectstore`].
///
/// A trait so tests can inject a mock without a control plane.
#[async_trait]
pub trait BucketFactory: Send + Sync {
    async fn get_bucket(
        &self,
        client: &Client,
        namespace: &str,
        config_name: &str,
        insecure: bool,
    ) -> Result<Arc<dyn Objectstore>>;
}

/// Default factory reading `ObjectstoreConfig` + Secret from the cluster.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultBucketFactory;

#[async_trait]
impl BucketFactory for DefaultBucketFactory {
    async fn get_bucket(
        &self,
        client: &Client,
        namespace: &str,
        config_name: &str,
        insecure: bool,
    ) -> Result<Arc<dyn Objectstore>> {
        let bucket = get_bucket(client, namespace, config_name, insecure).await?;
        Ok(Arc::new(bucket))
    }
}

/// Follow an `ObjectstoreConfig` and its credential Secret to build a
/// [`Bucket`].
///
/// # Errors
///
/// Fails with the API server's message verbatim when the config or the
/// secret is missing, and when the secret lacks `accesskey`/`secretkey`.
pub async fn get_bucket(
    client: &Client,
    namespace: &str,
    config_name: &str,
    insecure: bool,
) -> Result<Bucket> {
    let configs: Api<ObjectstoreConfig> = Api::namespaced(client.clone(), namespace);
    let config = configs
        .get(config_name)
        .await
        .map_err(|e| anyhow!(kube_error_message(&e)))?;

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets
        .get(&config.spec.cloud_credential_secret)
        .await
        .map_err(|e| anyhow!(kube_error_message(&e)))?;

    let access_key = secret_value(&secret, "accesskey").with_context(|| {
        format!(
            "secret \"{}\" has no accesskey",
            config.spec.cloud_credential_secret
        )
    })?;
    let secret_key = secret_value(&secret, "secretkey").with_context(|| {
        format!(
            "secret \"{}\" has no secretkey",
            config.spec.cloud_credential_secret
        )
    })?;

    Ok(Bucket::new(
        config_name,
        &access_key,
        &secret_key,
        &config.spec.endpoint,
        &config.spec.region,
        &config.spec.bucket,
        insecure,
    ))
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
}
