// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! S3 bucket implementation of the [`Objectstore`] trait.
//!
//! Talks to any S3-compatible store (AWS, MinIO, Cloudian, ...) with static
//! credentials, a custom endpoint and path-style addressing.

use super::{ObjectInfo, Objectstore};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{info, warn};

/// Connection to one bucket in an S3-compatible object store.
#[derive(Clone)]
pub struct Bucket {
    /// Name of the `ObjectstoreConfig` this bucket was built from.
    name: String,
    access_key: String,
    secret_key: String,
    endpoint: String,
    region: String,
    bucket_name: String,
    insecure: bool,
}

impl Bucket {
    /// Build a new bucket connection. No network traffic happens here.
    #[must_use]
    pub fn new(
        name: &str,
        access_key: &str,
        secret_key: &str,
        endpoint: &str,
        region: &str,
        bucket_name: &str,
        insecure: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            endpoint: endpoint.to_string(),
            region: region.to_string(),
            bucket_name: bucket_name.to_string(),
            insecure,
        }
    }

    /// Build an S3 client for this bucket's endpoint and credentials.
    ///
    /// `insecure` permits plain-HTTP endpoints (self-hosted stores); with an
    /// HTTPS endpoint certificate verification always applies.
    fn client(&self) -> aws_sdk_s3::Client {
        if self.insecure && self.endpoint.starts_with("https://") {
            warn!(
                endpoint = %self.endpoint,
                "insecure requested but endpoint is HTTPS; certificate verification stays on"
            );
        }
        let credentials = Credentials::new(
            self.access_key.clone(),
            self.secret_key.clone(),
            None,
            None,
            "objectstore-config",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .endpoint_url(self.endpoint.clone())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        aws_sdk_s3::Client::from_conf(config)
    }

    fn object_info_from(&self, key: &str, size: Option<i64>, modified: Option<i64>) -> ObjectInfo {
        let timestamp = modified
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_default();
        ObjectInfo {
            name: key.to_string(),
            size: size.unwrap_or(0),
            timestamp,
            bucket_config_name: self.name.clone(),
        }
    }
}

/// Render an SDK error with its full context chain, so service error codes
/// like `SignatureDoesNotMatch` stay visible to the permanence classifier.
fn sdk_error<E>(err: E) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    anyhow!("{}", DisplayErrorContext(&err))
}

#[async_trait]
impl Objectstore for Bucket {
    async fn chk_bucket(&self) -> Result<bool> {
        let client = self.client();
        let result = client.list_buckets().send().await.map_err(sdk_error)?;
        info!("Buckets:");
        let mut found = false;
        for bucket in result.buckets() {
            let name = bucket.name().unwrap_or_default();
            info!("-- {name}");
            if name == self.bucket_name {
                found = true;
            }
        }
        Ok(found)
    }

    async fn create_bucket(&self) -> Result<()> {
        let client = self.client();
        client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn upload(&self, path: &Path, name: &str) -> Result<()> {
        let client = self.client();
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("reading {} for upload", path.display()))?;
        client
            .put_object()
            .bucket(&self.bucket_name)
            .key(name)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Error uploading {} to bucket {} : {}",
                    name,
                    self.bucket_name,
                    DisplayErrorContext(&e)
                )
            })?;
        Ok(())
    }

    async fn download(&self, path: &Path, name: &str) -> Result<()> {
        let client = self.client();
        let result = client
            .get_object()
            .bucket(&self.bucket_name)
            .key(name)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Error downloading {} from bucket {} : {}",
                    name,
                    self.bucket_name,
                    DisplayErrorContext(&e)
                )
            })?;
        let bytes = result
            .body
            .collect()
            .await
            .with_context(|| format!("reading body of {name}"))?
            .into_bytes();
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let client = self.client();
        client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(name)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Error deleting {} from bucket {} : {}",
                    name,
                    self.bucket_name,
                    DisplayErrorContext(&e)
                )
            })?;

        // Deletion is eventually consistent on some stores; confirm the key
        // is gone before reporting success.
        for _ in 0..10 {
            let listed = client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(name)
                .send()
                .await
                .map_err(sdk_error)?;
            if !listed.contents().iter().any(|o| o.key() == Some(name)) {
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
        bail!("Object {} still listed after delete", name)
    }

    async fn get_object_info(&self, name: &str) -> Result<ObjectInfo> {
        let client = self.client();
        let result = client
            .list_objects_v2()
            .bucket(&self.bucket_name)
            .prefix(name)
            .send()
            .await
            .map_err(sdk_error)?;
        for obj in result.contents() {
            if obj.key() == Some(name) {
                return Ok(self.object_info_from(
                    name,
                    obj.size(),
                    obj.last_modified().map(aws_sdk_s3::primitives::DateTime::secs),
                ));
            }
        }
        bail!("Object {} not found in bucket {}", name, self.bucket_name)
    }

    async fn list_object_info(&self) -> Result<Vec<ObjectInfo>> {
        let client = self.client();
        let mut infos = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = client.list_objects_v2().bucket(&self.bucket_name);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }
            let result = request.send().await.map_err(sdk_error)?;
            for obj in result.contents() {
                infos.push(self.object_info_from(
                    obj.key().unwrap_or_default(),
                    obj.size(),
                    obj.last_modified().map(aws_sdk_s3::primitives::DateTime::secs),
                ));
            }
            match result.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(infos)
    }

    fn config_name(&self) -> &str {
        &self.name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn bucket_name(&self) -> &str {
        &self.bucket_name
    }
}

#[cfg(test)]
#[path = "bucket_tests.rs"]
mod bucket_tests;
