// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! S3-backed storage client.
//!
//! Credentials and region come from the standard AWS environment/profile
//! chain; k8db adds nothing on top.

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use tokio::io::AsyncRead;
use tracing::debug;

use super::StorageClient;

#[derive(Clone)]
pub struct S3Client {
    client: aws_sdk_s3::Client,
}

impl S3Client {
    pub async fn new() -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Ok(Self {
            client: aws_sdk_s3::Client::new(&config),
        })
    }
}

impl StorageClient for S3Client {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .context("failed to list buckets")?;
        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name())
            .map(String::from)
            .collect())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .send()
            .await
            .with_context(|| format!("failed to list objects in \"{bucket}\""))?;

        let keys: Vec<String> = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .map(String::from)
            .collect();
        debug!(bucket, prefix, count = keys.len(), "listed objects");
        Ok(keys)
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        debug!(bucket, key, bytes = data.len(), "uploading object");
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("failed to upload s3://{bucket}/{key}"))?;
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to fetch s3://{bucket}/{key}"))?;
        Ok(Box::new(response.body.into_async_read()))
    }
}
