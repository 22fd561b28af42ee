// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Object-storage contract for cloud-resident dump files.
//!
//! Dump and restore endpoints may be URIs instead of local paths; the
//! scheme selects the backing client. The pipeline treats any client as an
//! opaque store: list, get a readable stream, put a finished payload.

mod s3;

pub use s3::S3Client;

use anyhow::Result;
use tokio::io::AsyncRead;

use crate::errors::Error;

/// A parsed storage URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUri {
    pub scheme: Scheme,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    S3,
}

/// Whether a dump/restore endpoint refers to an object store.
pub fn is_object_uri(target: &str) -> bool {
    target.contains("://")
}

/// Parse an `s3://bucket/key` style URI. Unknown schemes are an error so a
/// typo'd `s33://` never silently becomes a local file named that way.
pub fn parse_uri(target: &str) -> Result<ObjectUri> {
    let (scheme, rest) = target
        .split_once("://")
        .ok_or_else(|| Error::UnsupportedScheme(target.to_string()))?;

    let scheme = match scheme {
        "s3" => Scheme::S3,
        other => return Err(Error::UnsupportedScheme(other.to_string()).into()),
    };

    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    Ok(ObjectUri {
        scheme,
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

/// The storage contract. One implementation per scheme.
pub trait StorageClient {
    fn list_buckets(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<()>> + Send;
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<Box<dyn AsyncRead + Send + Unpin>>> + Send;
}

/// Build the client for a URI's scheme.
pub async fn client_for(uri: &ObjectUri) -> Result<S3Client> {
    match uri.scheme {
        Scheme::S3 => S3Client::new().await,
    }
}
