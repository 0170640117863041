// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # S3-Compatible Storage
//!
//! `StorageBackend` over `aws-sdk-s3`, usable against AWS or any
//! S3-compatible endpoint (MinIO, R2) via a custom endpoint URL.
//!
//! Multipart: uploads whose chunk size meets the S3 minimum part size run as
//! one multipart object keyed by the upload id; smaller chunk sizes fall
//! back to per-chunk objects, which is always legal. Service errors are
//! classified into the transient/permanent split the worker pool retries on.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use adaptive_transfer_domain::{ByteStream, StorageBackend, TransferError};

use crate::infrastructure::config::StorageSettings;

/// S3 parts must be at least 5 MB except the last one.
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// S3-compatible blob storage.
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Builds a client from the storage settings. Static credentials are
    /// used when configured; otherwise the default provider chain applies.
    pub async fn new(settings: &StorageSettings) -> Result<Self, TransferError> {
        if settings.bucket.trim().is_empty() {
            return Err(TransferError::validation("s3 bucket name cannot be empty"));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&settings.access_key_id, &settings.secret_access_key) {
            let credentials = Credentials::new(access_key.clone(), secret_key.clone(), None, None, "transfer-config");
            loader = loader.credentials_provider(credentials);
        }
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let aws_config = loader.load().await;
        Ok(Self {
            client: Client::new(&aws_config),
            bucket: settings.bucket.clone(),
        })
    }

    fn transient(context: &str, message: impl std::fmt::Display) -> TransferError {
        TransferError::transient_storage(format!("{}: {}", context, message))
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<Option<String>, TransferError> {
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(data.to_vec().into())
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|e| Self::transient("put object", aws_sdk_s3::error::DisplayErrorContext(&e)))?;

        debug!(key, "wrote blob to s3");
        Ok(output.e_tag().map(|etag| etag.trim_matches('"').to_string()))
    }

    async fn get(&self, key: &str, offset: u64, length: Option<u64>) -> Result<ByteStream, TransferError> {
        let range = match length {
            Some(0) => return Ok(Box::pin(futures::stream::empty())),
            Some(len) => format!("bytes={}-{}", offset, offset + len - 1),
            None => format!("bytes={}-", offset),
        };

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(range)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let is_missing = e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false);
                return Err(if is_missing {
                    TransferError::permanent_storage(format!("blob '{}' is missing", key))
                } else {
                    Self::transient("get object", aws_sdk_s3::error::DisplayErrorContext(&e))
                });
            }
        };

        let reader = output.body.into_async_read();
        let stream = ReaderStream::new(reader).map(|item| item.map_err(TransferError::from));
        Ok(Box::pin(stream))
    }

    async fn delete(&self, key: &str) -> Result<(), TransferError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::transient("delete object", aws_sdk_s3::error::DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Option<Vec<String>>, TransferError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token.clone());
            }
            let output = request
                .send()
                .await
                .map_err(|e| Self::transient("list objects", aws_sdk_s3::error::DisplayErrorContext(&e)))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(Some(keys))
    }

    async fn begin_multipart(&self, logical_key: &str, chunk_size: u64) -> Result<Option<String>, TransferError> {
        // Parts below the S3 minimum would be rejected at commit; those
        // uploads use per-chunk objects instead.
        if chunk_size < MIN_PART_SIZE {
            return Ok(None);
        }

        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(logical_key)
            .send()
            .await
            .map_err(|e| Self::transient("create multipart upload", aws_sdk_s3::error::DisplayErrorContext(&e)))?;

        match output.upload_id() {
            Some(handle) => {
                debug!(key = logical_key, handle, "opened multipart upload");
                Ok(Some(handle.to_string()))
            }
            None => Err(TransferError::permanent_storage("backend returned no multipart upload id")),
        }
    }

    async fn put_part(
        &self,
        handle: &str,
        logical_key: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String, TransferError> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(logical_key)
            .upload_id(handle)
            .part_number(part_number as i32)
            .body(data.to_vec().into())
            .send()
            .await
            .map_err(|e| Self::transient("upload part", aws_sdk_s3::error::DisplayErrorContext(&e)))?;

        output
            .e_tag()
            .map(|etag| etag.trim_matches('"').to_string())
            .ok_or_else(|| TransferError::permanent_storage("backend returned no part etag"))
    }

    async fn commit_multipart(
        &self,
        handle: &str,
        logical_key: &str,
        parts: &[(u32, String)],
    ) -> Result<Option<String>, TransferError> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|(number, etag)| {
                CompletedPart::builder()
                    .part_number(*number as i32)
                    .e_tag(etag.clone())
                    .build()
            })
            .collect();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(logical_key)
            .upload_id(handle)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| Self::transient("complete multipart upload", aws_sdk_s3::error::DisplayErrorContext(&e)))?;

        debug!(key = logical_key, handle, "committed multipart upload");
        Ok(output.e_tag().map(|etag| etag.trim_matches('"').to_string()))
    }

    async fn abort_multipart(&self, handle: &str, logical_key: &str) -> Result<(), TransferError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(logical_key)
            .upload_id(handle)
            .send()
            .await
            .map_err(|e| Self::transient("abort multipart upload", aws_sdk_s3::error::DisplayErrorContext(&e)))?;
        Ok(())
    }
}
