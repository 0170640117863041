// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Local Filesystem Storage
//!
//! `StorageBackend` over a root directory. Blob keys map directly to
//! relative paths (`<upload_id>/<chunk_index>`); writes go through a
//! temporary sibling and an atomic rename, which also makes repeated `put`s
//! of the same bytes idempotent. No multipart support: chunks stay
//! individual files and downloads assemble across them.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio_util::io::ReaderStream;
use tracing::debug;

use adaptive_transfer_domain::{ByteStream, StorageBackend, TransferError};

/// Filesystem-backed blob storage rooted at one directory.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Creates the backend, making sure the root directory exists.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| TransferError::permanent_storage(format!("cannot create storage root {}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a blob key to a path, refusing anything that would escape
    /// the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, TransferError> {
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
            return Err(TransferError::validation(format!("invalid storage key '{}'", key)));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<Option<String>, TransferError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write-then-rename keeps readers away from partial blobs.
        let tmp = path.with_extension("part");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;

        debug!(key, bytes = data.len(), "wrote blob");
        Ok(None)
    }

    async fn get(&self, key: &str, offset: u64, length: Option<u64>) -> Result<ByteStream, TransferError> {
        let path = self.resolve(key)?;
        let mut file = match fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::permanent_storage(format!("blob '{}' is missing", key)));
            }
            Err(e) => return Err(e.into()),
        };

        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }

        let reader = match length {
            Some(len) => file.take(len),
            None => file.take(u64::MAX),
        };

        let stream = ReaderStream::new(reader).map(|item| item.map_err(TransferError::from));
        Ok(Box::pin(stream))
    }

    async fn delete(&self, key: &str) -> Result<(), TransferError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Option<Vec<String>>, TransferError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if path.extension().map(|ext| ext == "part").unwrap_or(false) {
                    // staged writes are not blobs
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    let key = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(Some(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            out.extend_from_slice(&item.unwrap());
        }
        out
    }

    async fn backend() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (_dir, storage) = backend().await;
        storage.put("u1/0", Bytes::from_static(b"0123456789")).await.unwrap();

        let body = collect(storage.get("u1/0", 0, None).await.unwrap()).await;
        assert_eq!(body, b"0123456789");
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let (_dir, storage) = backend().await;
        storage.put("u1/0", Bytes::from_static(b"abcd")).await.unwrap();
        storage.put("u1/0", Bytes::from_static(b"abcd")).await.unwrap();
        let body = collect(storage.get("u1/0", 0, None).await.unwrap()).await;
        assert_eq!(body, b"abcd");
    }

    #[tokio::test]
    async fn test_ranged_get() {
        let (_dir, storage) = backend().await;
        storage.put("u1/0", Bytes::from_static(b"0123456789")).await.unwrap();

        let body = collect(storage.get("u1/0", 2, Some(6)).await.unwrap()).await;
        assert_eq!(body, b"234567");

        let tail = collect(storage.get("u1/0", 8, None).await.unwrap()).await;
        assert_eq!(tail, b"89");
    }

    #[tokio::test]
    async fn test_missing_blob_is_permanent() {
        let (_dir, storage) = backend().await;
        let err = storage.get("u1/404", 0, None).await.err().unwrap();
        assert!(matches!(err, TransferError::PermanentStorage(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, storage) = backend().await;
        storage.put("u1/0", Bytes::from_static(b"x")).await.unwrap();
        storage.delete("u1/0").await.unwrap();
        storage.delete("u1/0").await.unwrap();
        assert!(storage.get("u1/0", 0, None).await.is_err());
    }

    #[tokio::test]
    async fn test_list_keys() {
        let (_dir, storage) = backend().await;
        storage.put("u1/0", Bytes::from_static(b"a")).await.unwrap();
        storage.put("u1/1", Bytes::from_static(b"b")).await.unwrap();
        storage.put("u2/0", Bytes::from_static(b"c")).await.unwrap();

        let all = storage.list_keys("").await.unwrap().unwrap();
        assert_eq!(all, vec!["u1/0", "u1/1", "u2/0"]);

        let scoped = storage.list_keys("u1/").await.unwrap().unwrap();
        assert_eq!(scoped, vec!["u1/0", "u1/1"]);
    }

    #[tokio::test]
    async fn test_traversal_keys_are_rejected() {
        let (_dir, storage) = backend().await;
        for key in ["../evil", "a/../../b", "", "/abs"] {
            assert!(storage.put(key, Bytes::from_static(b"x")).await.is_err(), "{}", key);
        }
    }
}
