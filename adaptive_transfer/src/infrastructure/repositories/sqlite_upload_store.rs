// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Upload Store
//!
//! `UploadStore` implementation over SQLite. Status transitions are
//! conditional `UPDATE`s (CAS), chunk rows are claimed through an
//! update-then-insert sequence guarded by the `(upload_id, chunk_index)`
//! primary key, and the complete check shares a transaction with the CAS to
//! `COMPLETED` so contending completes serialize in the database.
//!
//! Timestamps are stored as RFC 3339 UTC text, which also sorts
//! lexicographically for the stale-upload sweep.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use adaptive_transfer_domain::{
    ChunkClaim, ChunkRecord, ChunkSize, ChunkStatus, CompleteOutcome, Sha256Digest, TransferError, Upload, UploadId,
    UploadStatus, UploadStore,
};

/// SQLite-backed metadata store for uploads and chunks.
#[derive(Clone)]
pub struct SqliteUploadStore {
    pool: SqlitePool,
}

impl SqliteUploadStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn db_err(context: &str, e: sqlx::Error) -> TransferError {
        TransferError::database(format!("{}: {}", context, e))
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TransferError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| TransferError::database(format!("corrupt timestamp '{}': {}", raw, e)))
    }

    fn upload_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Upload, TransferError> {
        let id = UploadId::parse(&row.try_get::<String, _>("upload_id").map_err(|e| Self::db_err("read upload_id", e))?)?;
        let checksum = row
            .try_get::<Option<String>, _>("file_checksum")
            .map_err(|e| Self::db_err("read file_checksum", e))?
            .map(|hex| Sha256Digest::from_hex(&hex))
            .transpose()?;
        let status = UploadStatus::parse(&row.try_get::<String, _>("status").map_err(|e| Self::db_err("read status", e))?)?;

        Ok(Upload::restore(
            id,
            row.try_get("owner").map_err(|e| Self::db_err("read owner", e))?,
            row.try_get("file_name").map_err(|e| Self::db_err("read file_name", e))?,
            row.try_get::<i64, _>("file_size").map_err(|e| Self::db_err("read file_size", e))? as u64,
            ChunkSize::new(row.try_get::<i64, _>("chunk_size").map_err(|e| Self::db_err("read chunk_size", e))? as u64)?,
            row.try_get::<i64, _>("total_chunks").map_err(|e| Self::db_err("read total_chunks", e))? as u64,
            checksum,
            status,
            row.try_get("multipart_handle").map_err(|e| Self::db_err("read multipart_handle", e))?,
            row.try_get("storage_key").map_err(|e| Self::db_err("read storage_key", e))?,
            Self::parse_timestamp(&row.try_get::<String, _>("created_at").map_err(|e| Self::db_err("read created_at", e))?)?,
            Self::parse_timestamp(&row.try_get::<String, _>("updated_at").map_err(|e| Self::db_err("read updated_at", e))?)?,
        ))
    }

    fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChunkRecord, TransferError> {
        let checksum = row
            .try_get::<Option<String>, _>("checksum")
            .map_err(|e| Self::db_err("read checksum", e))?
            .map(|hex| Sha256Digest::from_hex(&hex))
            .transpose()?;

        Ok(ChunkRecord {
            upload_id: UploadId::parse(
                &row.try_get::<String, _>("upload_id").map_err(|e| Self::db_err("read upload_id", e))?,
            )?,
            chunk_index: row.try_get::<i64, _>("chunk_index").map_err(|e| Self::db_err("read chunk_index", e))? as u64,
            size_bytes: row.try_get::<i64, _>("size_bytes").map_err(|e| Self::db_err("read size_bytes", e))? as u64,
            checksum,
            storage_key: row.try_get("storage_key").map_err(|e| Self::db_err("read storage_key", e))?,
            storage_etag: row.try_get("storage_etag").map_err(|e| Self::db_err("read storage_etag", e))?,
            status: ChunkStatus::parse(&row.try_get::<String, _>("status").map_err(|e| Self::db_err("read status", e))?)?,
            retry_count: row.try_get::<i64, _>("retry_count").map_err(|e| Self::db_err("read retry_count", e))? as u32,
            created_at: Self::parse_timestamp(
                &row.try_get::<String, _>("created_at").map_err(|e| Self::db_err("read created_at", e))?,
            )?,
            updated_at: Self::parse_timestamp(
                &row.try_get::<String, _>("updated_at").map_err(|e| Self::db_err("read updated_at", e))?,
            )?,
        })
    }

    fn status_placeholders(statuses: &[UploadStatus]) -> String {
        statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
    }
}

#[async_trait]
impl UploadStore for SqliteUploadStore {
    async fn insert_upload(&self, upload: &Upload) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            INSERT INTO uploads
                (upload_id, owner, file_name, file_size, chunk_size, total_chunks,
                 file_checksum, status, multipart_handle, storage_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(upload.id().to_string())
        .bind(upload.owner())
        .bind(upload.file_name())
        .bind(upload.file_size() as i64)
        .bind(upload.chunk_size().bytes() as i64)
        .bind(upload.total_chunks() as i64)
        .bind(upload.file_checksum().map(|c| c.to_hex()))
        .bind(upload.status().as_str())
        .bind(upload.multipart_handle())
        .bind(upload.storage_key())
        .bind(upload.created_at().to_rfc3339())
        .bind(upload.updated_at().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("insert upload", e))?;
        Ok(())
    }

    async fn find_upload(&self, id: UploadId) -> Result<Option<Upload>, TransferError> {
        let row = sqlx::query("SELECT * FROM uploads WHERE upload_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_err("find upload", e))?;

        row.as_ref().map(Self::upload_from_row).transpose()
    }

    async fn cas_upload_status(
        &self,
        id: UploadId,
        from: &[UploadStatus],
        to: UploadStatus,
    ) -> Result<bool, TransferError> {
        if from.is_empty() {
            return Ok(false);
        }
        let query = format!(
            "UPDATE uploads SET status = ?, updated_at = ? WHERE upload_id = ? AND status IN ({})",
            Self::status_placeholders(from)
        );
        let mut q = sqlx::query(&query)
            .bind(to.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string());
        for status in from {
            q = q.bind(status.as_str());
        }
        let result = q
            .execute(&self.pool)
            .await
            .map_err(|e| Self::db_err("cas upload status", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_multipart_handle(&self, id: UploadId, handle: &str) -> Result<(), TransferError> {
        sqlx::query("UPDATE uploads SET multipart_handle = ?, updated_at = ? WHERE upload_id = ?")
            .bind(handle)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Self::db_err("set multipart handle", e))?;
        Ok(())
    }

    async fn set_storage_key(&self, id: UploadId, key: &str) -> Result<(), TransferError> {
        sqlx::query("UPDATE uploads SET storage_key = ?, updated_at = ? WHERE upload_id = ?")
            .bind(key)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Self::db_err("set storage key", e))?;
        Ok(())
    }

    async fn claim_chunk(
        &self,
        upload_id: UploadId,
        chunk_index: u64,
        storage_key: &str,
        retry_count: u32,
    ) -> Result<ChunkClaim, TransferError> {
        let now = Utc::now().to_rfc3339();
        let id_str = upload_id.to_string();

        // Re-claim an existing PENDING/FAILED row.
        let updated = sqlx::query(
            r#"
            UPDATE chunks SET status = 'UPLOADING', retry_count = ?, updated_at = ?
            WHERE upload_id = ? AND chunk_index = ? AND status IN ('PENDING', 'FAILED')
            "#,
        )
        .bind(retry_count as i64)
        .bind(&now)
        .bind(&id_str)
        .bind(chunk_index as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("claim chunk (update)", e))?;
        if updated.rows_affected() == 1 {
            return Ok(ChunkClaim::Claimed);
        }

        // First sight of this index: the primary key arbitrates racing
        // inserts.
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO chunks
                (upload_id, chunk_index, size_bytes, checksum, storage_key, storage_etag,
                 status, retry_count, created_at, updated_at)
            VALUES (?, ?, 0, NULL, ?, NULL, 'UPLOADING', ?, ?, ?)
            "#,
        )
        .bind(&id_str)
        .bind(chunk_index as i64)
        .bind(storage_key)
        .bind(retry_count as i64)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("claim chunk (insert)", e))?;
        if inserted.rows_affected() == 1 {
            return Ok(ChunkClaim::Claimed);
        }

        // The row exists and is not claimable: report what holds it.
        let row = sqlx::query("SELECT status, checksum FROM chunks WHERE upload_id = ? AND chunk_index = ?")
            .bind(&id_str)
            .bind(chunk_index as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_err("claim chunk (inspect)", e))?;

        match row {
            Some(row) => {
                let status = ChunkStatus::parse(&row.try_get::<String, _>("status").map_err(|e| Self::db_err("read status", e))?)?;
                match status {
                    ChunkStatus::Uploaded => {
                        let checksum = row
                            .try_get::<Option<String>, _>("checksum")
                            .map_err(|e| Self::db_err("read checksum", e))?
                            .map(|hex| Sha256Digest::from_hex(&hex))
                            .transpose()?;
                        Ok(ChunkClaim::AlreadyUploaded { checksum })
                    }
                    _ => Ok(ChunkClaim::InFlight),
                }
            }
            // Deleted between our probes (upload abort); the caller will
            // re-check the upload status.
            None => Ok(ChunkClaim::InFlight),
        }
    }

    async fn finish_chunk(
        &self,
        upload_id: UploadId,
        chunk_index: u64,
        size_bytes: u64,
        checksum: Option<&Sha256Digest>,
        storage_etag: Option<&str>,
    ) -> Result<(), TransferError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE chunks SET status = 'UPLOADED', size_bytes = ?, checksum = ?, storage_etag = ?, updated_at = ?
            WHERE upload_id = ? AND chunk_index = ? AND status = 'UPLOADING'
            "#,
        )
        .bind(size_bytes as i64)
        .bind(checksum.map(|c| c.to_hex()))
        .bind(storage_etag)
        .bind(&now)
        .bind(upload_id.to_string())
        .bind(chunk_index as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("finish chunk", e))?;

        if result.rows_affected() != 1 {
            return Err(TransferError::database(format!(
                "chunk {}/{} was not in UPLOADING at finish",
                upload_id, chunk_index
            )));
        }

        // Keep the upload out of the stale sweep while chunks land.
        self.touch_upload(upload_id).await
    }

    async fn fail_chunk(&self, upload_id: UploadId, chunk_index: u64, retry_count: u32) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            UPDATE chunks SET status = 'FAILED', retry_count = ?, updated_at = ?
            WHERE upload_id = ? AND chunk_index = ? AND status = 'UPLOADING'
            "#,
        )
        .bind(retry_count as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(upload_id.to_string())
        .bind(chunk_index as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("fail chunk", e))?;
        Ok(())
    }

    async fn uploaded_chunks(&self, upload_id: UploadId) -> Result<Vec<ChunkRecord>, TransferError> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE upload_id = ? AND status = 'UPLOADED' ORDER BY chunk_index")
            .bind(upload_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_err("list uploaded chunks", e))?;
        rows.iter().map(Self::chunk_from_row).collect()
    }

    async fn all_chunks(&self, upload_id: UploadId) -> Result<Vec<ChunkRecord>, TransferError> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE upload_id = ? ORDER BY chunk_index")
            .bind(upload_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_err("list chunks", e))?;
        rows.iter().map(Self::chunk_from_row).collect()
    }

    async fn missing_chunk_indices(&self, upload_id: UploadId, total_chunks: u64) -> Result<Vec<u64>, TransferError> {
        let rows = sqlx::query(
            "SELECT chunk_index FROM chunks WHERE upload_id = ? AND status = 'UPLOADED' ORDER BY chunk_index",
        )
        .bind(upload_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("list uploaded indices", e))?;

        let mut uploaded = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("chunk_index").map(|i| i as u64))
            .collect::<Result<Vec<u64>, _>>()
            .map_err(|e| Self::db_err("read chunk_index", e))?
            .into_iter()
            .peekable();

        let mut missing = Vec::new();
        for index in 0..total_chunks {
            match uploaded.peek() {
                Some(&next) if next == index => {
                    uploaded.next();
                }
                _ => missing.push(index),
            }
        }
        Ok(missing)
    }

    async fn complete_upload(&self, id: UploadId, total_chunks: u64) -> Result<CompleteOutcome, TransferError> {
        let mut tx = self.pool.begin().await.map_err(|e| Self::db_err("begin complete tx", e))?;
        let id_str = id.to_string();

        let status_row = sqlx::query("SELECT status FROM uploads WHERE upload_id = ?")
            .bind(&id_str)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| Self::db_err("read upload status", e))?;
        let status = match status_row {
            Some(row) => UploadStatus::parse(&row.try_get::<String, _>("status").map_err(|e| Self::db_err("read status", e))?)?,
            None => return Err(TransferError::not_found(format!("upload {}", id))),
        };
        if status.is_terminal() {
            tx.rollback().await.ok();
            return Ok(CompleteOutcome::AlreadyTerminal(status));
        }

        let uploaded_rows = sqlx::query(
            "SELECT chunk_index FROM chunks WHERE upload_id = ? AND status = 'UPLOADED' ORDER BY chunk_index",
        )
        .bind(&id_str)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| Self::db_err("count uploaded chunks", e))?;

        if (uploaded_rows.len() as u64) < total_chunks {
            let mut uploaded = uploaded_rows
                .iter()
                .map(|row| row.try_get::<i64, _>("chunk_index").map(|i| i as u64))
                .collect::<Result<Vec<u64>, _>>()
                .map_err(|e| Self::db_err("read chunk_index", e))?
                .into_iter()
                .peekable();
            let mut missing = Vec::new();
            for index in 0..total_chunks {
                match uploaded.peek() {
                    Some(&next) if next == index => {
                        uploaded.next();
                    }
                    _ => missing.push(index),
                }
            }
            tx.rollback().await.ok();
            return Ok(CompleteOutcome::MissingChunks(missing));
        }

        let result = sqlx::query(
            "UPDATE uploads SET status = 'COMPLETED', updated_at = ? WHERE upload_id = ? AND status IN ('INITIATED', 'IN_PROGRESS')",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&id_str)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::db_err("cas to COMPLETED", e))?;

        tx.commit().await.map_err(|e| Self::db_err("commit complete tx", e))?;

        if result.rows_affected() == 1 {
            Ok(CompleteOutcome::Completed)
        } else {
            // A contending complete won between our read and the CAS.
            let status = self
                .find_upload(id)
                .await?
                .map(|u| u.status())
                .unwrap_or(UploadStatus::Aborted);
            Ok(CompleteOutcome::AlreadyTerminal(status))
        }
    }

    async fn list_stale_uploads(&self, cutoff: DateTime<Utc>, limit: u64) -> Result<Vec<Upload>, TransferError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM uploads
            WHERE status IN ('INITIATED', 'IN_PROGRESS') AND updated_at < ?
            ORDER BY updated_at LIMIT ?
            "#,
        )
        .bind(cutoff.to_rfc3339())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("list stale uploads", e))?;
        rows.iter().map(Self::upload_from_row).collect()
    }

    async fn touch_upload(&self, id: UploadId) -> Result<(), TransferError> {
        sqlx::query("UPDATE uploads SET updated_at = ? WHERE upload_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Self::db_err("touch upload", e))?;
        Ok(())
    }

    async fn delete_upload(&self, id: UploadId) -> Result<(), TransferError> {
        let mut tx = self.pool.begin().await.map_err(|e| Self::db_err("begin delete tx", e))?;
        let id_str = id.to_string();
        sqlx::query("DELETE FROM chunks WHERE upload_id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::db_err("delete chunks", e))?;
        sqlx::query("DELETE FROM uploads WHERE upload_id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::db_err("delete upload", e))?;
        tx.commit().await.map_err(|e| Self::db_err("commit delete tx", e))?;
        Ok(())
    }

    async fn delete_chunks(&self, id: UploadId) -> Result<(), TransferError> {
        sqlx::query("DELETE FROM chunks WHERE upload_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Self::db_err("delete chunk rows", e))?;
        Ok(())
    }

    async fn referenced_storage_keys(&self) -> Result<Vec<String>, TransferError> {
        let rows = sqlx::query(
            "SELECT storage_key FROM chunks UNION SELECT storage_key FROM uploads WHERE storage_key IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("list referenced keys", e))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("storage_key"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Self::db_err("read storage_key", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema;

    async fn store() -> SqliteUploadStore {
        SqliteUploadStore::new(schema::in_memory_pool().await.unwrap())
    }

    fn upload(file_size: u64, chunk_size: u64) -> Upload {
        Upload::new("alice", "report.bin", file_size, ChunkSize::new(chunk_size).unwrap(), None).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let store = store().await;
        let u = upload(10, 4);
        store.insert_upload(&u).await.unwrap();

        let found = store.find_upload(u.id()).await.unwrap().unwrap();
        assert_eq!(found.id(), u.id());
        assert_eq!(found.total_chunks(), 3);
        assert_eq!(found.status(), UploadStatus::Initiated);

        assert!(store.find_upload(UploadId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cas_status_applies_once() {
        let store = store().await;
        let u = upload(10, 4);
        store.insert_upload(&u).await.unwrap();

        assert!(store
            .cas_upload_status(u.id(), &[UploadStatus::Initiated], UploadStatus::InProgress)
            .await
            .unwrap());
        // CAS from the wrong precondition must refuse
        assert!(!store
            .cas_upload_status(u.id(), &[UploadStatus::Initiated], UploadStatus::InProgress)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_claim_finish_and_duplicate_short_circuit() {
        let store = store().await;
        let u = upload(10, 4);
        store.insert_upload(&u).await.unwrap();
        let key = ChunkRecord::storage_key_for(u.id(), 0);

        assert_eq!(store.claim_chunk(u.id(), 0, &key, 0).await.unwrap(), ChunkClaim::Claimed);
        // a concurrent duplicate sees the claim
        assert_eq!(store.claim_chunk(u.id(), 0, &key, 0).await.unwrap(), ChunkClaim::InFlight);

        let digest = Sha256Digest::compute(b"0123");
        store.finish_chunk(u.id(), 0, 4, Some(&digest), Some("etag-0")).await.unwrap();

        match store.claim_chunk(u.id(), 0, &key, 0).await.unwrap() {
            ChunkClaim::AlreadyUploaded { checksum } => assert_eq!(checksum, Some(digest)),
            other => panic!("expected AlreadyUploaded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_chunk_is_reclaimable() {
        let store = store().await;
        let u = upload(10, 4);
        store.insert_upload(&u).await.unwrap();
        let key = ChunkRecord::storage_key_for(u.id(), 1);

        assert_eq!(store.claim_chunk(u.id(), 1, &key, 0).await.unwrap(), ChunkClaim::Claimed);
        store.fail_chunk(u.id(), 1, 3).await.unwrap();
        assert_eq!(store.claim_chunk(u.id(), 1, &key, 0).await.unwrap(), ChunkClaim::Claimed);
    }

    #[tokio::test]
    async fn test_missing_chunk_indices() {
        let store = store().await;
        let u = upload(10, 4); // chunks 0, 1, 2
        store.insert_upload(&u).await.unwrap();

        for index in [0u64, 2] {
            let key = ChunkRecord::storage_key_for(u.id(), index);
            store.claim_chunk(u.id(), index, &key, 0).await.unwrap();
            store
                .finish_chunk(u.id(), index, u.expected_chunk_len(index), None, None)
                .await
                .unwrap();
        }

        assert_eq!(store.missing_chunk_indices(u.id(), 3).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_complete_refuses_until_all_uploaded() {
        let store = store().await;
        let u = upload(10, 4);
        store.insert_upload(&u).await.unwrap();

        match store.complete_upload(u.id(), 3).await.unwrap() {
            CompleteOutcome::MissingChunks(missing) => assert_eq!(missing, vec![0, 1, 2]),
            other => panic!("expected MissingChunks, got {:?}", other),
        }

        for index in 0..3u64 {
            let key = ChunkRecord::storage_key_for(u.id(), index);
            store.claim_chunk(u.id(), index, &key, 0).await.unwrap();
            store
                .finish_chunk(u.id(), index, u.expected_chunk_len(index), None, None)
                .await
                .unwrap();
        }

        assert_eq!(store.complete_upload(u.id(), 3).await.unwrap(), CompleteOutcome::Completed);
        // the second completer loses the CAS
        assert_eq!(
            store.complete_upload(u.id(), 3).await.unwrap(),
            CompleteOutcome::AlreadyTerminal(UploadStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_empty_upload_completes_directly() {
        let store = store().await;
        let u = upload(0, 4);
        store.insert_upload(&u).await.unwrap();
        assert_eq!(store.complete_upload(u.id(), 0).await.unwrap(), CompleteOutcome::Completed);
    }

    #[tokio::test]
    async fn test_stale_listing_and_delete() {
        let store = store().await;
        let u = upload(10, 4);
        store.insert_upload(&u).await.unwrap();

        // everything is newer than a cutoff in the past
        let past = Utc::now() - chrono::Duration::hours(1);
        assert!(store.list_stale_uploads(past, 10).await.unwrap().is_empty());

        // and older than a cutoff in the future
        let future = Utc::now() + chrono::Duration::hours(1);
        let stale = store.list_stale_uploads(future, 10).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id(), u.id());

        store.delete_upload(u.id()).await.unwrap();
        assert!(store.find_upload(u.id()).await.unwrap().is_none());
    }
}
