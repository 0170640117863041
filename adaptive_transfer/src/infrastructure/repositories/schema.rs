// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Schema
//!
//! Creates the three metadata tables (`uploads`, `chunks`, `idempotency`)
//! on start-up. Statements are idempotent so services and integration tests
//! converge on the same schema without a migration directory.

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};

use adaptive_transfer_domain::TransferError;

const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS uploads (
        upload_id        TEXT PRIMARY KEY,
        owner            TEXT NOT NULL,
        file_name        TEXT NOT NULL,
        file_size        INTEGER NOT NULL,
        chunk_size       INTEGER NOT NULL,
        total_chunks     INTEGER NOT NULL,
        file_checksum    TEXT,
        status           TEXT NOT NULL,
        multipart_handle TEXT,
        storage_key      TEXT,
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_uploads_status_updated ON uploads(status, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_uploads_owner ON uploads(owner)",
    r#"
    CREATE TABLE IF NOT EXISTS chunks (
        upload_id    TEXT NOT NULL,
        chunk_index  INTEGER NOT NULL,
        size_bytes   INTEGER NOT NULL,
        checksum     TEXT,
        storage_key  TEXT NOT NULL,
        storage_etag TEXT,
        status       TEXT NOT NULL,
        retry_count  INTEGER NOT NULL DEFAULT 0,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL,
        PRIMARY KEY (upload_id, chunk_index)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chunks_upload_status ON chunks(upload_id, status)",
    r#"
    CREATE TABLE IF NOT EXISTS idempotency (
        kind        TEXT NOT NULL,
        idem_key    TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        result      TEXT,
        created_at  TEXT NOT NULL,
        expires_at  TEXT NOT NULL,
        PRIMARY KEY (kind, idem_key)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_idempotency_expires ON idempotency(expires_at)",
];

/// Applies the schema statements against the provided pool.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), TransferError> {
    debug!("ensuring database schema is up to date");
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| TransferError::database(format!("failed to apply schema: {}", e)))?;
    }
    info!("database schema is up to date");
    Ok(())
}

/// Creates the SQLite database file when it does not exist yet.
///
/// `SqlitePool::connect` fails on a missing file unless the connection
/// options ask for creation, so services call this before connecting.
pub async fn create_database_if_missing(database_url: &str) -> Result<(), TransferError> {
    let exists = sqlx::Sqlite::database_exists(database_url)
        .await
        .map_err(|e| TransferError::database(format!("failed to probe database: {}", e)))?;
    if !exists {
        debug!(url = database_url, "database does not exist, creating");
        sqlx::Sqlite::create_database(database_url)
            .await
            .map_err(|e| TransferError::database(format!("failed to create database: {}", e)))?;
        info!(url = database_url, "created new SQLite database");
    }
    Ok(())
}

/// Creates (if needed), connects, and applies the schema in one call.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, TransferError> {
    create_database_if_missing(database_url).await?;

    let pool = SqlitePool::connect(database_url)
        .await
        .map_err(|e| TransferError::database(format!("failed to connect to database: {}", e)))?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests.
///
/// A single pooled connection that never retires: every `:memory:`
/// connection is its own database, so the pool must not open a second one.
pub async fn in_memory_pool() -> Result<SqlitePool, TransferError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| TransferError::database(format!("failed to create in-memory database: {}", e)))?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = in_memory_pool().await.unwrap();
        // applying again must not fail
        ensure_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_tables_exist() {
        let pool = in_memory_pool().await.unwrap();
        for table in ["uploads", "chunks", "idempotency"] {
            let row: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(row.0, 1, "table {} must exist", table);
        }
    }
}
