// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL storage for tracks (leaf source) and the published root.
//!
//! Works against SQLite, MySQL and Postgres through sqlx's `Any` driver.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE tracks (
//!     id BIGINT PRIMARY KEY,              -- stable ordering key
//!     merkle_leaf VARCHAR(66),            -- hex leaf, NULL until computed
//!     verification_status VARCHAR(32),    -- free-form, see VerificationStatus::parse
//!     tx_hash VARCHAR(66)                 -- anchor transaction, if any
//! );
//!
//! CREATE TABLE merkle_root (
//!     id INT PRIMARY KEY,                 -- always 1: single current record
//!     root VARCHAR(66) NOT NULL,
//!     leaf_count BIGINT NOT NULL,
//!     published_at BIGINT NOT NULL        -- unix millis
//! );
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! Hashes are stored as hex `VARCHAR` rather than binary columns; the `Any`
//! driver does not map MySQL binary/TEXT types reliably. Placeholders differ
//! per backend (`?` vs `$N`), so each statement is chosen by [`SqlDialect`].

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::traits::{
    LeafRecord, LeafSource, RootRecord, RootStore, StorageError, TrackRecord,
};
use crate::certification::VerificationStatus;
use crate::merkle::Hash32;
use crate::resilience::retry::{retry, RetryConfig};

/// Primary key of the single root row.
const ROOT_ROW_ID: i64 = 1;

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// SQL backend family, detected from the connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    MySql,
    Postgres,
}

impl SqlDialect {
    pub fn from_url(url: &str) -> Result<Self, StorageError> {
        if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if url.starts_with("mysql:") || url.starts_with("mariadb:") {
            Ok(Self::MySql)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(Self::Postgres)
        } else {
            Err(StorageError::Backend(format!(
                "Unsupported SQL connection string scheme: {}",
                url.split(':').next().unwrap_or_default()
            )))
        }
    }

    fn schema(&self) -> &'static [&'static str] {
        match self {
            Self::Sqlite => &[
                "CREATE TABLE IF NOT EXISTS tracks (
                    id INTEGER PRIMARY KEY,
                    merkle_leaf TEXT,
                    verification_status TEXT,
                    tx_hash TEXT
                )",
                "CREATE TABLE IF NOT EXISTS merkle_root (
                    id INTEGER PRIMARY KEY,
                    root TEXT NOT NULL,
                    leaf_count INTEGER NOT NULL,
                    published_at INTEGER NOT NULL
                )",
            ],
            Self::MySql => &[
                "CREATE TABLE IF NOT EXISTS tracks (
                    id BIGINT PRIMARY KEY,
                    merkle_leaf VARCHAR(66),
                    verification_status VARCHAR(32),
                    tx_hash VARCHAR(66)
                ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
                "CREATE TABLE IF NOT EXISTS merkle_root (
                    id INT PRIMARY KEY,
                    root VARCHAR(66) NOT NULL,
                    leaf_count BIGINT NOT NULL,
                    published_at BIGINT NOT NULL
                ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            ],
            Self::Postgres => &[
                "CREATE TABLE IF NOT EXISTS tracks (
                    id BIGINT PRIMARY KEY,
                    merkle_leaf VARCHAR(66),
                    verification_status VARCHAR(32),
                    tx_hash VARCHAR(66)
                )",
                "CREATE TABLE IF NOT EXISTS merkle_root (
                    id BIGINT PRIMARY KEY,
                    root VARCHAR(66) NOT NULL,
                    leaf_count BIGINT NOT NULL,
                    published_at BIGINT NOT NULL
                )",
            ],
        }
    }

    fn select_track(&self) -> &'static str {
        match self {
            Self::Postgres => {
                "SELECT id, merkle_leaf, verification_status, tx_hash FROM tracks WHERE id = $1"
            }
            _ => "SELECT id, merkle_leaf, verification_status, tx_hash FROM tracks WHERE id = ?",
        }
    }

    fn upsert_track(&self) -> &'static str {
        match self {
            Self::Sqlite => {
                "INSERT INTO tracks (id, merkle_leaf, verification_status, tx_hash)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    merkle_leaf = excluded.merkle_leaf,
                    verification_status = excluded.verification_status,
                    tx_hash = excluded.tx_hash"
            }
            Self::MySql => {
                "INSERT INTO tracks (id, merkle_leaf, verification_status, tx_hash)
                 VALUES (?, ?, ?, ?)
                 ON DUPLICATE KEY UPDATE
                    merkle_leaf = VALUES(merkle_leaf),
                    verification_status = VALUES(verification_status),
                    tx_hash = VALUES(tx_hash)"
            }
            Self::Postgres => {
                "INSERT INTO tracks (id, merkle_leaf, verification_status, tx_hash)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE SET
                    merkle_leaf = EXCLUDED.merkle_leaf,
                    verification_status = EXCLUDED.verification_status,
                    tx_hash = EXCLUDED.tx_hash"
            }
        }
    }

    fn certify_track(&self) -> &'static str {
        match self {
            Self::Postgres => {
                "UPDATE tracks SET tx_hash = $1, verification_status = $2 WHERE id = $3"
            }
            _ => "UPDATE tracks SET tx_hash = ?, verification_status = ? WHERE id = ?",
        }
    }

    fn select_root(&self) -> &'static str {
        match self {
            Self::Postgres => {
                "SELECT root, leaf_count, published_at FROM merkle_root WHERE id = $1"
            }
            _ => "SELECT root, leaf_count, published_at FROM merkle_root WHERE id = ?",
        }
    }

    fn upsert_root(&self) -> &'static str {
        match self {
            Self::Sqlite => {
                "INSERT INTO merkle_root (id, root, leaf_count, published_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    root = excluded.root,
                    leaf_count = excluded.leaf_count,
                    published_at = excluded.published_at"
            }
            Self::MySql => {
                "INSERT INTO merkle_root (id, root, leaf_count, published_at)
                 VALUES (?, ?, ?, ?)
                 ON DUPLICATE KEY UPDATE
                    root = VALUES(root),
                    leaf_count = VALUES(leaf_count),
                    published_at = VALUES(published_at)"
            }
            Self::Postgres => {
                "INSERT INTO merkle_root (id, root, leaf_count, published_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE SET
                    root = EXCLUDED.root,
                    leaf_count = EXCLUDED.leaf_count,
                    published_at = EXCLUDED.published_at"
            }
        }
    }

    fn delete_root(&self) -> &'static str {
        match self {
            Self::Postgres => "DELETE FROM merkle_root WHERE id = $1",
            _ => "DELETE FROM merkle_root WHERE id = ?",
        }
    }
}

/// SQL-backed track table and root record.
///
/// Implements both [`LeafSource`] and [`RootStore`] over one pool.
#[derive(Clone)]
pub struct SqlStore {
    pool: AnyPool,
    dialect: SqlDialect,
}

impl SqlStore {
    /// Connect with startup-mode retry (fails fast if config is wrong) and
    /// create tables if missing.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        let dialect = SqlDialect::from_url(connection_string)?;

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool, dialect };

        if dialect == SqlDialect::Sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        info!(?dialect, "SQL registry store initialized");
        Ok(store)
    }

    /// Create from an existing pool (e.g. shared with the application).
    /// Call [`init_schema`](Self::init_schema) if the tables may not exist.
    pub fn from_pool(pool: AnyPool, dialect: SqlDialect) -> Self {
        Self { pool, dialect }
    }

    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// WAL lets proof reads proceed while a rebuild publishes.
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;
        Ok(())
    }

    pub async fn init_schema(&self) -> Result<(), StorageError> {
        for stmt in self.dialect.schema() {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(format!("Failed to init schema: {}", e)))
            })
            .await?;
        }
        Ok(())
    }

    /// Insert or replace a track row.
    ///
    /// Ingestion belongs to the certification workflow; this exists for that
    /// workflow's adapters and for seeding.
    #[instrument(skip(self, record), fields(track_id = record.track_id))]
    pub async fn upsert_track(&self, record: &TrackRecord) -> Result<(), StorageError> {
        sqlx::query(self.dialect.upsert_track())
            .bind(record.track_id)
            .bind(record.leaf.clone())
            .bind(record.status.as_str())
            .bind(record.tx_hash.clone())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to upsert track: {}", e)))?;
        Ok(())
    }

    /// Record the anchor transaction and mark the track certified in one
    /// statement. Returns `NotFound` if the track does not exist.
    #[instrument(skip(self))]
    pub async fn mark_certified(&self, track_id: i64, tx_hash: &str) -> Result<(), StorageError> {
        let result = sqlx::query(self.dialect.certify_track())
            .bind(tx_hash)
            .bind(VerificationStatus::Certified.as_str())
            .bind(track_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to certify track: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        debug!(track_id, "Track marked certified");
        Ok(())
    }

    fn track_from_row(row: &AnyRow) -> Result<TrackRecord, StorageError> {
        let track_id: i64 = row
            .try_get("id")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let leaf: Option<String> = row
            .try_get("merkle_leaf")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let status: Option<String> = row
            .try_get("verification_status")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let tx_hash: Option<String> = row
            .try_get("tx_hash")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(TrackRecord {
            track_id,
            leaf,
            status: VerificationStatus::parse_opt(status.as_deref()),
            tx_hash,
        })
    }
}

#[async_trait]
impl LeafSource for SqlStore {
    #[instrument(skip(self))]
    async fn eligible_leaves(&self) -> Result<Vec<LeafRecord>, StorageError> {
        // One statement, one snapshot. Eligibility is decided in Rust so the
        // predicate stays in one place.
        let rows = sqlx::query(
            "SELECT id, merkle_leaf, verification_status, tx_hash FROM tracks
             WHERE merkle_leaf IS NOT NULL ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("Failed to read leaves: {}", e)))?;

        let mut leaves = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in &rows {
            let record = Self::track_from_row(row)?;
            match (record.is_eligible(), record.leaf_hash()) {
                (true, Some(leaf)) => leaves.push(LeafRecord {
                    track_id: record.track_id,
                    leaf,
                }),
                _ => {
                    if record.status.is_certified() {
                        warn!(track_id = record.track_id, "Certified track has malformed leaf, excluded");
                    }
                    skipped += 1;
                }
            }
        }

        debug!(eligible = leaves.len(), skipped, "Read leaf set");
        Ok(leaves)
    }

    async fn track(&self, track_id: i64) -> Result<Option<TrackRecord>, StorageError> {
        let row = sqlx::query(self.dialect.select_track())
            .bind(track_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to read track: {}", e)))?;

        row.as_ref().map(Self::track_from_row).transpose()
    }
}

#[async_trait]
impl RootStore for SqlStore {
    #[instrument(skip(self))]
    async fn current(&self) -> Result<Option<RootRecord>, StorageError> {
        let row = sqlx::query(self.dialect.select_root())
            .bind(ROOT_ROW_ID)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to read merkle root: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let root_hex: String = row
            .try_get("root")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let leaf_count: i64 = row
            .try_get("leaf_count")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let published_at: i64 = row
            .try_get("published_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let root = Hash32::from_hex(&root_hex).map_err(|e| StorageError::Corruption {
            key: "merkle_root".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Some(RootRecord {
            root,
            leaf_count: leaf_count.max(0) as u64,
            published_at,
        }))
    }

    /// Single upsert inside a transaction: readers see the old root or the
    /// new one, never a mix.
    #[instrument(skip(self, record), fields(root = %record.root))]
    async fn publish(&self, record: &RootRecord) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query(self.dialect.upsert_root())
            .bind(ROOT_ROW_ID)
            .bind(record.root.to_hex())
            .bind(record.leaf_count as i64)
            .bind(record.published_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to publish merkle root: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to commit merkle root: {}", e)))?;

        debug!(leaf_count = record.leaf_count, "Merkle root published to SQL");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query(self.dialect.delete_root())
            .bind(ROOT_ROW_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to clear merkle root: {}", e)))?;
        Ok(())
    }
}
