use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::certification::VerificationStatus;
use crate::merkle::Hash32;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Item not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Stored value for '{key}' is corrupt: {reason}")]
    Corruption { key: String, reason: String },
}

impl StorageError {
    /// Backend failures are transient and worth retrying; corruption is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// A track as the persistence layer stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track_id: i64,
    /// Hex leaf computed upstream by the certification workflow
    pub leaf: Option<String>,
    pub status: VerificationStatus,
    /// Anchor transaction recorded when the track was certified
    pub tx_hash: Option<String>,
}

impl TrackRecord {
    pub fn new(track_id: i64, leaf: Option<String>, status: VerificationStatus) -> Self {
        Self {
            track_id,
            leaf,
            status,
            tx_hash: None,
        }
    }

    /// Parsed leaf, if present and well-formed.
    pub fn leaf_hash(&self) -> Option<Hash32> {
        self.leaf.as_deref().and_then(|hex| Hash32::from_hex(hex).ok())
    }

    /// Whether this track's leaf belongs in the next rebuild.
    ///
    /// Certified and carrying a well-formed 32-byte leaf. Rebuilds and proof
    /// issuance both use this and nothing else.
    pub fn is_eligible(&self) -> bool {
        self.status.is_certified() && self.leaf_hash().is_some()
    }
}

/// One leaf of the ordered leaf set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafRecord {
    pub track_id: i64,
    pub leaf: Hash32,
}

/// The persisted current root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRecord {
    pub root: Hash32,
    pub leaf_count: u64,
    /// Unix millis
    pub published_at: i64,
}

impl RootRecord {
    pub fn new(root: Hash32, leaf_count: u64) -> Self {
        Self {
            root,
            leaf_count,
            published_at: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Read side of the track table.
#[async_trait]
pub trait LeafSource: Send + Sync {
    /// Eligible leaves ordered by track id ascending.
    ///
    /// Must be a consistent snapshot: one call, one read.
    async fn eligible_leaves(&self) -> Result<Vec<LeafRecord>, StorageError>;

    /// Look up a single track, eligible or not.
    async fn track(&self, track_id: i64) -> Result<Option<TrackRecord>, StorageError>;
}

/// Single-record storage for the current root.
///
/// `publish` overwrites; it is not a log. Implementations must make it
/// all-or-nothing.
#[async_trait]
pub trait RootStore: Send + Sync {
    async fn current(&self) -> Result<Option<RootRecord>, StorageError>;
    async fn publish(&self, record: &RootRecord) -> Result<(), StorageError>;
    /// Remove the record (the leaf set became empty).
    async fn clear(&self) -> Result<(), StorageError>;
}
