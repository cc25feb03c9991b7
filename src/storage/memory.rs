use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::traits::{LeafRecord, LeafSource, RootRecord, RootStore, StorageError, TrackRecord};

/// In-memory track table, keyed by track id.
pub struct InMemoryLeafSource {
    tracks: DashMap<i64, TrackRecord>,
}

impl InMemoryLeafSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracks: DashMap::new(),
        }
    }

    /// Insert or replace a track.
    pub fn upsert(&self, record: TrackRecord) {
        self.tracks.insert(record.track_id, record);
    }

    pub fn remove(&self, track_id: i64) {
        self.tracks.remove(&track_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Default for InMemoryLeafSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<TrackRecord> for InMemoryLeafSource {
    fn from_iter<I: IntoIterator<Item = TrackRecord>>(iter: I) -> Self {
        let source = Self::new();
        for record in iter {
            source.upsert(record);
        }
        source
    }
}

#[async_trait]
impl LeafSource for InMemoryLeafSource {
    async fn eligible_leaves(&self) -> Result<Vec<LeafRecord>, StorageError> {
        // DashMap iteration order is arbitrary; sort for a stable leaf order
        let mut leaves: Vec<LeafRecord> = self
            .tracks
            .iter()
            .filter(|entry| entry.value().is_eligible())
            .filter_map(|entry| {
                entry.value().leaf_hash().map(|leaf| LeafRecord {
                    track_id: *entry.key(),
                    leaf,
                })
            })
            .collect();
        leaves.sort_by_key(|record| record.track_id);
        Ok(leaves)
    }

    async fn track(&self, track_id: i64) -> Result<Option<TrackRecord>, StorageError> {
        Ok(self.tracks.get(&track_id).map(|r| r.value().clone()))
    }
}

/// In-memory root record.
#[derive(Default)]
pub struct InMemoryRootStore {
    record: RwLock<Option<RootRecord>>,
}

impl InMemoryRootStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RootStore for InMemoryRootStore {
    async fn current(&self) -> Result<Option<RootRecord>, StorageError> {
        Ok(self.record.read().clone())
    }

    async fn publish(&self, record: &RootRecord) -> Result<(), StorageError> {
        *self.record.write() = Some(record.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.record.write() = None;
        Ok(())
    }
}
