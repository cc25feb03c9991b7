//! Public types for the registry coordinator.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::merkle::{Hash32, MerkleError, MerkleProof, MerkleTree};
use crate::storage::traits::{LeafRecord, StorageError};

/// Registry lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// Just created, no tree loaded
    Created,
    /// Reading leaves and the stored root during `start()`
    Loading,
    /// Serving proofs from the current snapshot
    Ready,
    /// A rebuild holds the rebuild lock; proofs are still served
    Rebuilding,
}

impl std::fmt::Display for RegistryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Loading => write!(f, "Loading"),
            Self::Ready => write!(f, "Ready"),
            Self::Rebuilding => write!(f, "Rebuilding"),
        }
    }
}

/// Why a proof could not be issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    /// No such track
    UnknownTrack,
    /// Track exists but no leaf was computed for it
    NoLeaf,
    /// Track has a leaf but is pending or rejected
    NotCertified,
    /// Certified after the last rebuild, or its leaf changed since
    NotInPublishedTree,
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTrack => write!(f, "unknown track"),
            Self::NoLeaf => write!(f, "track has no leaf"),
            Self::NotCertified => write!(f, "track is not certified"),
            Self::NotInPublishedTree => write!(f, "track is not in the published tree"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Track {track_id} not found: {reason}")]
    NotFound { track_id: i64, reason: NotFoundReason },
    #[error("Registry not ready: {0}")]
    NotReady(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

/// Outcome of checking a track against a trusted root.
///
/// Distinguishes "never certified" from "certified but the proof does not
/// reach the root", which call for different remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Proof recomputes the trusted root
    Verified,
    /// Track is certified but its proof does not reach the trusted root
    /// (stale root, rebuild pending, or tampering)
    RootMismatch,
    /// Track exists but is not certified or has no leaf
    NotCertified,
    /// No such track
    UnknownTrack,
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::RootMismatch => "root_mismatch",
            Self::NotCertified => "not_certified",
            Self::UnknownTrack => "unknown_track",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proof issued for one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackProof {
    pub track_id: i64,
    pub leaf: Hash32,
    pub proof: MerkleProof,
    /// Root of the tree the proof was cut from (equals the published root)
    pub root: Hash32,
}

/// Result of a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// `None` when the leaf set is empty and the record was cleared
    pub root: Option<Hash32>,
    pub leaf_count: usize,
    pub depth: usize,
    /// False when the rebuilt root equals the one already published
    pub changed: bool,
    pub elapsed: Duration,
}

/// Immutable tree plus the track positions it was built from.
#[derive(Debug)]
pub struct TreeSnapshot {
    tree: MerkleTree,
    track_ids: Vec<i64>,
    positions: BTreeMap<i64, usize>,
    /// Whether `tree.root()` equals the stored root
    published: bool,
}

impl TreeSnapshot {
    pub(crate) fn build(leaves: &[LeafRecord], published: bool) -> Self {
        let tree = MerkleTree::build(leaves.iter().map(|l| l.leaf).collect());
        let track_ids: Vec<i64> = leaves.iter().map(|l| l.track_id).collect();
        let positions = track_ids
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect();

        Self {
            tree,
            track_ids,
            positions,
            published,
        }
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    pub fn root(&self) -> Hash32 {
        self.tree.root()
    }

    pub fn len(&self) -> usize {
        self.track_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track_ids.is_empty()
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    /// Track ids in leaf order.
    pub fn track_ids(&self) -> &[i64] {
        &self.track_ids
    }

    pub fn position(&self, track_id: i64) -> Option<usize> {
        self.positions.get(&track_id).copied()
    }

    pub(crate) fn mark_published(&mut self) {
        self.published = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_state_display() {
        assert_eq!(format!("{}", RegistryState::Created), "Created");
        assert_eq!(format!("{}", RegistryState::Rebuilding), "Rebuilding");
    }

    #[test]
    fn test_verdict_serializes_snake_case() {
        assert_eq!(serde_json::to_value(Verdict::RootMismatch).unwrap(), "root_mismatch");
        assert_eq!(serde_json::to_value(Verdict::UnknownTrack).unwrap(), "unknown_track");
        assert!(Verdict::Verified.is_verified());
        assert!(!Verdict::NotCertified.is_verified());
    }

    #[test]
    fn test_snapshot_positions_follow_leaf_order() {
        let leaves: Vec<LeafRecord> = [4i64, 9, 12]
            .iter()
            .map(|id| LeafRecord { track_id: *id, leaf: Hash32([*id as u8; 32]) })
            .collect();
        let snapshot = TreeSnapshot::build(&leaves, false);

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.position(9), Some(1));
        assert_eq!(snapshot.position(5), None);
        assert_eq!(snapshot.tree().leaves()[2], Hash32([12u8; 32]));
        assert!(!snapshot.is_published());
    }
}
