//! Root, proof and verification queries.
//!
//! Read-only: these never take the rebuild lock and work on an `Arc` of the
//! current snapshot.

use tracing::{debug, instrument};

use crate::merkle::{verify_proof, Hash32, MerkleProof};
use crate::resilience::retry::retry_if;
use crate::storage::traits::{RootRecord, StorageError, TrackRecord};

use super::{NotFoundReason, ProvenanceRegistry, RegistryError, TrackProof, Verdict};

impl ProvenanceRegistry {
    /// The published root, or `None` before anything was published (or
    /// after the leaf set became empty).
    #[instrument(skip(self))]
    pub async fn current_root(&self) -> Result<Option<Hash32>, RegistryError> {
        Ok(self.published_root().await?.map(|record| record.root))
    }

    /// The full published record: root, leaf count and publish time.
    pub async fn published_root(&self) -> Result<Option<RootRecord>, RegistryError> {
        Ok(self.read_root_record().await?)
    }

    /// Inclusion proof for a track, cut from the published tree.
    ///
    /// The track must exist, be certified with a well-formed leaf, and that
    /// leaf must sit in the current snapshot at the track's position.
    #[instrument(skip(self))]
    pub async fn proof_for_track(&self, track_id: i64) -> Result<TrackProof, RegistryError> {
        let result = self.proof_for_track_inner(track_id).await;
        crate::metrics::record_proof_request(match &result {
            Ok(_) => "issued",
            Err(RegistryError::NotFound { .. }) => "not_found",
            Err(_) => "error",
        });
        result
    }

    async fn proof_for_track_inner(&self, track_id: i64) -> Result<TrackProof, RegistryError> {
        let record = retry_if(
            "read_track",
            &self.retry,
            || self.leaves.track(track_id),
            StorageError::is_retryable,
        )
        .await?;
        let leaf = Self::eligible_leaf(track_id, record.as_ref())?;

        let snapshot = self
            .snapshot()
            .ok_or(RegistryError::NotReady("no tree loaded; call start() or rebuild()"))?;
        if !snapshot.is_published() {
            return Err(RegistryError::NotReady("stored root is stale; rebuild required"));
        }

        let not_in_tree = RegistryError::NotFound {
            track_id,
            reason: NotFoundReason::NotInPublishedTree,
        };
        let Some(index) = snapshot.position(track_id) else {
            return Err(not_in_tree);
        };
        // Leaf replaced since the last rebuild
        if snapshot.tree().leaves()[index] != leaf {
            return Err(not_in_tree);
        }

        let proof = snapshot.tree().proof_at(index)?;
        debug!(track_id, index, steps = proof.len(), "Proof issued");

        Ok(TrackProof {
            track_id,
            leaf,
            proof,
            root: snapshot.root(),
        })
    }

    /// Check a track against `trusted_root`, or the published root when
    /// `None`.
    #[instrument(skip(self))]
    pub async fn verify_track(
        &self,
        track_id: i64,
        trusted_root: Option<Hash32>,
    ) -> Result<Verdict, RegistryError> {
        let verdict = match self.proof_for_track(track_id).await {
            Ok(issued) => {
                let root = match trusted_root {
                    Some(root) => Some(root),
                    None => self.current_root().await?,
                };
                match root {
                    Some(root) if self.verify(&issued.leaf, &issued.proof, &root) => Verdict::Verified,
                    _ => Verdict::RootMismatch,
                }
            }
            Err(RegistryError::NotFound { reason, .. }) => match reason {
                NotFoundReason::UnknownTrack => Verdict::UnknownTrack,
                NotFoundReason::NoLeaf | NotFoundReason::NotCertified => Verdict::NotCertified,
                NotFoundReason::NotInPublishedTree => Verdict::RootMismatch,
            },
            Err(e) => return Err(e),
        };

        debug!(track_id, ?verdict, "Track verification");
        Ok(verdict)
    }

    /// Stateless check of `(leaf, proof, root)`.
    pub fn verify(&self, leaf: &Hash32, proof: &MerkleProof, root: &Hash32) -> bool {
        let verified = verify_proof(leaf, proof, root);
        crate::metrics::record_verification(verified);
        verified
    }

    fn eligible_leaf(track_id: i64, record: Option<&TrackRecord>) -> Result<Hash32, RegistryError> {
        let not_found = |reason| RegistryError::NotFound { track_id, reason };

        let record = record.ok_or_else(|| not_found(NotFoundReason::UnknownTrack))?;
        let leaf = record
            .leaf_hash()
            .ok_or_else(|| not_found(NotFoundReason::NoLeaf))?;
        if !record.is_eligible() {
            return Err(not_found(NotFoundReason::NotCertified));
        }
        Ok(leaf)
    }
}
