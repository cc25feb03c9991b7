// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Inclusion proofs and the stateless verifier.
//!
//! Verification needs only `(leaf, proof, root)`: no tree, no storage.

use serde::{Deserialize, Serialize};

use super::hash::{Hash32, Keccak256Hasher, MerkleHasher};

/// Which side of the running node the sibling occupied.
///
/// Pairs are sorted before hashing, so verification ignores this. It is kept
/// for diagnostics and for consumers that check positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Recorded when a client supplies a sibling without its position.
    pub const UNKNOWN: Side = Side::Right;
}

/// One level of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Hash32,
    pub side: Side,
}

/// Sibling path from a leaf up to (but excluding) the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerkleProof {
    steps: Vec<ProofStep>,
}

impl MerkleProof {
    pub fn new(steps: Vec<ProofStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[ProofStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sibling hashes only, in order (the form most anchors consume).
    pub fn siblings(&self) -> Vec<Hash32> {
        self.steps.iter().map(|step| step.sibling).collect()
    }

    /// Build a proof from bare siblings. Sides are unknown and recorded as
    /// [`Side::UNKNOWN`]; this does not affect verification.
    pub fn from_siblings(siblings: impl IntoIterator<Item = Hash32>) -> Self {
        Self {
            steps: siblings
                .into_iter()
                .map(|sibling| ProofStep {
                    sibling,
                    side: Side::UNKNOWN,
                })
                .collect(),
        }
    }

    /// Recompute the root implied by `leaf` and this path.
    pub fn compute_root<H: MerkleHasher>(&self, leaf: &Hash32) -> Hash32 {
        self.steps
            .iter()
            .fold(*leaf, |current, step| H::hash_pair(&current, &step.sibling))
    }

    /// True iff the path from `leaf` reaches `root`.
    pub fn verify<H: MerkleHasher>(&self, leaf: &Hash32, root: &Hash32) -> bool {
        self.compute_root::<H>(leaf) == *root
    }
}

/// Verify with the registry's hash function (Keccak-256).
///
/// A mismatch is an ordinary outcome and returns `false`.
pub fn verify_proof(leaf: &Hash32, proof: &MerkleProof, root: &Hash32) -> bool {
    proof.verify::<Keccak256Hasher>(leaf, root)
}
