// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Binary Merkle tree over an ordered leaf list.
//!
//! ```text
//! level 2            root
//!                  /      \
//! level 1     H(a,b)        c      <- odd node promoted unchanged
//!             /    \        |
//! level 0    a      b       c
//! ```
//!
//! Every level is retained so proofs can be read straight off the tree.

use std::marker::PhantomData;
use tracing::instrument;

use super::hash::{Hash32, Keccak256Hasher, MerkleHasher};
use super::proof::{MerkleProof, ProofStep, Side};
use super::MerkleError;

/// An immutable Merkle tree.
///
/// Built once from an ordered leaf list; never mutated afterwards. A changed
/// leaf set means a new tree.
#[derive(Clone)]
pub struct MerkleTree<H: MerkleHasher = Keccak256Hasher> {
    /// `levels[0]` are the leaves, the last level holds the root alone.
    levels: Vec<Vec<Hash32>>,
    _hasher: PhantomData<H>,
}

impl<H: MerkleHasher> std::fmt::Debug for MerkleTree<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerkleTree")
            .field("hasher", &H::NAME)
            .field("leaves", &self.len())
            .field("depth", &self.depth())
            .field("root", &self.root())
            .finish()
    }
}

impl<H: MerkleHasher> MerkleTree<H> {
    /// Build a tree from leaves in their stable order.
    ///
    /// Duplicates are kept as distinct positions. An empty list yields an
    /// empty tree whose root is [`Hash32::ZERO`].
    #[instrument(skip(leaves), fields(leaves = leaves.len(), hasher = H::NAME))]
    pub fn build(leaves: Vec<Hash32>) -> Self {
        if leaves.is_empty() {
            return Self {
                levels: Vec::new(),
                _hasher: PhantomData,
            };
        }

        let mut levels = vec![leaves];
        while levels.last().map_or(false, |level| level.len() > 1) {
            let current = &levels[levels.len() - 1];
            let next: Vec<Hash32> = current
                .chunks(2)
                .map(|pair| match pair.get(1) {
                    Some(right) => H::hash_pair(&pair[0], right),
                    None => pair[0],
                })
                .collect();
            levels.push(next);
        }

        Self {
            levels,
            _hasher: PhantomData,
        }
    }

    /// Root hash, or [`Hash32::ZERO`] for an empty tree.
    pub fn root(&self) -> Hash32 {
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(Hash32::ZERO)
    }

    pub fn leaves(&self) -> &[Hash32] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// All levels, leaves first.
    pub fn levels(&self) -> &[Vec<Hash32>] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.leaves().len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of levels above the leaves (0 for empty and single-leaf trees).
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Position of the first occurrence of `leaf`.
    pub fn index_of(&self, leaf: &Hash32) -> Option<usize> {
        self.leaves().iter().position(|candidate| candidate == leaf)
    }

    /// Proof for the first occurrence of `leaf`.
    pub fn proof(&self, leaf: &Hash32) -> Result<MerkleProof, MerkleError> {
        let index = self.index_of(leaf).ok_or(MerkleError::LeafNotFound(*leaf))?;
        self.proof_at(index)
    }

    /// Proof for the leaf at `index`.
    ///
    /// Levels where the node was promoted contribute no step, so the proof
    /// can be shorter than [`depth`](Self::depth).
    pub fn proof_at(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        if index >= self.len() {
            return Err(MerkleError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        let mut steps = Vec::with_capacity(self.depth());
        let mut position = index;

        // Stop below the root level
        for level in &self.levels[..self.depth()] {
            let is_right = position % 2 == 1;
            let sibling_index = if is_right { position - 1 } else { position + 1 };

            if let Some(sibling) = level.get(sibling_index) {
                steps.push(ProofStep {
                    sibling: *sibling,
                    side: if is_right { Side::Left } else { Side::Right },
                });
            }
            position /= 2;
        }

        Ok(MerkleProof::new(steps))
    }

    /// Verify `proof` against this tree's root with the same hasher.
    pub fn verify(&self, leaf: &Hash32, proof: &MerkleProof) -> bool {
        !self.is_empty() && proof.verify::<H>(leaf, &self.root())
    }
}
