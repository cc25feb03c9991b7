//! Merkle tree over certified track leaves.
//!
//! # Design
//!
//! One pure module owns the hashing rule, and every caller delegates to it:
//!
//! - **Build**: leaves in stable order (track id ascending), paired level by
//!   level as `H(min(a, b) || max(a, b))`
//! - **Odd levels**: the lone last node is promoted unchanged
//! - **Proof**: sibling at each level, skipping promoted levels
//! - **Verify**: fold `H(sort(current, sibling))` over the proof, compare to root
//!
//! ```text
//! leaves   a1b2..   c3d4..   e5f6..
//!            \      /          |
//! level 1    H(a1b2, c3d4)   e5f6..
//!                  \         /
//! root          H(level 1 pair)
//! ```
//!
//! The default hash is Keccak-256, matching roots anchored on EVM chains.
//! Nothing here performs I/O, so verification runs anywhere with only
//! `(leaf, proof, root)`.

mod hash;
mod proof;
mod tree;

pub use hash::{Hash32, Keccak256Hasher, MerkleHasher, Sha256Hasher};
pub use proof::{verify_proof, MerkleProof, ProofStep, Side};
pub use tree::MerkleTree;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Leaf {0} is not part of the tree")]
    LeafNotFound(Hash32),
    #[error("Leaf index {index} out of range for tree of {len} leaves")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Invalid hex '{input}': {reason}")]
    InvalidHex { input: String, reason: String },
    #[error("Invalid hash length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}
