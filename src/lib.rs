//! # Provenance Registry
//!
//! A Merkle-tree registry over certified music tracks. Every track that passed
//! human-authorship certification carries a 32-byte leaf; the registry folds
//! those leaves into a single root, publishes it, and issues inclusion proofs
//! anyone can check offline.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Leaf Source                           │
//! │  • tracks(id, merkle_leaf, verification_status, tx_hash)   │
//! │  • Certified + well-formed leaf, ordered by id             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                      (rebuild, serialized)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Merkle Tree (pure)                      │
//! │  • Keccak-256, sorted pairs, odd node promoted             │
//! │  • Proofs cut from an immutable snapshot                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                       (publish root)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Root Store                            │
//! │  • SQL row or Redis key, one current record                │
//! │  • Served over HTTP: root, proofs, verification            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use provenance_registry::{ProvenanceRegistry, RegistryConfig, Verdict};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RegistryConfig {
//!         sql_url: Some("sqlite://registry.db?mode=rwc".into()),
//!         rebuild_on_start: true,
//!         ..Default::default()
//!     };
//!
//!     let registry = Arc::new(ProvenanceRegistry::connect(config).await?);
//!     registry.start().await?;
//!
//!     if let Some(root) = registry.current_root().await? {
//!         println!("Published root: {root}");
//!     }
//!
//!     let proof = registry.proof_for_track(42).await?;
//!     assert!(registry.verify(&proof.leaf, &proof.proof, &proof.root));
//!     assert_eq!(registry.verify_track(42, None).await?, Verdict::Verified);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`merkle`]: tree build, proofs, stateless verification
//! - [`registry`]: the [`ProvenanceRegistry`] coordinating rebuild and proofs
//! - [`storage`]: leaf source and root store backends (SQL, Redis, memory)
//! - [`certification`]: canonical verification-status parsing
//! - [`http`]: axum routes over a shared registry
//! - [`resilience`]: retry with backoff

pub mod certification;
pub mod config;
pub mod http;
pub mod merkle;
pub mod metrics;
pub mod registry;
pub mod resilience;
pub mod storage;

pub use certification::VerificationStatus;
pub use config::RegistryConfig;
pub use merkle::{verify_proof, Hash32, MerkleError, MerkleProof, MerkleTree, ProofStep, Side};
pub use registry::{
    NotFoundReason, ProvenanceRegistry, RebuildReport, RegistryError, RegistryState, TrackProof,
    TreeSnapshot, Verdict,
};
pub use resilience::retry::RetryConfig;
pub use storage::traits::{LeafRecord, LeafSource, RootRecord, RootStore, StorageError, TrackRecord};
