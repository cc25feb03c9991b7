// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Registry coordinator.
//!
//! [`ProvenanceRegistry`] ties the collaborators to the pure tree code:
//!
//! ```text
//! LeafSource ──► MerkleTree::build ──┬──► RootStore::publish   (durable root)
//!                                    └──► TreeSnapshot          (proof issuance)
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Created → Loading → Ready ⇄ Rebuilding
//! ```
//!
//! # Concurrency
//!
//! Rebuilds are serialized by an async mutex around
//! read-leaves → build → publish. The snapshot is swapped only after the
//! publish succeeds, so a failed rebuild leaves both the stored root and the
//! served proofs untouched. Proof requests clone the snapshot `Arc` and never
//! wait on a rebuild.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use provenance_registry::{ProvenanceRegistry, RegistryConfig};
//! use provenance_registry::storage::memory::{InMemoryLeafSource, InMemoryRootStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ProvenanceRegistry::new(
//!     RegistryConfig::default(),
//!     Arc::new(InMemoryLeafSource::new()),
//!     Arc::new(InMemoryRootStore::new()),
//! );
//! registry.start().await?;
//! assert!(registry.current_root().await?.is_none());
//! # Ok(())
//! # }
//! ```

mod lifecycle;
mod proof_api;
mod rebuild;
mod types;

pub use types::{
    NotFoundReason, RebuildReport, RegistryError, RegistryState, TrackProof, TreeSnapshot,
    Verdict,
};

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::config::RegistryConfig;
use crate::resilience::retry::RetryConfig;
use crate::storage::traits::{LeafSource, RootStore};

/// The provenance registry.
///
/// `Send + Sync`; share it behind an `Arc` between web handlers and the
/// rebuild loop.
pub struct ProvenanceRegistry {
    pub(super) config: RegistryConfig,

    /// Track table (read side)
    pub(super) leaves: Arc<dyn LeafSource>,

    /// Durable current-root record
    pub(super) roots: Arc<dyn RootStore>,

    /// Tree proofs are cut from; `None` until `start()` or the first rebuild
    pub(super) snapshot: RwLock<Option<Arc<TreeSnapshot>>>,

    /// Serializes read-leaves → build → publish
    pub(super) rebuild_lock: Mutex<()>,

    pub(super) state: watch::Sender<RegistryState>,
    pub(super) state_rx: watch::Receiver<RegistryState>,

    /// Backoff for storage reads and publishes
    pub(super) retry: RetryConfig,
}

impl ProvenanceRegistry {
    /// Create a registry over injected collaborators.
    ///
    /// Starts in `Created`; call [`start()`](Self::start) to load the tree.
    pub fn new(
        config: RegistryConfig,
        leaves: Arc<dyn LeafSource>,
        roots: Arc<dyn RootStore>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(RegistryState::Created);

        Self {
            config,
            leaves,
            roots,
            snapshot: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            state: state_tx,
            state_rx,
            retry: RetryConfig::query(),
        }
    }

    /// Override the storage retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> RegistryState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<RegistryState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), RegistryState::Ready | RegistryState::Rebuilding)
    }

    /// The snapshot proofs are currently cut from.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<TreeSnapshot>> {
        self.snapshot.read().clone()
    }

    pub(super) fn set_state(&self, state: RegistryState) {
        let _ = self.state.send(state);
        crate::metrics::set_registry_state(state);
    }

    pub(super) fn swap_snapshot(&self, snapshot: TreeSnapshot) {
        *self.snapshot.write() = Some(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests;
