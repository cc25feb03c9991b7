//! Rebuild: snapshot the leaf set, build, publish, swap.

use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::resilience::retry::retry_if;
use crate::storage::traits::{LeafRecord, RootRecord, StorageError};

use super::{ProvenanceRegistry, RebuildReport, RegistryError, RegistryState, TreeSnapshot};

impl ProvenanceRegistry {
    /// Rebuild the tree from the current leaf set and publish its root.
    ///
    /// Serialized against other rebuilds. Storage failures are retried per
    /// the registry's retry policy; if they persist, nothing is published and
    /// the previous snapshot keeps serving proofs.
    ///
    /// An empty leaf set clears the stored record, so
    /// [`current_root()`](Self::current_root) returns `None` afterwards.
    #[instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<RebuildReport, RegistryError> {
        let _guard = self.rebuild_lock.lock().await;
        self.set_state(RegistryState::Rebuilding);

        let result = self.rebuild_locked().await;

        // Nothing was ever loaded: back to Created, as a failed start() leaves it
        let next_state = if result.is_ok() || self.snapshot.read().is_some() {
            RegistryState::Ready
        } else {
            RegistryState::Created
        };
        self.set_state(next_state);

        match &result {
            Ok(report) => crate::metrics::record_rebuild("success", report),
            Err(e) => {
                warn!(error = %e, "Rebuild failed; previous root left in place");
                crate::metrics::record_rebuild_failure();
            }
        }
        result
    }

    async fn rebuild_locked(&self) -> Result<RebuildReport, RegistryError> {
        let start = Instant::now();

        let leaves = self.read_leaves().await?;
        let mut snapshot = TreeSnapshot::build(&leaves, false);
        let root = snapshot.root();

        // An unreadable record is overwritten, never compared
        let (previous, unreadable) = match self.read_root_record().await {
            Ok(previous) => (previous, false),
            Err(StorageError::Corruption { key, reason }) => {
                warn!(%key, %reason, "Stored root record is unreadable; overwriting");
                (None, true)
            }
            Err(e) => return Err(e.into()),
        };

        let changed = if snapshot.is_empty() {
            let changed = previous.is_some() || unreadable;
            if changed {
                retry_if("clear_root", &self.retry, || self.roots.clear(), StorageError::is_retryable)
                    .await?;
                info!("Leaf set is empty; published root cleared");
            }
            changed
        } else {
            let unchanged = previous
                .as_ref()
                .map_or(false, |p| p.root == root && p.leaf_count == leaves.len() as u64);

            if unchanged {
                debug!(root = %root, "Rebuilt root matches published root; publish skipped");
            } else {
                let record = RootRecord::new(root, leaves.len() as u64);
                retry_if("publish_root", &self.retry, || self.roots.publish(&record), StorageError::is_retryable)
                    .await?;
                info!(
                    root = %root,
                    leaves = leaves.len(),
                    depth = snapshot.tree().depth(),
                    "Merkle root published"
                );
            }
            !unchanged
        };

        snapshot.mark_published();
        let report = RebuildReport {
            root: (!snapshot.is_empty()).then_some(root),
            leaf_count: snapshot.len(),
            depth: snapshot.tree().depth(),
            changed,
            elapsed: start.elapsed(),
        };
        self.swap_snapshot(snapshot);

        Ok(report)
    }

    /// One consistent read of the ordered leaf set.
    pub(super) async fn read_leaves(&self) -> Result<Vec<LeafRecord>, StorageError> {
        retry_if(
            "read_leaves",
            &self.retry,
            || self.leaves.eligible_leaves(),
            StorageError::is_retryable,
        )
        .await
    }

    pub(super) async fn read_root_record(&self) -> Result<Option<RootRecord>, StorageError> {
        retry_if(
            "read_root",
            &self.retry,
            || self.roots.current(),
            StorageError::is_retryable,
        )
        .await
    }
}
