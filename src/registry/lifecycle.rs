//! Registry lifecycle: connect, start, periodic rebuild loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::RegistryConfig;
use crate::storage::redis::RedisRootStore;
use crate::storage::sql::SqlStore;
use crate::storage::traits::{RootStore, StorageError};

use super::{ProvenanceRegistry, RegistryError, RegistryState, TreeSnapshot};

impl ProvenanceRegistry {
    /// Build a registry from configuration.
    ///
    /// `sql_url` is required: it provides the track table and, unless
    /// `redis_url` is set, the root record too.
    pub async fn connect(config: RegistryConfig) -> Result<Self, RegistryError> {
        let Some(ref sql_url) = config.sql_url else {
            return Err(RegistryError::NotReady("sql_url is required to connect"));
        };

        info!("Connecting to SQL leaf source...");
        let sql = Arc::new(SqlStore::new(sql_url).await.map_err(|e| {
            error!(error = %e, "Failed to connect to SQL");
            crate::metrics::record_connection_error("sql");
            e
        })?);

        let roots: Arc<dyn RootStore> = match config.redis_url {
            Some(ref redis_url) => {
                info!("Publishing roots to Redis");
                let store = RedisRootStore::with_prefix(redis_url, config.redis_prefix.as_deref())
                    .await
                    .map_err(|e| {
                        error!(error = %e, "Failed to connect to Redis");
                        crate::metrics::record_connection_error("redis");
                        e
                    })?;
                Arc::new(store)
            }
            None => sql.clone(),
        };

        Ok(Self::new(config, sql, roots))
    }

    /// Load the tree for the current leaf set and reconcile it with the
    /// stored root.
    ///
    /// - Stored root equals the rebuilt root → snapshot serves proofs
    /// - Both empty → ready, nothing to prove
    /// - Mismatch or unreadable record → with `rebuild_on_start`, rebuild and
    ///   publish; otherwise keep the snapshot unpublished and refuse proofs
    ///   until a rebuild
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), RegistryError> {
        self.set_state(RegistryState::Loading);

        let loaded = async {
            let leaves = self.read_leaves().await?;
            // `None` when the stored record cannot be decoded
            let stored = match self.read_root_record().await {
                Ok(stored) => Some(stored),
                Err(StorageError::Corruption { key, reason }) => {
                    warn!(%key, %reason, "Stored root record is unreadable; treating it as stale");
                    None
                }
                Err(e) => return Err(e),
            };
            Ok::<_, StorageError>((leaves, stored))
        }
        .await;

        let (leaves, stored) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                self.set_state(RegistryState::Created);
                return Err(e.into());
            }
        };

        let mut snapshot = TreeSnapshot::build(&leaves, false);
        let readable = stored.is_some();
        let stored_root = stored.flatten().map(|r| r.root);
        let built_root = (!snapshot.is_empty()).then(|| snapshot.root());

        if readable && stored_root == built_root {
            snapshot.mark_published();
            info!(
                leaves = snapshot.len(),
                root = ?built_root,
                "Registry loaded; stored root matches leaf set"
            );
            crate::metrics::set_leaf_count(snapshot.len());
            self.swap_snapshot(snapshot);
            self.set_state(RegistryState::Ready);
            return Ok(());
        }

        if self.config.rebuild_on_start {
            info!(
                stored = ?stored_root,
                built = ?built_root,
                "Stored root is stale; rebuilding on start"
            );
            self.rebuild().await?;
            return Ok(());
        }

        warn!(
            stored = ?stored_root,
            built = ?built_root,
            "Stored root does not match leaf set; proofs withheld until rebuild"
        );
        self.swap_snapshot(snapshot);
        self.set_state(RegistryState::Ready);
        Ok(())
    }

    /// Periodic rebuild loop.
    ///
    /// Rebuilds every `rebuild_interval_secs` until `shutdown` flips to
    /// `true`. With the interval at 0 it just waits for shutdown. A failed
    /// rebuild is logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval_secs = self.config.rebuild_interval_secs;

        if interval_secs == 0 {
            info!("Periodic rebuild disabled");
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            return;
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        // First tick fires immediately; start() already loaded the tree
        ticker.tick().await;

        info!(interval_secs, "Periodic rebuild loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.rebuild().await {
                        warn!(error = %e, "Scheduled rebuild failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Rebuild loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}
