use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::*;
use crate::certification::VerificationStatus;
use crate::merkle::Hash32;
use crate::storage::memory::{InMemoryLeafSource, InMemoryRootStore};
use crate::storage::traits::{LeafRecord, LeafSource, RootRecord, StorageError, TrackRecord};

fn leaf(byte: u8) -> Hash32 {
    Hash32([byte; 32])
}

fn certified(id: i64) -> TrackRecord {
    TrackRecord::new(id, Some(leaf(id as u8).to_hex()), VerificationStatus::Certified)
}

fn registry_with(
    tracks: Vec<TrackRecord>,
) -> (ProvenanceRegistry, Arc<InMemoryLeafSource>, Arc<InMemoryRootStore>) {
    let source: Arc<InMemoryLeafSource> = Arc::new(tracks.into_iter().collect());
    let roots = Arc::new(InMemoryRootStore::new());
    let registry = ProvenanceRegistry::new(RegistryConfig::default(), source.clone(), roots.clone())
        .with_retry(RetryConfig::test());
    (registry, source, roots)
}

/// Root store whose publish can be switched to fail.
#[derive(Default)]
struct FlakyRootStore {
    inner: InMemoryRootStore,
    fail_publish: AtomicBool,
}

#[async_trait]
impl RootStore for FlakyRootStore {
    async fn current(&self) -> Result<Option<RootRecord>, StorageError> {
        self.inner.current().await
    }

    async fn publish(&self, record: &RootRecord) -> Result<(), StorageError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("connection reset".into()));
        }
        self.inner.publish(record).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear().await
    }
}

/// Root store holding an undecodable record until something overwrites it.
struct CorruptRootStore {
    inner: InMemoryRootStore,
    corrupt: AtomicBool,
}

impl CorruptRootStore {
    fn new() -> Self {
        Self {
            inner: InMemoryRootStore::new(),
            corrupt: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl RootStore for CorruptRootStore {
    async fn current(&self) -> Result<Option<RootRecord>, StorageError> {
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(StorageError::Corruption {
                key: "merkle_root".into(),
                reason: "bad hex".into(),
            });
        }
        self.inner.current().await
    }

    async fn publish(&self, record: &RootRecord) -> Result<(), StorageError> {
        self.inner.publish(record).await?;
        self.corrupt.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear().await?;
        self.corrupt.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Leaf source whose per-track lookups time out a set number of times.
#[derive(Default)]
struct FlakyLeafSource {
    inner: InMemoryLeafSource,
    track_timeouts: AtomicUsize,
}

#[async_trait]
impl LeafSource for FlakyLeafSource {
    async fn eligible_leaves(&self) -> Result<Vec<LeafRecord>, StorageError> {
        self.inner.eligible_leaves().await
    }

    async fn track(&self, track_id: i64) -> Result<Option<TrackRecord>, StorageError> {
        let remaining = self.track_timeouts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.track_timeouts.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Backend("pool timed out".into()));
        }
        self.inner.track(track_id).await
    }
}

#[tokio::test]
async fn test_new_registry_is_created() {
    let (registry, _, _) = registry_with(vec![]);
    assert_eq!(registry.state(), RegistryState::Created);
    assert!(!registry.is_ready());
    assert!(registry.snapshot().is_none());
}

#[tokio::test]
async fn test_empty_registry_has_no_root() {
    let (registry, _, _) = registry_with(vec![]);
    registry.start().await.unwrap();

    assert!(registry.is_ready());
    assert!(registry.current_root().await.unwrap().is_none());

    let report = registry.rebuild().await.unwrap();
    assert_eq!(report.root, None);
    assert_eq!(report.leaf_count, 0);
    assert!(!report.changed);
    assert!(registry.current_root().await.unwrap().is_none());
}

#[tokio::test]
async fn test_rebuild_publishes_root_and_issues_proofs() {
    let (registry, _, roots) = registry_with((1..=5).map(certified).collect());
    registry.start().await.unwrap();

    // Nothing published yet: stale snapshot withholds proofs
    assert!(matches!(
        registry.proof_for_track(1).await,
        Err(RegistryError::NotReady(_))
    ));

    let report = registry.rebuild().await.unwrap();
    assert_eq!(report.leaf_count, 5);
    assert!(report.changed);

    let published = roots.current().await.unwrap().unwrap();
    assert_eq!(Some(published.root), report.root);
    assert_eq!(published.leaf_count, 5);

    for id in 1..=5 {
        let issued = registry.proof_for_track(id).await.unwrap();
        assert_eq!(issued.root, published.root);
        assert!(registry.verify(&issued.leaf, &issued.proof, &published.root));
        assert_eq!(registry.verify_track(id, None).await.unwrap(), Verdict::Verified);
    }
}

#[tokio::test]
async fn test_start_trusts_matching_stored_root() {
    let (registry, source, roots) = registry_with((1..=3).map(certified).collect());
    registry.rebuild().await.unwrap();

    // A fresh registry over the same storage serves proofs immediately
    let restarted = ProvenanceRegistry::new(RegistryConfig::default(), source, roots)
        .with_retry(RetryConfig::test());
    restarted.start().await.unwrap();
    assert!(restarted.snapshot().unwrap().is_published());
    assert!(restarted.proof_for_track(2).await.is_ok());
}

#[tokio::test]
async fn test_start_with_rebuild_on_start_publishes() {
    let source: Arc<InMemoryLeafSource> = Arc::new((1..=4).map(certified).collect());
    let roots = Arc::new(InMemoryRootStore::new());
    let config = RegistryConfig {
        rebuild_on_start: true,
        ..Default::default()
    };
    let registry = ProvenanceRegistry::new(config, source, roots.clone());

    registry.start().await.unwrap();
    assert_eq!(registry.state(), RegistryState::Ready);
    assert_eq!(roots.current().await.unwrap().unwrap().leaf_count, 4);
    assert!(registry.proof_for_track(4).await.is_ok());
}

#[tokio::test]
async fn test_not_found_reasons_are_distinct() {
    let tracks = vec![
        certified(1),
        certified(2),
        TrackRecord::new(3, Some(leaf(3).to_hex()), VerificationStatus::Pending),
        TrackRecord::new(4, None, VerificationStatus::Certified),
        TrackRecord::new(5, Some(leaf(5).to_hex()), VerificationStatus::Rejected),
    ];
    let (registry, source, _) = registry_with(tracks);
    registry.rebuild().await.unwrap();

    let reason = |r: Result<TrackProof, RegistryError>| match r {
        Err(RegistryError::NotFound { reason, .. }) => Some(reason),
        _ => None,
    };

    assert_eq!(reason(registry.proof_for_track(99).await), Some(NotFoundReason::UnknownTrack));
    assert_eq!(reason(registry.proof_for_track(3).await), Some(NotFoundReason::NotCertified));
    assert_eq!(reason(registry.proof_for_track(4).await), Some(NotFoundReason::NoLeaf));
    assert_eq!(reason(registry.proof_for_track(5).await), Some(NotFoundReason::NotCertified));

    // Certified after the last rebuild
    source.upsert(certified(6));
    assert_eq!(
        reason(registry.proof_for_track(6).await),
        Some(NotFoundReason::NotInPublishedTree)
    );

    assert_eq!(registry.verify_track(99, None).await.unwrap(), Verdict::UnknownTrack);
    assert_eq!(registry.verify_track(3, None).await.unwrap(), Verdict::NotCertified);
    assert_eq!(registry.verify_track(6, None).await.unwrap(), Verdict::RootMismatch);
}

#[tokio::test]
async fn test_changed_leaf_is_not_in_published_tree() {
    let (registry, source, _) = registry_with((1..=3).map(certified).collect());
    registry.rebuild().await.unwrap();

    source.upsert(TrackRecord::new(2, Some(leaf(0xaa).to_hex()), VerificationStatus::Certified));
    assert!(matches!(
        registry.proof_for_track(2).await,
        Err(RegistryError::NotFound { reason: NotFoundReason::NotInPublishedTree, .. })
    ));

    registry.rebuild().await.unwrap();
    assert_eq!(registry.proof_for_track(2).await.unwrap().leaf, leaf(0xaa));
}

#[tokio::test]
async fn test_verify_track_against_wrong_root_is_mismatch() {
    let (registry, _, _) = registry_with((1..=4).map(certified).collect());
    registry.rebuild().await.unwrap();

    assert_eq!(
        registry.verify_track(1, Some(leaf(0xff))).await.unwrap(),
        Verdict::RootMismatch
    );
}

#[tokio::test]
async fn test_rebuild_invalidates_old_proofs() {
    let (registry, source, _) = registry_with((1..=4).map(certified).collect());
    let first = registry.rebuild().await.unwrap();
    let old = registry.proof_for_track(1).await.unwrap();

    source.upsert(certified(5));
    let second = registry.rebuild().await.unwrap();
    assert_ne!(first.root, second.root);

    let new_root = second.root.unwrap();
    assert!(!registry.verify(&old.leaf, &old.proof, &new_root));
    assert_eq!(
        registry.verify_track(1, first.root).await.unwrap(),
        Verdict::RootMismatch
    );
    assert_eq!(registry.verify_track(1, None).await.unwrap(), Verdict::Verified);
}

#[tokio::test]
async fn test_unchanged_rebuild_skips_publish() {
    let (registry, _, roots) = registry_with((1..=3).map(certified).collect());
    registry.rebuild().await.unwrap();
    let first_published = roots.current().await.unwrap().unwrap();

    let report = registry.rebuild().await.unwrap();
    assert!(!report.changed);
    assert_eq!(roots.current().await.unwrap().unwrap(), first_published);
}

#[tokio::test]
async fn test_emptied_leaf_set_clears_root() {
    let (registry, source, _) = registry_with(vec![certified(1)]);
    registry.rebuild().await.unwrap();
    assert_eq!(registry.current_root().await.unwrap(), Some(leaf(1)));

    source.remove(1);
    let report = registry.rebuild().await.unwrap();
    assert!(report.changed);
    assert!(registry.current_root().await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_publish_keeps_previous_root_and_snapshot() {
    let source: Arc<InMemoryLeafSource> = Arc::new((1..=2).map(certified).collect());
    let roots = Arc::new(FlakyRootStore::default());
    let registry = ProvenanceRegistry::new(RegistryConfig::default(), source.clone(), roots.clone())
        .with_retry(RetryConfig::test());

    let first = registry.rebuild().await.unwrap();
    roots.fail_publish.store(true, Ordering::SeqCst);
    source.upsert(certified(3));

    assert!(matches!(registry.rebuild().await, Err(RegistryError::Storage(_))));
    assert_eq!(registry.state(), RegistryState::Ready);
    assert_eq!(registry.current_root().await.unwrap(), first.root);

    // Old snapshot still serves proofs that verify against the stored root
    let issued = registry.proof_for_track(1).await.unwrap();
    assert_eq!(Some(issued.root), first.root);
    assert_eq!(registry.verify_track(1, None).await.unwrap(), Verdict::Verified);
}

#[tokio::test]
async fn test_rebuild_overwrites_corrupt_root_record() {
    let source: Arc<InMemoryLeafSource> = Arc::new((1..=3).map(certified).collect());
    let roots = Arc::new(CorruptRootStore::new());
    let registry = ProvenanceRegistry::new(RegistryConfig::default(), source, roots.clone())
        .with_retry(RetryConfig::test());

    // Loads, but withholds proofs until the record is rewritten
    registry.start().await.unwrap();
    assert_eq!(registry.state(), RegistryState::Ready);
    assert!(matches!(
        registry.proof_for_track(1).await,
        Err(RegistryError::NotReady(_))
    ));
    assert!(matches!(
        registry.current_root().await,
        Err(RegistryError::Storage(StorageError::Corruption { .. }))
    ));

    let report = registry.rebuild().await.unwrap();
    assert!(report.changed);
    assert_eq!(registry.current_root().await.unwrap(), report.root);
    assert_eq!(roots.inner.current().await.unwrap().unwrap().leaf_count, 3);
    assert_eq!(registry.verify_track(2, None).await.unwrap(), Verdict::Verified);
}

#[tokio::test]
async fn test_start_rebuilds_over_corrupt_root_record() {
    let source: Arc<InMemoryLeafSource> = Arc::new((1..=4).map(certified).collect());
    let roots = Arc::new(CorruptRootStore::new());
    let config = RegistryConfig {
        rebuild_on_start: true,
        ..Default::default()
    };
    let registry = ProvenanceRegistry::new(config, source, roots).with_retry(RetryConfig::test());

    registry.start().await.unwrap();
    assert_eq!(registry.state(), RegistryState::Ready);
    assert!(registry.current_root().await.unwrap().is_some());
    assert!(registry.proof_for_track(4).await.is_ok());
}

#[tokio::test]
async fn test_corrupt_record_is_cleared_for_empty_leaf_set() {
    let roots = Arc::new(CorruptRootStore::new());
    let registry = ProvenanceRegistry::new(
        RegistryConfig::default(),
        Arc::new(InMemoryLeafSource::new()),
        roots,
    )
    .with_retry(RetryConfig::test());

    let report = registry.rebuild().await.unwrap();
    assert!(report.changed);
    assert_eq!(report.root, None);
    assert!(registry.current_root().await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_start_rebuild_returns_to_created() {
    let source: Arc<InMemoryLeafSource> = Arc::new((1..=2).map(certified).collect());
    let roots = Arc::new(FlakyRootStore::default());
    roots.fail_publish.store(true, Ordering::SeqCst);
    let config = RegistryConfig {
        rebuild_on_start: true,
        ..Default::default()
    };
    let registry = ProvenanceRegistry::new(config, source, roots).with_retry(RetryConfig::test());

    assert!(matches!(registry.start().await, Err(RegistryError::Storage(_))));
    assert_eq!(registry.state(), RegistryState::Created);
    assert!(registry.snapshot().is_none());
}

#[tokio::test]
async fn test_track_lookup_retries_transient_errors() {
    let source = Arc::new(FlakyLeafSource::default());
    for id in 1..=3 {
        source.inner.upsert(certified(id));
    }
    let registry = ProvenanceRegistry::new(
        RegistryConfig::default(),
        source.clone(),
        Arc::new(InMemoryRootStore::new()),
    )
    .with_retry(RetryConfig::test());
    registry.rebuild().await.unwrap();

    source.track_timeouts.store(2, Ordering::SeqCst);
    assert!(registry.proof_for_track(2).await.is_ok());
    assert_eq!(source.track_timeouts.load(Ordering::SeqCst), 0);

    // Still failing once the retry budget is spent
    source.track_timeouts.store(10, Ordering::SeqCst);
    assert!(matches!(
        registry.proof_for_track(2).await,
        Err(RegistryError::Storage(StorageError::Backend(_)))
    ));
}

#[tokio::test]
async fn test_single_track_proof_is_empty() {
    let (registry, _, _) = registry_with(vec![certified(42)]);
    let report = registry.rebuild().await.unwrap();
    assert_eq!(report.root, Some(leaf(42)));

    let issued = registry.proof_for_track(42).await.unwrap();
    assert!(issued.proof.is_empty());
    assert_eq!(registry.verify_track(42, None).await.unwrap(), Verdict::Verified);
}

#[tokio::test]
async fn test_concurrent_rebuilds_serialize() {
    let (registry, _, roots) = registry_with((1..=50).map(certified).collect());
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let r = registry.clone();
            tokio::spawn(async move { r.rebuild().await.map(|report| report.root) })
        })
        .collect();

    let mut roots_seen = Vec::new();
    for handle in handles {
        roots_seen.push(handle.await.unwrap().unwrap());
    }
    assert!(roots_seen.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(roots.current().await.unwrap().map(|r| r.root), roots_seen[0]);
}

#[tokio::test]
async fn test_run_exits_on_shutdown() {
    let (registry, _, _) = registry_with(vec![certified(1)]);
    let registry = Arc::new(registry);
    let (tx, rx) = tokio::sync::watch::channel(false);

    let runner = {
        let r = registry.clone();
        tokio::spawn(async move { r.run(rx).await })
    };
    tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), runner)
        .await
        .expect("run loop did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_run_rebuilds_periodically() {
    let source: Arc<InMemoryLeafSource> = Arc::new((1..=2).map(certified).collect());
    let roots = Arc::new(InMemoryRootStore::new());
    let config = RegistryConfig {
        rebuild_interval_secs: 1,
        ..Default::default()
    };
    let registry = Arc::new(ProvenanceRegistry::new(config, source, roots.clone()));
    let (tx, rx) = tokio::sync::watch::channel(false);

    let runner = {
        let r = registry.clone();
        tokio::spawn(async move { r.run(rx).await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(roots.current().await.unwrap().is_some());

    tx.send(true).unwrap();
    runner.await.unwrap();
}
