// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic provenance-registry usage example.
//!
//! Demonstrates:
//! 1. Seeding a SQLite track table (temp file, no services needed)
//! 2. Starting the registry and publishing a root
//! 3. Issuing and verifying inclusion proofs
//! 4. Certifying a track and rebuilding
//! 5. Querying the HTTP routes in-process
//! 6. Displaying captured metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use provenance_registry::storage::sql::SqlStore;
use provenance_registry::{
    http, Hash32, ProvenanceRegistry, RegistryConfig, TrackRecord, VerificationStatus,
};
use sha3::{Digest, Keccak256};
use tower::ServiceExt;

/// Leaf for a track: keccak256 of its audio fingerprint.
fn leaf_for(fingerprint: &str) -> String {
    Hash32(Keccak256::digest(fingerprint.as_bytes()).into()).to_hex()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "provenance_registry=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║        provenance-registry: Basic Usage Example               ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Seed the track table
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let sql_url = format!("sqlite://{}?mode=rwc", dir.path().join("registry.db").display());
    let store = SqlStore::new(&sql_url).await?;

    let tracks = [
        (1, "nocturne-in-e-flat", "yes"),
        (2, "harbour-lights", "verified"),
        (3, "generated-loop-17", "ai"),
        (4, "field-recording-04", "pending"),
        (5, "lullaby-for-ada", "certified"),
    ];
    println!("📝 Seeding {} tracks...", tracks.len());
    for (id, fingerprint, status) in tracks {
        store
            .upsert_track(&TrackRecord::new(
                id,
                Some(leaf_for(fingerprint)),
                VerificationStatus::parse(status),
            ))
            .await?;
        println!("   ├─ #{id} {fingerprint:<22} status={status}");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Start and publish
    // ─────────────────────────────────────────────────────────────────────────
    let config = RegistryConfig {
        sql_url: Some(sql_url),
        rebuild_on_start: true,
        ..Default::default()
    };
    let registry = Arc::new(ProvenanceRegistry::connect(config).await?);
    registry.start().await?;

    let root = registry.current_root().await?;
    println!("\n🌳 Registry {}; published root:", registry.state());
    println!("   └─ {}", root.map(|r| r.to_hex()).unwrap_or_else(|| "(none)".into()));

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Proofs
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔎 Proofs:");
    for id in 1..=5 {
        match registry.proof_for_track(id).await {
            Ok(issued) => {
                let ok = registry.verify(&issued.leaf, &issued.proof, &issued.root);
                println!("   ├─ #{id}: {} steps, verified={ok}", issued.proof.len());
            }
            Err(e) => println!("   ├─ #{id}: {e}"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Certify and rebuild
    // ─────────────────────────────────────────────────────────────────────────
    store.mark_certified(4, "0x9f2c51e0").await?;
    println!("\n✅ Track #4 certified; before rebuild: {}", registry.verify_track(4, None).await?);
    let report = registry.rebuild().await?;
    println!(
        "   └─ rebuilt {} leaves (depth {}) in {:?}; verdict now: {}",
        report.leaf_count,
        report.depth,
        report.elapsed,
        registry.verify_track(4, None).await?
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 5. HTTP routes
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🌐 HTTP:");
    let app = http::router(registry.clone());
    for uri in ["/merkle-root", "/tracks/2/proof", "/tracks/3/verification"] {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty())?)
            .await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();
        println!("   ├─ GET {uri} → {status}");
        println!("   │  {}", String::from_utf8_lossy(&body));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    println!("\n👋 Done.\n");
    Ok(())
}

/// Print captured metrics grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = vec![];
    let mut gauges = vec![];
    let mut histograms = vec![];

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };
        let name = format!("{}{}", key.name(), label_str);

        match value {
            DebugValue::Counter(v) => counters.push((name, v.to_string())),
            DebugValue::Gauge(v) => gauges.push((name, format!("{:.2}", v.into_inner()))),
            DebugValue::Histogram(samples) => {
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, format!("count={} sum={:.4}", samples.len(), sum)));
            }
        }
    }

    for (title, mut rows) in [("Counters", counters), ("Gauges", gauges), ("Histograms", histograms)] {
        if rows.is_empty() {
            continue;
        }
        rows.sort();
        println!("   ┌─ {title}");
        for (name, value) in rows {
            println!("   │  └─ {name} = {value}");
        }
    }
}
