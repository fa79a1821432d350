// crates/atoll-daemon/src/status.rs
//
// Periodic health reporting and chain verification loops.

use std::sync::Arc;
use std::time::{Duration, Instant};

use atoll_admission::AdmissionEngine;
use atoll_directory::PeerDirectory;
use atoll_reputation::ReputationLedger;

/// Log a status line on a fixed interval: directory size, tracked
/// reputation entries, network health, chain length, and integrity.
pub async fn run_health_loop(
    directory: PeerDirectory,
    ledger: ReputationLedger,
    engine: Arc<AdmissionEngine>,
    interval: Duration,
    started: Instant,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let peers = directory.len().await;
        let tracked = ledger.tracked().await;
        let health = ledger.network_health().await;
        let chain_len = engine.chain_len().await;

        tracing::info!(
            "Status: {} peers, {} tracked, health {:.3}, {} admission records, chain {}, uptime {}s",
            peers,
            tracked,
            health,
            chain_len,
            if engine.chain_intact() { "intact" } else { "BROKEN" },
            started.elapsed().as_secs()
        );
    }
}

/// Re-verify the admission chain on a fixed interval.
///
/// A violation is surfaced as a critical alert by the engine; admission
/// keeps running, but the audit export is untrustworthy until resolved.
pub async fn run_verify_loop(engine: Arc<AdmissionEngine>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Some(index) = engine.verify_chain().await {
            tracing::error!("Periodic chain verification failed at record {}", index);
        } else {
            tracing::debug!("Periodic chain verification passed");
        }
    }
}
