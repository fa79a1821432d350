// crates/atoll-daemon/src/updates.rs
//
// Fanout worker: propagates committed admission decisions to the
// current peer set and feeds delivery outcomes back into reputation.

use tokio::sync::mpsc;

use atoll_admission::AdmissionRecord;
use atoll_core::{BroadcastEnvelope, EnvelopeKind, InteractionOutcome};
use atoll_directory::PeerDirectory;
use atoll_p2p::{broadcast, FanoutConfig};
use atoll_reputation::ReputationLedger;

/// Broadcast outcomes weigh less than admission decisions in the
/// reputation history.
const BROADCAST_OUTCOME_WEIGHT: f64 = 0.2;

/// Drain the update queue, broadcasting each committed record to every
/// peer in the directory.
///
/// Per-peer delivery results become light-weight reputation outcomes;
/// a round's failures never block the next round.
pub async fn run_update_fanout(
    mut updates: mpsc::Receiver<AdmissionRecord>,
    config: FanoutConfig,
    origin: String,
    directory: PeerDirectory,
    ledger: ReputationLedger,
) {
    while let Some(record) = updates.recv().await {
        let peers = directory.snapshot().await;
        if peers.is_empty() {
            continue;
        }

        let payload = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Update #{} not serializable: {}", record.sequence, e);
                continue;
            }
        };
        let envelope = BroadcastEnvelope {
            kind: EnvelopeKind::AdmissionUpdate,
            payload,
            origin: origin.clone(),
            sequence: Some(record.sequence),
        };

        let report = broadcast(&config, &envelope, &peers).await;
        tracing::info!(
            "Update #{}: reached {}/{} peers in {:?}",
            record.sequence,
            report.delivered.len(),
            peers.len(),
            report.elapsed
        );

        for identity in &report.delivered {
            ledger
                .record_outcome(identity, InteractionOutcome::Success, BROADCAST_OUTCOME_WEIGHT)
                .await;
        }
        for identity in &report.failed {
            ledger
                .record_outcome(identity, InteractionOutcome::Failure, BROADCAST_OUTCOME_WEIGHT)
                .await;
        }
    }
}
