// crates/atoll-daemon/src/judge.rs
//
// Bridge between the transport layer and the admission engine.
//
// Implements the AdmissionJudge seam: every inbound handshake runs a
// full evaluate + commit cycle, and each committed decision is handed
// to the fanout worker for network-wide propagation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use atoll_admission::{AdmissionEngine, AdmissionRecord};
use atoll_core::{AdmissionJudge, AtollError, Candidate, JudgeOutcome};

/// Judges candidates with the admission engine and forwards committed
/// records to the broadcast worker.
pub struct EngineJudge {
    engine: Arc<AdmissionEngine>,
    /// Committed records queued for admission-update fanout.
    updates: mpsc::Sender<AdmissionRecord>,
}

impl EngineJudge {
    pub fn new(engine: Arc<AdmissionEngine>, updates: mpsc::Sender<AdmissionRecord>) -> Self {
        Self { engine, updates }
    }
}

#[async_trait]
impl AdmissionJudge for EngineJudge {
    async fn judge(&self, candidate: Candidate) -> Result<JudgeOutcome, AtollError> {
        let (verdict, record) = self.engine.decide(candidate).await?;

        // Propagation is best-effort; a saturated queue never blocks
        // the handshake path.
        if let Err(e) = self.updates.try_send(record.clone()) {
            tracing::warn!("Admission update #{} not queued for fanout: {}", record.sequence, e);
        }

        Ok(JudgeOutcome {
            accepted: verdict.accepted,
            score: verdict.aggregate,
            sequence: record.sequence,
        })
    }

    async fn confirm(&self, identity: &str) {
        if let Err(e) = self.engine.note_active(identity).await {
            tracing::debug!("Could not mark {} active: {}", identity, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atoll_admission::{AdmissionConfig, CandidateState};
    use atoll_core::PeerAddress;
    use atoll_directory::PeerDirectory;
    use atoll_reputation::ReputationLedger;
    use chrono::Utc;
    use std::collections::HashMap;

    fn judge_with_channel() -> (EngineJudge, mpsc::Receiver<AdmissionRecord>) {
        let engine = AdmissionEngine::new(
            AdmissionConfig::default(),
            PeerDirectory::new(),
            ReputationLedger::new(0.001, 50),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel(16);
        (EngineJudge::new(engine, tx), rx)
    }

    fn candidate(identity: &str) -> Candidate {
        let mut metadata = HashMap::new();
        for i in 0..5 {
            metadata.insert(format!("key-{}", i), "value".to_string());
        }
        Candidate {
            identity: identity.to_string(),
            address: Some(PeerAddress {
                host: "10.0.0.1".to_string(),
                port: 9000,
            }),
            declared_at: Some(Utc::now()),
            metadata,
        }
    }

    #[tokio::test]
    async fn judged_decisions_are_queued_for_fanout() {
        let (judge, mut rx) = judge_with_channel();
        let outcome = judge.judge(candidate("peer-alpha-9")).await.unwrap();
        assert!(outcome.accepted);

        let record = rx.recv().await.unwrap();
        assert_eq!(record.sequence, outcome.sequence);
        assert_eq!(record.identity, "peer-alpha-9");
    }

    #[tokio::test]
    async fn confirm_marks_the_peer_active() {
        let (judge, _rx) = judge_with_channel();
        judge.judge(candidate("peer-alpha-9")).await.unwrap();
        judge.confirm("peer-alpha-9").await;
        assert_eq!(
            judge.engine.candidate_state("peer-alpha-9").await,
            Some(CandidateState::Active)
        );
    }
}
