// crates/atoll-admission/src/engine.rs
//
// AdmissionEngine: scores candidates against the reputation ledger and
// the peer directory, and commits every decision to the admission chain.
//
// Evaluation is freely concurrent; `commit` is the sole sequential
// bottleneck, since each record's correctness depends on knowing the
// immediately preceding hash, so only one commit is in flight at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use atoll_core::{AtollError, Candidate, InteractionOutcome};
use atoll_directory::PeerDirectory;
use atoll_reputation::ReputationLedger;

use crate::chain::{AdmissionChain, AdmissionRecord, Decision};
use crate::criteria::{
    score_freshness, score_identity, score_metadata, score_structural, AdmissionConfig,
    CriterionScores,
};
use crate::lifecycle::CandidateState;

/// The outcome of evaluating one candidate. Ephemeral: produced and
/// consumed within a single admission cycle, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionVerdict {
    pub candidate: Candidate,
    pub criteria: CriterionScores,
    pub aggregate: f64,
    pub threshold: f64,
    pub accepted: bool,
}

/// The single authority for admission decisions.
pub struct AdmissionEngine {
    config: AdmissionConfig,
    directory: PeerDirectory,
    ledger: ReputationLedger,
    /// Serializes every commit; the lock is held across hash
    /// computation and append.
    chain: Mutex<AdmissionChain>,
    states: RwLock<HashMap<String, CandidateState>>,
    /// Cleared when `verify_chain` finds a broken link; audit-dependent
    /// operations are untrustworthy until it is set again.
    integrity_ok: AtomicBool,
}

impl AdmissionEngine {
    /// Construct an engine over the shared directory and ledger.
    ///
    /// Fails fast on invalid configuration: the engine refuses to
    /// exist with weights that do not sum to 1.0.
    pub fn new(
        config: AdmissionConfig,
        directory: PeerDirectory,
        ledger: ReputationLedger,
    ) -> Result<Arc<Self>, AtollError> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            directory,
            ledger,
            chain: Mutex::new(AdmissionChain::new()),
            states: RwLock::new(HashMap::new()),
            integrity_ok: AtomicBool::new(true),
        }))
    }

    /// Score a candidate across all criteria as of now.
    pub async fn evaluate(&self, candidate: Candidate) -> Result<AdmissionVerdict, AtollError> {
        self.evaluate_at(candidate, Utc::now()).await
    }

    /// Score a candidate as of the given instant.
    ///
    /// Deterministic: identical candidate attributes, ledger state,
    /// configuration, and clock produce the same verdict.
    pub async fn evaluate_at(
        &self,
        candidate: Candidate,
        now: DateTime<Utc>,
    ) -> Result<AdmissionVerdict, AtollError> {
        self.advance_state(&candidate.identity, CandidateState::Evaluating)
            .await?;

        let conflict = match &candidate.address {
            Some(address) => {
                self.directory
                    .address_conflict(&candidate.identity, address)
                    .await
            }
            None => false,
        };

        let age_secs = candidate
            .declared_at
            .map(|t| (now - t).num_milliseconds() as f64 / 1000.0)
            // No declared timestamp: fully stale.
            .unwrap_or(f64::INFINITY);

        let criteria = CriterionScores {
            structural: score_structural(&candidate),
            identity: score_identity(&candidate, conflict),
            freshness: score_freshness(age_secs, self.config.staleness_window),
            reputation: self.ledger.score(&candidate.identity).await,
            metadata: score_metadata(&candidate),
        };

        let aggregate = criteria.aggregate(&self.config.weights);
        // An incomplete candidate is never admitted, whatever the
        // other criteria add up to.
        let accepted = criteria.structural > 0.0 && aggregate >= self.config.threshold;

        tracing::debug!(
            "Evaluated {}: aggregate {:.3} (threshold {:.2}) -> {}",
            candidate.identity,
            aggregate,
            self.config.threshold,
            if accepted { "accept" } else { "reject" }
        );

        Ok(AdmissionVerdict {
            candidate,
            criteria,
            aggregate,
            threshold: self.config.threshold,
            accepted,
        })
    }

    /// Append the verdict to the admission chain and feed the outcome
    /// into the reputation ledger.
    ///
    /// Serialized system-wide: the chain lock is held for the whole
    /// append so sequence indices reflect true commit order.
    pub async fn commit(&self, verdict: &AdmissionVerdict) -> Result<AdmissionRecord, AtollError> {
        let decision = if verdict.accepted {
            Decision::Accept
        } else {
            Decision::Reject
        };

        let record = {
            let mut chain = self.chain.lock().await;
            chain.append(
                &verdict.candidate.identity,
                decision,
                verdict.aggregate,
                Utc::now(),
            )
        };

        let outcome = match decision {
            Decision::Accept => InteractionOutcome::Success,
            Decision::Reject => InteractionOutcome::Failure,
        };
        self.ledger
            .record_outcome(&verdict.candidate.identity, outcome, 1.0)
            .await;

        let settled = match decision {
            Decision::Accept => CandidateState::Accepted,
            Decision::Reject => CandidateState::Rejected,
        };
        // The chain is the source of truth; lifecycle tracking stays
        // best-effort when two cycles for one identity interleave.
        if let Err(e) = self
            .advance_state(&verdict.candidate.identity, settled)
            .await
        {
            tracing::debug!(
                "Lifecycle for {} not advanced: {}",
                verdict.candidate.identity,
                e
            );
        }

        tracing::info!(
            "Admission #{}: {} {} (score {:.3})",
            record.sequence,
            decision,
            verdict.candidate.identity,
            verdict.aggregate
        );
        Ok(record)
    }

    /// Evaluate and commit in one admission cycle.
    pub async fn decide(&self, candidate: Candidate) -> Result<(AdmissionVerdict, AdmissionRecord), AtollError> {
        let verdict = self.evaluate(candidate).await?;
        let record = self.commit(&verdict).await?;
        Ok((verdict, record))
    }

    /// Walk the chain and confirm every link and sequence index.
    ///
    /// Returns the first broken index, or `None` if intact. A broken
    /// chain raises a critical alert and marks the audit log
    /// untrustworthy, but admission continues.
    pub async fn verify_chain(&self) -> Option<u64> {
        let chain = self.chain.lock().await;
        match chain.verify() {
            Some(index) => {
                self.integrity_ok.store(false, Ordering::SeqCst);
                tracing::error!(
                    "Admission chain integrity violation at record {}; audit export untrustworthy",
                    index
                );
                Some(index)
            }
            None => {
                self.integrity_ok.store(true, Ordering::SeqCst);
                None
            }
        }
    }

    /// Whether the last verification pass found the chain intact.
    pub fn chain_intact(&self) -> bool {
        self.integrity_ok.load(Ordering::SeqCst)
    }

    /// Number of committed admission records.
    pub async fn chain_len(&self) -> usize {
        self.chain.lock().await.len()
    }

    /// Serialize the chain for external audit. Read-only: exported
    /// data is never accepted back to mutate local state.
    pub async fn export_chain(&self) -> Result<String, AtollError> {
        self.chain.lock().await.export_json()
    }

    /// Ordered snapshot of the admission records.
    pub async fn chain_records(&self) -> Vec<AdmissionRecord> {
        self.chain.lock().await.records().to_vec()
    }

    /// Current lifecycle state for a candidate, if tracked.
    pub async fn candidate_state(&self, identity: &str) -> Option<CandidateState> {
        self.states.read().await.get(identity).copied()
    }

    /// Note a (re)discovery sighting; restarts the admission cycle.
    pub async fn note_discovered(&self, identity: &str) {
        let mut states = self.states.write().await;
        states.insert(identity.to_string(), CandidateState::Discovered);
    }

    /// Note a successful application-level handshake for an accepted
    /// peer.
    pub async fn note_active(&self, identity: &str) -> Result<(), AtollError> {
        self.advance_state(identity, CandidateState::Active).await
    }

    async fn advance_state(&self, identity: &str, next: CandidateState) -> Result<(), AtollError> {
        let mut states = self.states.write().await;
        let current = states
            .get(identity)
            .copied()
            .unwrap_or(CandidateState::Discovered);

        // A settled candidate showing up again is a rediscovery; the
        // cycle restarts rather than erroring.
        let current = if next == CandidateState::Evaluating
            && current != CandidateState::Discovered
        {
            current.transition(CandidateState::Discovered)?
        } else {
            current
        };

        let new_state = current.transition(next)?;
        states.insert(identity.to_string(), new_state);
        Ok(())
    }
}
