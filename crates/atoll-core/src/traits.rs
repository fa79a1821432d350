// crates/atoll-core/src/traits.rs

use async_trait::async_trait;

use crate::error::AtollError;
use crate::peer::Candidate;

/// Result of judging a candidate, as seen by the transport layer.
#[derive(Debug, Clone, Copy)]
pub struct JudgeOutcome {
    pub accepted: bool,
    /// Aggregate score at decision time.
    pub score: f64,
    /// Sequence index of the committed admission record.
    pub sequence: u64,
}

/// Trait for deciding whether a candidate peer is admitted.
///
/// Implemented by the admission engine wiring in the daemon; the
/// transport layer invokes it for every inbound handshake without
/// depending on the admission crate directly.
#[async_trait]
pub trait AdmissionJudge: Send + Sync {
    /// Evaluate and commit a decision for the candidate.
    async fn judge(&self, candidate: Candidate) -> Result<JudgeOutcome, AtollError>;

    /// Note that an accepted candidate completed its first successful
    /// application-level handshake and is now active.
    async fn confirm(&self, identity: &str) {
        let _ = identity;
    }
}
