// crates/atoll-admission/src/lifecycle.rs
//
// Per-candidate admission lifecycle.
//
// Valid transitions:
//   Discovered -> Evaluating -> Accepted | Rejected
//   Accepted -> Active (first successful handshake)
//   Active | Accepted | Rejected -> Discovered (loss + rediscovery;
//   a fresh admission cycle always runs; acceptance is never cached
//   indefinitely)

use std::fmt;

use serde::{Deserialize, Serialize};

use atoll_core::AtollError;

/// Lifecycle states of a candidate peer, tracked per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateState {
    /// Seen in a discovery datagram or inbound handshake.
    Discovered,
    /// Currently being scored by the admission engine.
    Evaluating,
    /// Admitted; not yet confirmed over the transport.
    Accepted,
    /// Refused admission.
    Rejected,
    /// Admitted and confirmed by a successful handshake.
    Active,
}

impl fmt::Display for CandidateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateState::Discovered => write!(f, "Discovered"),
            CandidateState::Evaluating => write!(f, "Evaluating"),
            CandidateState::Accepted => write!(f, "Accepted"),
            CandidateState::Rejected => write!(f, "Rejected"),
            CandidateState::Active => write!(f, "Active"),
        }
    }
}

impl CandidateState {
    /// Attempt a transition, returning the new state.
    pub fn transition(self, next: CandidateState) -> Result<CandidateState, AtollError> {
        // Rediscovery restarts the cycle from any settled state.
        if next == CandidateState::Discovered {
            return Ok(next);
        }

        let valid = matches!(
            (self, next),
            (CandidateState::Discovered, CandidateState::Evaluating)
                | (CandidateState::Evaluating, CandidateState::Accepted)
                | (CandidateState::Evaluating, CandidateState::Rejected)
                | (CandidateState::Accepted, CandidateState::Active)
        );

        if valid {
            Ok(next)
        } else {
            Err(AtollError::InvalidState(format!(
                "invalid candidate transition: {} -> {}",
                self, next
            )))
        }
    }
}
