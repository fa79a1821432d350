// crates/atoll-core/src/peer.rs
//
// Canonical peer data structures for the Atoll overlay.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Network address of a peer: host and port pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A known peer in the directory.
///
/// Created on first discovery datagram or first inbound handshake,
/// refreshed on every subsequent sighting, and evicted only by the
/// directory sweep once the silence window elapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Opaque unique identity string declared by the peer.
    pub identity: String,
    /// Last address the peer was seen at.
    pub address: PeerAddress,
    /// When the peer was last heard from.
    pub last_seen: DateTime<Utc>,
    /// Free-form key/value metadata supplied at announce time.
    pub metadata: HashMap<String, String>,
}

/// A candidate peer awaiting an admission decision.
///
/// Unlike a [`PeerRecord`], a candidate may be structurally incomplete;
/// the handshake path hands incomplete peers to the admission engine so
/// that the rejection is scored and recorded rather than silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub identity: String,
    pub address: Option<PeerAddress>,
    /// Timestamp the candidate declared for itself, if any.
    pub declared_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

impl Candidate {
    /// True when every required field is present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.identity.is_empty()
            && self
                .address
                .as_ref()
                .map(|a| !a.host.is_empty() && a.port != 0)
                .unwrap_or(false)
            && self.declared_at.is_some()
    }

    /// Build a directory record from a complete candidate.
    ///
    /// Returns `None` if the candidate has no usable address.
    pub fn into_record(self, seen_at: DateTime<Utc>) -> Option<PeerRecord> {
        let address = self.address?;
        Some(PeerRecord {
            identity: self.identity,
            address,
            last_seen: seen_at,
            metadata: self.metadata,
        })
    }
}

impl From<&PeerRecord> for Candidate {
    fn from(record: &PeerRecord) -> Self {
        Candidate {
            identity: record.identity.clone(),
            address: Some(record.address.clone()),
            declared_at: Some(record.last_seen),
            metadata: record.metadata.clone(),
        }
    }
}

/// Outcome of a single interaction with a peer, fed into the
/// reputation ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionOutcome {
    Success,
    Failure,
    Neutral,
}

impl InteractionOutcome {
    /// Numeric value of the outcome on the [0, 1] trust axis.
    pub fn value(&self) -> f64 {
        match self {
            InteractionOutcome::Success => 1.0,
            InteractionOutcome::Failure => 0.0,
            InteractionOutcome::Neutral => 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_candidate() -> Candidate {
        Candidate {
            identity: "peer-alpha-01".to_string(),
            address: Some(PeerAddress {
                host: "10.0.0.7".to_string(),
                port: 9000,
            }),
            declared_at: Some(Utc::now()),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn complete_candidate_is_complete() {
        assert!(complete_candidate().is_complete());
    }

    #[test]
    fn missing_address_is_incomplete() {
        let mut c = complete_candidate();
        c.address = None;
        assert!(!c.is_complete());
        assert!(c.into_record(Utc::now()).is_none());
    }

    #[test]
    fn zero_port_is_incomplete() {
        let mut c = complete_candidate();
        c.address.as_mut().unwrap().port = 0;
        assert!(!c.is_complete());
    }

    #[test]
    fn outcome_values_span_the_trust_axis() {
        assert_eq!(InteractionOutcome::Success.value(), 1.0);
        assert_eq!(InteractionOutcome::Failure.value(), 0.0);
        assert_eq!(InteractionOutcome::Neutral.value(), 0.5);
    }
}
