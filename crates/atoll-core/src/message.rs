// crates/atoll-core/src/message.rs
//
// Wire formats for the Atoll overlay.
//
// The discovery datagram and the transport handshake share one shape
// (`PeerHello`) so inbound-connection peers flow through the same
// admission path as discovered peers. All messages are JSON; unknown
// fields are ignored for forward compatibility, missing required fields
// cause the message to be dropped by the receiving component.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::peer::{Candidate, PeerAddress};

/// Announcement of a peer's presence: sent as a UDP broadcast datagram
/// by the discovery listener and as the first message of the TCP
/// handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerHello {
    pub identity: Option<String>,
    pub address: Option<PeerAddress>,
    /// Declared wall-clock time, integer epoch seconds.
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PeerHello {
    /// True when all fields a discovery datagram requires are present
    /// and usable.
    pub fn is_well_formed(&self) -> bool {
        self.identity.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
            && self
                .address
                .as_ref()
                .map(|a| !a.host.is_empty() && a.port != 0)
                .unwrap_or(false)
            && self.timestamp.is_some()
    }

    /// Declared timestamp as UTC, if present and in range.
    pub fn declared_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Convert into an admission candidate, tolerating missing fields.
    pub fn into_candidate(self) -> Candidate {
        let declared_at = self.declared_at();
        Candidate {
            identity: self.identity.unwrap_or_default(),
            address: self.address,
            declared_at,
            metadata: self.metadata,
        }
    }
}

/// Reply sent on the handshake connection after the admission decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeReply {
    /// "accepted" or "rejected".
    pub status: String,
    /// Identity of the deciding node.
    pub origin: String,
    /// Aggregate admission score at decision time.
    pub score: f64,
    /// Sequence index of the admission record for this decision.
    pub sequence: u64,
}

/// Kind tag for broadcast envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeKind {
    AdmissionUpdate,
    PeerAnnounce,
    Generic,
}

/// Envelope wrapping every fanout message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub kind: EnvelopeKind,
    pub payload: serde_json::Value,
    /// Identity of the originating node.
    pub origin: String,
    /// Chain sequence index; set only for `AdmissionUpdate`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}
