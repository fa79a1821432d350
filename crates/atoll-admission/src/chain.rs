// crates/atoll-admission/src/chain.rs
//
// The admission chain: an append-only, hash-linked sequence of
// admission decisions.
//
// This is a local, single-writer audit log, not a consensus ledger.
// Record n's previous-hash equals the content hash of record n-1;
// record 0 links to a fixed genesis constant. Appends must be
// serialized by the caller (the engine holds the chain behind a mutex).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atoll_core::hash::{sha256_hex, GENESIS_HASH};
use atoll_core::AtollError;

/// Accept/reject outcome of one admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Accept => write!(f, "accept"),
            Decision::Reject => write!(f, "reject"),
        }
    }
}

/// One committed admission decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionRecord {
    /// Monotonic sequence index; 0 is the genesis record.
    pub sequence: u64,
    /// Identity of the candidate the decision concerns.
    pub identity: String,
    pub decision: Decision,
    /// Aggregate admission score at decision time.
    pub score: f64,
    pub timestamp: DateTime<Utc>,
    /// Content hash of the preceding record (genesis constant for 0).
    pub previous_hash: String,
    /// Content hash of this record.
    pub hash: String,
}

impl AdmissionRecord {
    /// Canonical preimage string hashed into the content hash.
    ///
    /// The score is fixed to six decimal places so the hash is stable
    /// across serialization round trips.
    fn preimage(
        sequence: u64,
        identity: &str,
        decision: Decision,
        score: f64,
        timestamp: &DateTime<Utc>,
        previous_hash: &str,
    ) -> String {
        format!(
            "{}|{}|{}|{:.6}|{}|{}",
            sequence,
            identity,
            decision,
            score,
            timestamp.timestamp_millis(),
            previous_hash
        )
    }

    /// Recompute this record's content hash from its fields.
    pub fn content_hash(&self) -> String {
        sha256_hex(
            Self::preimage(
                self.sequence,
                &self.identity,
                self.decision,
                self.score,
                &self.timestamp,
                &self.previous_hash,
            )
            .as_bytes(),
        )
    }
}

/// Append-only sequence of admission records.
///
/// Not internally synchronized; the engine serializes every append.
#[derive(Debug, Default)]
pub struct AdmissionChain {
    records: Vec<AdmissionRecord>,
}

impl AdmissionChain {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Hash the next record must link to.
    fn tip_hash(&self) -> String {
        self.records
            .last()
            .map(|r| r.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    /// Append a new decision, linking it to the current tip.
    pub fn append(
        &mut self,
        identity: &str,
        decision: Decision,
        score: f64,
        timestamp: DateTime<Utc>,
    ) -> AdmissionRecord {
        let sequence = self.records.len() as u64;
        let previous_hash = self.tip_hash();
        let hash = sha256_hex(
            AdmissionRecord::preimage(
                sequence,
                identity,
                decision,
                score,
                &timestamp,
                &previous_hash,
            )
            .as_bytes(),
        );

        let record = AdmissionRecord {
            sequence,
            identity: identity.to_string(),
            decision,
            score,
            timestamp,
            previous_hash,
            hash,
        };
        self.records.push(record.clone());
        record
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Walk the full sequence and return the index of the first record
    /// that breaks the chain, or `None` if the chain is intact.
    ///
    /// A record breaks the chain when its sequence index is not exactly
    /// one past its predecessor's, its previous-hash does not match the
    /// predecessor's recomputed content hash, or its own stored hash
    /// does not match its recomputed content hash.
    pub fn verify(&self) -> Option<u64> {
        let mut expected_previous = GENESIS_HASH.to_string();
        for (index, record) in self.records.iter().enumerate() {
            if record.sequence != index as u64 {
                return Some(index as u64);
            }
            if record.previous_hash != expected_previous {
                return Some(index as u64);
            }
            let recomputed = record.content_hash();
            if record.hash != recomputed {
                return Some(index as u64);
            }
            expected_previous = recomputed;
        }
        None
    }

    /// Ordered snapshot of every record, for audit export.
    pub fn records(&self) -> &[AdmissionRecord] {
        &self.records
    }

    /// Serialize the full chain as JSON for external inspection.
    ///
    /// Read-only: exported chains are never accepted back as input.
    pub fn export_json(&self) -> Result<String, AtollError> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }
}
