// crates/atoll-admission/src/criteria.rs
//
// Admission criteria: five normalized sub-scores and their weights.
//
// Each criterion maps a candidate attribute onto [0, 1]; the aggregate
// is the weighted sum. Weights must sum to 1.0 and are validated before
// the engine is constructed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use atoll_core::{AtollError, Candidate};

/// Identity length at which the identity-quality criterion saturates.
const IDENTITY_FULL_LENGTH: usize = 8;

/// Metadata key count at which the richness criterion saturates.
const METADATA_FULL_KEYS: usize = 5;

/// Per-criterion weights for the aggregate admission score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionWeights {
    #[serde(default = "default_structural")]
    pub structural: f64,
    #[serde(default = "default_identity")]
    pub identity: f64,
    #[serde(default = "default_freshness")]
    pub freshness: f64,
    #[serde(default = "default_reputation")]
    pub reputation: f64,
    #[serde(default = "default_metadata")]
    pub metadata: f64,
}

fn default_structural() -> f64 {
    0.25
}

fn default_identity() -> f64 {
    0.20
}

fn default_freshness() -> f64 {
    0.20
}

fn default_reputation() -> f64 {
    0.20
}

fn default_metadata() -> f64 {
    0.15
}

impl Default for CriterionWeights {
    fn default() -> Self {
        Self {
            structural: default_structural(),
            identity: default_identity(),
            freshness: default_freshness(),
            reputation: default_reputation(),
            metadata: default_metadata(),
        }
    }
}

impl CriterionWeights {
    /// Validate that every weight lies in [0, 1] and the sum is 1.0.
    pub fn validate(&self) -> Result<(), AtollError> {
        let all = [
            self.structural,
            self.identity,
            self.freshness,
            self.reputation,
            self.metadata,
        ];
        for w in all {
            if !(0.0..=1.0).contains(&w) {
                return Err(AtollError::Config(format!(
                    "criterion weight {} outside [0, 1]",
                    w
                )));
            }
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(AtollError::Config(format!(
                "criterion weights sum to {}, expected 1.0",
                sum
            )));
        }
        Ok(())
    }
}

/// Static configuration of the admission engine.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub weights: CriterionWeights,
    /// Aggregate score at or above which a candidate is accepted.
    pub threshold: f64,
    /// Window over which timestamp freshness decays linearly to zero.
    pub staleness_window: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            weights: CriterionWeights::default(),
            threshold: 0.70,
            staleness_window: Duration::from_secs(60),
        }
    }
}

impl AdmissionConfig {
    pub fn validate(&self) -> Result<(), AtollError> {
        self.weights.validate()?;
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(AtollError::Config(format!(
                "acceptance threshold {} outside (0, 1]",
                self.threshold
            )));
        }
        if self.staleness_window.is_zero() {
            return Err(AtollError::Config(
                "staleness window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sub-scores computed for one candidate, each in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CriterionScores {
    pub structural: f64,
    pub identity: f64,
    pub freshness: f64,
    pub reputation: f64,
    pub metadata: f64,
}

impl CriterionScores {
    /// Weighted aggregate of the sub-scores.
    pub fn aggregate(&self, weights: &CriterionWeights) -> f64 {
        self.structural * weights.structural
            + self.identity * weights.identity
            + self.freshness * weights.freshness
            + self.reputation * weights.reputation
            + self.metadata * weights.metadata
    }
}

/// Structural completeness: 1.0 when every required field is present,
/// 0.0 otherwise. An incomplete candidate is never admitted regardless
/// of the other criteria.
pub fn score_structural(candidate: &Candidate) -> f64 {
    if candidate.is_complete() {
        1.0
    } else {
        0.0
    }
}

/// Identity quality: rewards identifiers of sufficient length; an
/// identity already claimed under a conflicting address scores zero.
pub fn score_identity(candidate: &Candidate, address_conflict: bool) -> f64 {
    if candidate.identity.is_empty() || address_conflict {
        return 0.0;
    }
    (candidate.identity.len() as f64 / IDENTITY_FULL_LENGTH as f64).min(1.0)
}

/// Timestamp freshness: decays linearly to zero over the staleness
/// window. Future-dated timestamps clamp to full freshness.
pub fn score_freshness(age_secs: f64, window: Duration) -> f64 {
    let age = age_secs.max(0.0);
    (1.0 - age / window.as_secs_f64()).clamp(0.0, 1.0)
}

/// Declared-metadata richness: saturates once the candidate supplies
/// enough keys.
pub fn score_metadata(candidate: &Candidate) -> f64 {
    (candidate.metadata.len() as f64 / METADATA_FULL_KEYS as f64).min(1.0)
}
