// crates/atoll-admission/src/lib.rs
//
// atoll-admission: the single authority deciding whether a candidate
// peer enters the active peer set, and the only writer of the
// hash-chained admission record log.
//
// Three cooperating modules with different invariants: `criteria`
// (freely recomputable scoring), `chain` (append-only, serialized
// writes), and `engine` (glue plus the per-candidate lifecycle).

pub mod chain;
pub mod criteria;
pub mod engine;
pub mod lifecycle;

pub use chain::{AdmissionChain, AdmissionRecord, Decision};
pub use criteria::{AdmissionConfig, CriterionScores, CriterionWeights};
pub use engine::{AdmissionEngine, AdmissionVerdict};
pub use lifecycle::CandidateState;
