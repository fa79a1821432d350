// crates/atoll-reputation/src/lib.rs
//
// atoll-reputation: per-peer trust scoring for the Atoll overlay.
//
// Converts a stream of interaction outcomes into a single comparable
// score in [0, 1] per peer. Old interactions fade smoothly under
// exponential temporal decay rather than being abruptly discarded.

pub mod decay;
pub mod ledger;

pub use decay::attenuation;
pub use ledger::{Interaction, ReputationLedger, DEFAULT_SCORE};
