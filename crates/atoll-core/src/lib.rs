// crates/atoll-core/src/lib.rs
//
// atoll-core: Core types, wire messages, and hashing primitives for the
// Atoll peer overlay.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines the canonical peer data structures, the discovery/handshake
// wire formats, the error type, and the trait seam between the transport
// layer and the admission engine.

pub mod error;
pub mod hash;
pub mod message;
pub mod peer;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use atoll_core::PeerRecord;`

// Peer types
pub use peer::{Candidate, InteractionOutcome, PeerAddress, PeerRecord};

// Wire messages
pub use message::{BroadcastEnvelope, EnvelopeKind, HandshakeReply, PeerHello};

// Error type
pub use error::AtollError;

// Traits
pub use traits::{AdmissionJudge, JudgeOutcome};
