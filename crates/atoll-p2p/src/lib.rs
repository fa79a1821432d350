// crates/atoll-p2p/src/lib.rs
//
// atoll-p2p: networking layer for the Atoll overlay.
//
// Provides UDP broadcast peer discovery, the TCP transport with its
// admission handshake, and concurrent fanout of state-changing
// messages to the current peer set.

pub mod discovery;
pub mod fanout;
pub mod transport;

pub use discovery::{DiscoveryConfig, DiscoveryListener};
pub use fanout::{broadcast, BroadcastReport, FanoutConfig};
pub use transport::{Transport, TransportConfig};
