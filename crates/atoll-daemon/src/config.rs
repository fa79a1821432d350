// crates/atoll-daemon/src/config.rs
//
// Runtime configuration for the Atoll daemon.
// Loaded from a TOML file or populated with sensible defaults; validated
// in full before any network activity begins.

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use serde::Deserialize;

use atoll_admission::{AdmissionConfig, CriterionWeights};
use atoll_core::{AtollError, PeerAddress};
use atoll_p2p::{DiscoveryConfig, FanoutConfig, TransportConfig};

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// This node's identity string, announced to the network.
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Host address the TCP transport binds to.
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// Port the TCP transport binds to.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Host advertised in discovery announcements (how peers reach us).
    #[serde(default = "default_advertise_host")]
    pub advertise_host: String,

    /// UDP port for discovery broadcast.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// Seconds between discovery announcements; the directory sweep
    /// runs on the same tick.
    #[serde(default = "default_discovery_interval_secs")]
    pub discovery_interval_secs: u64,

    /// Seconds of silence after which a peer is evicted.
    #[serde(default = "default_silence_window_secs")]
    pub silence_window_secs: u64,

    /// Criterion weights for the admission aggregate.
    #[serde(default)]
    pub weights: CriterionWeights,

    /// Aggregate score at or above which a candidate is accepted.
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,

    /// Seconds over which timestamp freshness decays linearly to zero.
    #[serde(default = "default_staleness_window_secs")]
    pub staleness_window_secs: u64,

    /// Reputation decay constant, per second.
    #[serde(default = "default_decay_lambda")]
    pub decay_lambda: f64,

    /// Interaction history capacity per peer.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Seconds allowed for outbound connection establishment.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds allowed for a handshake read or reply.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    /// Send attempts per peer in one broadcast round.
    #[serde(default = "default_broadcast_attempts")]
    pub broadcast_attempts: u32,

    /// Base backoff in milliseconds between broadcast attempts.
    #[serde(default = "default_broadcast_backoff_ms")]
    pub broadcast_backoff_ms: u64,

    /// Seconds allowed for one broadcast connect-and-send attempt.
    #[serde(default = "default_broadcast_timeout_secs")]
    pub broadcast_timeout_secs: u64,

    /// Seconds between health/status report lines.
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,

    /// Seconds between periodic chain verification passes.
    #[serde(default = "default_verify_interval_secs")]
    pub verify_interval_secs: u64,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Free-form metadata announced alongside our identity.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_identity() -> String {
    "atoll-node-01".to_string()
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    9400
}

fn default_advertise_host() -> String {
    "127.0.0.1".to_string()
}

fn default_discovery_port() -> u16 {
    9401
}

fn default_discovery_interval_secs() -> u64 {
    30
}

fn default_silence_window_secs() -> u64 {
    // Several discovery intervals with no refresh.
    90
}

fn default_acceptance_threshold() -> f64 {
    0.70
}

fn default_staleness_window_secs() -> u64 {
    60
}

fn default_decay_lambda() -> f64 {
    0.001
}

fn default_history_capacity() -> usize {
    50
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_handshake_timeout_secs() -> u64 {
    10
}

fn default_broadcast_attempts() -> u32 {
    3
}

fn default_broadcast_backoff_ms() -> u64 {
    250
}

fn default_broadcast_timeout_secs() -> u64 {
    5
}

fn default_health_interval_secs() -> u64 {
    60
}

fn default_verify_interval_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            advertise_host: default_advertise_host(),
            discovery_port: default_discovery_port(),
            discovery_interval_secs: default_discovery_interval_secs(),
            silence_window_secs: default_silence_window_secs(),
            weights: CriterionWeights::default(),
            acceptance_threshold: default_acceptance_threshold(),
            staleness_window_secs: default_staleness_window_secs(),
            decay_lambda: default_decay_lambda(),
            history_capacity: default_history_capacity(),
            connect_timeout_secs: default_connect_timeout_secs(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            broadcast_attempts: default_broadcast_attempts(),
            broadcast_backoff_ms: default_broadcast_backoff_ms(),
            broadcast_timeout_secs: default_broadcast_timeout_secs(),
            health_interval_secs: default_health_interval_secs(),
            verify_interval_secs: default_verify_interval_secs(),
            log_level: default_log_level(),
            metadata: HashMap::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &str) -> Result<Self, AtollError> {
        let contents =
            fs::read_to_string(path).map_err(|e| AtollError::Config(e.to_string()))?;
        toml::from_str(&contents).map_err(|e| AtollError::Config(e.to_string()))
    }

    /// Validate every field the core consumes.
    ///
    /// Invalid weight sums, out-of-range thresholds, or degenerate
    /// intervals fail fast; the daemon refuses to begin serving.
    pub fn validate(&self) -> Result<(), AtollError> {
        self.admission_config().validate()?;

        if self.identity.is_empty() {
            return Err(AtollError::Config("identity must not be empty".into()));
        }
        if self.decay_lambda < 0.0 {
            return Err(AtollError::Config(format!(
                "decay constant {} must be non-negative",
                self.decay_lambda
            )));
        }
        if self.history_capacity == 0 {
            return Err(AtollError::Config(
                "history capacity must be positive".into(),
            ));
        }
        if self.discovery_interval_secs == 0 || self.silence_window_secs == 0 {
            return Err(AtollError::Config(
                "discovery interval and silence window must be positive".into(),
            ));
        }
        if self.silence_window_secs < self.discovery_interval_secs {
            return Err(AtollError::Config(
                "silence window must cover at least one discovery interval".into(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            return Err(AtollError::Config("timeouts must be positive".into()));
        }
        if self.broadcast_attempts == 0 {
            return Err(AtollError::Config(
                "broadcast attempts must be at least 1".into(),
            ));
        }
        if self.health_interval_secs == 0 || self.verify_interval_secs == 0 {
            return Err(AtollError::Config(
                "health and verify intervals must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Address peers should dial us at, used in announcements.
    pub fn advertised_address(&self) -> PeerAddress {
        PeerAddress {
            host: self.advertise_host.clone(),
            port: self.listen_port,
        }
    }

    pub fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            weights: self.weights.clone(),
            threshold: self.acceptance_threshold,
            staleness_window: Duration::from_secs(self.staleness_window_secs),
        }
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            port: self.discovery_port,
            announce_interval: Duration::from_secs(self.discovery_interval_secs),
            silence_window: Duration::from_secs(self.silence_window_secs),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            listen_host: self.listen_host.clone(),
            listen_port: self.listen_port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
        }
    }

    pub fn fanout_config(&self) -> FanoutConfig {
        FanoutConfig {
            attempts: self.broadcast_attempts,
            backoff: Duration::from_millis(self.broadcast_backoff_ms),
            send_timeout: Duration::from_secs(self.broadcast_timeout_secs),
        }
    }
}
