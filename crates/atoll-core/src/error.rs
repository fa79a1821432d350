use thiserror::Error;

/// Overlay-wide error types for Atoll.
#[derive(Debug, Error)]
pub enum AtollError {
    /// Network error (TCP transport, UDP discovery, fanout).
    #[error("Network error: {0}")]
    Network(String),

    /// A network operation exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (rejected before any network activity begins).
    #[error("Config error: {0}")]
    Config(String),

    /// Invalid lifecycle state transition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Admission chain integrity violation.
    #[error("Chain integrity error: {0}")]
    ChainIntegrity(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for AtollError {
    fn from(e: serde_json::Error) -> Self {
        AtollError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for AtollError {
    fn from(e: std::io::Error) -> Self {
        AtollError::Network(e.to_string())
    }
}
