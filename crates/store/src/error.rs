use thiserror::Error;

use pulse_core::DiscoverySessionId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("discovery session not found: {0}")]
    SessionNotFound(DiscoverySessionId),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}
