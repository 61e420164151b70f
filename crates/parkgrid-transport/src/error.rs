//! Transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid topic '{0}'")]
    InvalidTopic(String),

    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}
