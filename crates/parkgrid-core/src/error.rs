//! Error types for configuration, sensor ingestion and command decoding.

use thiserror::Error;

/// Fatal startup errors: the daemon refuses to run with these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Reasons an inbound sensor reading is rejected at ingestion.
#[derive(Debug, Error, PartialEq)]
pub enum ReadingError {
    #[error("unknown lot: {0}")]
    UnknownLot(String),

    #[error("capacity mismatch: expected {expected}, got {actual}")]
    CapacityMismatch { expected: u32, actual: u32 },

    #[error("occupancy {occupancy} outside 0..={capacity}")]
    OccupancyOutOfRange { occupancy: i64, capacity: u32 },

    #[error("queue length {queue} outside 0..={max_queue}")]
    QueueOutOfRange { queue: i64, max_queue: u32 },

    #[error("field {0} is negative or not finite")]
    InvalidNumber(&'static str),

    #[error("counter {0} went backwards")]
    CounterRegressed(&'static str),
}

/// Reasons a control command cannot be turned into an action.
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown action kind: {0}")]
    UnknownAction(String),

    #[error("action {action} is missing parameter {parameter}")]
    MissingParameter {
        action: &'static str,
        parameter: &'static str,
    },

    #[error("action {action} has invalid parameter {parameter}")]
    InvalidParameter {
        action: &'static str,
        parameter: &'static str,
    },
}
