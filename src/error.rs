//! Crate-wide error types for the small number of fallible constructors
//! and I/O boundaries. Per-event outcomes (drift, integrity, spikes) are
//! never `Result`; they are local flags, not exceptions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("frame length {len} exceeds MAX_FRAME_LEN {max}")]
    TooLarge { len: u32, max: u32 },
    #[error("connection closed")]
    Eof,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FlightRecorderError {
    #[error("io error writing incident bundle: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
