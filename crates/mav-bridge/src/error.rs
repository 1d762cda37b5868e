use mav_link::KindId;
use thiserror::Error;

/// Why a payload could not be read as a given message type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("kind mismatch: expected {expected}, got {actual}")]
    KindMismatch { expected: KindId, actual: KindId },
    #[error("{name}: payload length {actual} exceeds {max}")]
    LengthMismatch {
        name: &'static str,
        max: usize,
        actual: usize,
    },
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Link(#[from] mav_link::LinkError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("metrics init error: {0}")]
    Metrics(String),
}
