use thiserror::Error;

pub type Result<T, E = LinkError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout")]
    Timeout,
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),
    #[error("link closed")]
    Closed,
}
