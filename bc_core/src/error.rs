/// Error type shared across the Frame Source, Frame Broker, and both
/// Egress Transports.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("authentication rejected by upstream: {0}")]
    Auth(String),

    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected upstream stream layout: {0}")]
    UnexpectedStream(String),

    #[error("upstream protocol violation: {0}")]
    Protocol(String),

    #[error("frame of {size} bytes exceeds slot capacity of {capacity} bytes")]
    FrameTooLarge { size: usize, capacity: usize },

    #[error("codec pipeline error: {0}")]
    Codec(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
