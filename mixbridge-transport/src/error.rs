use std::fmt;

/// Errors surfaced by the transport-layer codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// A ring write returned fewer bytes than a precondition check
    /// guaranteed — per spec §4.B/§4.E this should be unreachable and
    /// is treated as fatal.
    ShortRingWrite,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ShortRingWrite => write!(f, "ring write returned fewer bytes than precomputed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Result type alias for `mixbridge-transport` operations.
pub type Result<T> = std::result::Result<T, TransportError>;
