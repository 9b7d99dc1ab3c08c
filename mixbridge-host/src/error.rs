use std::fmt;

/// Errors surfaced by the host-facing half of the bridge.
#[derive(Debug)]
pub enum HostError {
    /// A ring write returned fewer bytes than a precondition check
    /// guaranteed (spec §4.E/§7: "partial ring write... fatal").
    FatalRingWrite,
    /// The host daemon rejected client creation, port registration, or
    /// activation.
    Jack(jack::Error),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::FatalRingWrite => write!(f, "output ring write returned fewer bytes than precomputed"),
            HostError::Jack(err) => write!(f, "host daemon error: {err}"),
        }
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HostError::FatalRingWrite => None,
            HostError::Jack(err) => Some(err),
        }
    }
}

impl From<jack::Error> for HostError {
    fn from(err: jack::Error) -> Self {
        HostError::Jack(err)
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
