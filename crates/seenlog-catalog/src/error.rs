/// Failure talking to the remote catalog.
///
/// Every variant is transient from the caller's point of view: the core never
/// retries, it hands the error back so the triggering action can be repeated.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request timed out after {0}s")]
    Timeout(u64),

    #[error("catalog unreachable: {0}")]
    Connect(String),

    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("catalog response could not be decoded: {0}")]
    Decode(String),

    #[error("catalog transport error: {0}")]
    Transport(String),
}

impl CatalogError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Decode(_) | Self::Transport(_) => false,
        }
    }
}
