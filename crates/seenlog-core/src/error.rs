//! Error taxonomy for the seenlog core.

use seenlog_catalog::CatalogError;
use seenlog_schema::EpisodeId;
use seenlog_store::StoreError;
use thiserror::Error;

/// Every variant is recoverable by repeating the action that produced it.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Catalog or character fetch failed
    #[error("network error: {0}")]
    Network(#[from] CatalogError),

    /// Seen store read or write failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Character reference does not end in a numeric id
    #[error("malformed character reference: {reference}")]
    MalformedReference { reference: String },

    /// Episode id is not part of the current snapshot
    #[error("episode {0} is not in the current view")]
    UnknownEpisode(EpisodeId),
}

impl CoreError {
    pub fn malformed_reference(reference: impl Into<String>) -> Self {
        Self::MalformedReference {
            reference: reference.into(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
