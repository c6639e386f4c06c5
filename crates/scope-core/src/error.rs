use thiserror::Error;

use crate::types::StageKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A newer request of the same stage was issued before this one resolved.
    #[error("Stale {stage} response: generation {generation} superseded by {current}")]
    Stale { stage: StageKind, generation: u64, current: u64 },
}

impl Error {
    /// Only transport-level failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Error::Stale { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
