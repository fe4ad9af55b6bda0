use thiserror::Error;

use crate::model::RecordId;

/// Failures reported by the pool manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The result set cannot fill every slot and still leave a reserve.
    #[error("not enough results: need at least {needed}, got {available}")]
    InsufficientResults { needed: usize, available: usize },

    /// Nothing to swap: the reserve is empty or no slot is occupied.
    #[error("no eligible records to swap")]
    NoEligibleRecords,

    /// The pool has never been installed.
    #[error("pool has not been installed yet")]
    InvalidState,
}

/// Failures raised by a search provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed search response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Failures of a single refresh fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("not enough usable results: need at least {needed}, got {available}")]
    InsufficientResults { needed: usize, available: usize },

    #[error(transparent)]
    Duplicate(#[from] DuplicateRecord),
}

/// A result set was built with the same identifier twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate record identifier: {0}")]
pub struct DuplicateRecord(pub RecordId);
