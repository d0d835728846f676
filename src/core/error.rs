//! Failures at the remote API boundary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchError>;

/// Errors raised while talking to the remote account API.
///
/// Variants hold rendered messages so a single failed request can be shared
/// with every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport or connection failure, including 5xx responses
    #[error("Network error: {0}")]
    Network(String),

    /// The account name is not known to the API or the store
    #[error("Account not found: {0}")]
    NotFound(String),

    /// The response body did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Only transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::MalformedResponse(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}
