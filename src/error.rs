//! Error taxonomy shared by the request client, the refresher and uploads.

use http::StatusCode;
use thiserror::Error;

/// Why a credential refresh did not produce a new access credential.
///
/// Cloneable because a single refresh exchange is shared by every caller
/// that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("refresh endpoint rejected the session with status {status}")]
    Rejected { status: u16 },

    #[error("refresh response did not contain an access_token")]
    MissingCredential,

    #[error("refresh request failed: {0}")]
    Network(String),

    #[error("refresh response could not be parsed: {0}")]
    InvalidPayload(String),
}

/// Errors surfaced by calls against the receipt service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No response at all (connection refused, reset, DNS, ...).
    #[error("network failure: {0}")]
    Network(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Refresh(#[from] RefreshFailure),

    #[error("server error: HTTP {status}")]
    Server { status: u16 },

    #[error("client error: HTTP {status}")]
    Client { status: u16 },

    /// A 2xx response whose body did not match what the caller expected.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("upload cancelled")]
    Cancelled,

    #[error("file error: {0}")]
    File(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Classifies a non-success status. Callers should only pass statuses
    /// that failed `is_success()`; a 2xx maps to `InvalidResponse`.
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            ApiError::Unauthorized
        } else if status.is_server_error() {
            ApiError::Server {
                status: status.as_u16(),
            }
        } else if status.is_client_error() {
            ApiError::Client {
                status: status.as_u16(),
            }
        } else {
            ApiError::InvalidResponse(format!("unexpected status {}", status))
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status)
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::File(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_onto_the_taxonomy() {
        assert_eq!(
            ApiError::from_status(StatusCode::UNAUTHORIZED),
            ApiError::Unauthorized
        );
        assert_eq!(
            ApiError::from_status(StatusCode::FORBIDDEN),
            ApiError::Client { status: 403 }
        );
        assert_eq!(
            ApiError::from_status(StatusCode::BAD_GATEWAY),
            ApiError::Server { status: 502 }
        );
        assert!(matches!(
            ApiError::from_status(StatusCode::OK),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn refresh_failure_converts_into_api_error() {
        let err: ApiError = RefreshFailure::Rejected { status: 400 }.into();
        assert_eq!(
            err,
            ApiError::Refresh(RefreshFailure::Rejected { status: 400 })
        );
        assert!(!err.is_unauthorized());
    }
}
