use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Credentials or other settings are missing.
    #[error("{0}")]
    Configuration(String),
    #[error("network error: {0}")]
    Network(String),
    /// Upstream rejected the login or returned a malformed login envelope.
    #[error("login failed: {0}")]
    Authentication(String),
    /// A data endpoint answered with an HTML page instead of JSON.
    #[error("session expired while fetching {0}")]
    SessionExpired(String),
    #[error("no device discovered for plant {0}")]
    NoDevice(String),
    #[error("invalid response from {0}: {1}")]
    InvalidResponse(String, String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors after which the stored login should not be trusted any more.
    pub fn is_session_problem(&self) -> bool {
        matches!(
            self,
            Error::Authentication(_) | Error::SessionExpired(_) | Error::Configuration(_)
        )
    }
}

/// Map transport-level `reqwest` failures to `Error`
pub(crate) fn map_api_err(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Network(format!("upstream request timed out: {}", error))
    } else {
        Error::Network(error.to_string())
    }
}
