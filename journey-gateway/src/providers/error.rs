//! Collaborator error types.

/// Errors from a planner, street-network or fare connector.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The backend answered something we could not decode
    #[error("JSON parse error: {message}")]
    Json { message: String },

    /// The connector cannot serve this mode or operation
    #[error("unsupported by {connector}: {what}")]
    Unsupported { connector: String, what: String },

    /// The backend is not reachable or overloaded
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Whether the failure is on the backend side (5xx or transport),
    /// as opposed to a request the backend rejected.
    pub fn is_technical(&self) -> bool {
        match self {
            ProviderError::Http(_) | ProviderError::Unavailable(_) => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::Json { .. } | ProviderError::Unsupported { .. } => false,
        }
    }
}
