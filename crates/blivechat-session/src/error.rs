//! Error types for the session layer.

/// Errors from the HTTP collaborators and the open-platform game session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Every configured endpoint has its circuit breaker open.
    #[error("no API endpoint available")]
    NoEndpoint,

    /// The request failed at the HTTP level (connect, timeout, non-2xx
    /// status or an undecodable body).
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The platform answered with a non-zero business code.
    #[error("API returned code {code}: {message}")]
    Api { code: i64, message: String },

    /// `start_game` rejected the room owner's auth code. Retrying with the
    /// same code cannot succeed.
    #[error("auth code rejected: {0}")]
    AuthCodeInvalid(String),

    /// A successful response was missing a field the client needs.
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),

    /// Anything else, mostly for test doubles.
    #[error("{0}")]
    Other(String),
}

impl SessionError {
    /// Fatal errors must not be retried; everything else is transient.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthCodeInvalid(_))
    }
}
