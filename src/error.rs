//! Error types and transport error mapping

use thiserror::Error;

use crate::response::Response;

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by pluggable collaborators such as decoders
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced to callers of the facade and the poller
#[derive(Debug, Error)]
pub enum Error {
    /// The request descriptor was invalid; nothing was sent
    #[error("Bad request: {message}")]
    BadRequest {
        /// What was wrong with the descriptor
        message: String,
    },

    /// The transport failed on or after receiving a response
    #[error("Response error: {source}")]
    Response {
        /// Underlying transport failure
        #[source]
        source: TransportError,
        /// Best-effort partial envelope, if a response arrived
        response: Option<Box<Response>>,
    },

    /// The body of a successful response could not be decoded
    #[error("Failed to decode response body: {source}")]
    Decode {
        /// Error reported by the decoder
        #[source]
        source: BoxError,
        /// The envelope whose body failed to decode
        response: Box<Response>,
    },

    /// The transport produced neither a usable response nor an error
    #[error("Transport returned no response and no error")]
    Unknown,
}

/// Underlying cause of an [`Error::Response`]
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection-level failure
    #[error("Network error: {message} (code: {code})")]
    Network {
        /// Platform or client specific error code, `-1` when unavailable
        code: i64,
        /// Error message
        message: String,
    },

    /// Timeout error
    #[error("Request timed out")]
    Timeout,

    /// Request was cancelled
    #[error("Request was cancelled")]
    Cancelled,

    /// Status code outside the request's acceptable set
    #[error("Response status code was unacceptable: {status}")]
    UnacceptableStatus {
        /// The received status code
        status: u16,
    },

    /// Empty body for a status that requires one
    #[error("Response body was empty for status {status}")]
    EmptyBody {
        /// The received status code
        status: u16,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest {
            message: message.into(),
        }
    }

    pub(crate) fn transport(source: impl Into<TransportError>) -> Self {
        Error::Response {
            source: source.into(),
            response: None,
        }
    }

    pub(crate) fn with_response(source: impl Into<TransportError>, response: Response) -> Self {
        Error::Response {
            source: source.into(),
            response: Some(Box::new(response)),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self::transport(TransportError::Cancelled)
    }

    /// The envelope attached to this error, if any
    pub fn response(&self) -> Option<&Response> {
        match self {
            Error::Response { response, .. } => response.as_deref(),
            Error::Decode { response, .. } => Some(response),
            Error::BadRequest { .. } | Error::Unknown => None,
        }
    }

    /// Status code of the attached envelope, if any
    pub fn status(&self) -> Option<u16> {
        self.response().map(Response::status)
    }

    /// Whether this error is a pre-dispatch descriptor failure
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Error::BadRequest { .. })
    }

    /// Whether this error came from the decode layer
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }

    /// Whether the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Response {
                source: TransportError::Cancelled,
                ..
            }
        )
    }
}

#[cfg(feature = "backend-reqwest")]
impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network {
                code: -1,
                message: error.to_string(),
            }
        }
    }
}
