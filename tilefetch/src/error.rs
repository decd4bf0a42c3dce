//! Error types for the fetch layer.
//!
//! Errors fall into three families:
//!
//! - **Precondition violations** ([`FetchError::MissingUrl`], [`FetchError::Busy`],
//!   [`FetchError::InvalidUrl`], [`FetchError::InvalidTransition`],
//!   [`FetchError::Unbound`]) are raised before any transport work starts and are
//!   never retried.
//! - **Transport failures** ([`FetchError::Status`], [`FetchError::Network`],
//!   [`FetchError::Cancelled`]) come back from a loader and are routed through the
//!   resource's retry coordinator before the caller sees them.
//! - **Decode failures** ([`FetchError::Decode`], [`FetchError::InvalidDataUri`]) mean the
//!   bytes arrived but could not be turned into the requested format.
//!
//! Scheduler throttling is not an error at all; verbs report it as `Ok(None)`.

use thiserror::Error;

use crate::request::RequestState;

/// Result type used throughout the crate.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that can occur while building or fetching a resource.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// A resource was constructed without a URL.
    #[error("resource url is required")]
    MissingUrl,

    /// A verb was called while the resource's request is issued or active.
    #[error("the resource is already being fetched: {url}")]
    Busy { url: String },

    /// The URL could not be parsed or resolved.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A request lifecycle transition was attempted that the state machine forbids.
    #[error("invalid request transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// A request reached the scheduler without a transport function.
    #[error("request for {url} has no transport function")]
    Unbound { url: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The request never produced a response (connect, timeout, body read).
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    /// The request was cancelled by the scheduler or its owner.
    #[error("request to {url} was cancelled")]
    Cancelled { url: String },

    /// The payload arrived but could not be decoded into the requested format.
    #[error("failed to decode {format} from {url}: {reason}")]
    Decode {
        url: String,
        format: &'static str,
        reason: String,
    },

    /// A `data:` URI did not match `data:<mime>[;base64],<payload>` or its payload was bad.
    #[error("invalid data uri: {0}")]
    InvalidDataUri(String),
}

impl FetchError {
    /// Builds a decode error for the given format.
    pub fn decode(url: impl Into<String>, format: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            url: url.into(),
            format,
            reason: reason.to_string(),
        }
    }

    /// Builds a network error.
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_transition(from: &RequestState, event: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.name().to_string(),
            event: event.to_string(),
        }
    }

    /// True for errors raised before any transport work started.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingUrl
                | Self::Busy { .. }
                | Self::InvalidUrl { .. }
                | Self::InvalidTransition { .. }
                | Self::Unbound { .. }
        )
    }

    /// True for failures reported by a transport loader.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Status { .. } | Self::Network { .. } | Self::Cancelled { .. }
        )
    }

    /// True when bytes were received but could not be decoded.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::InvalidDataUri(_))
    }

    /// HTTP status code, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_is_precondition() {
        let err = FetchError::Busy {
            url: "http://x/y".to_string(),
        };
        assert!(err.is_precondition());
        assert!(!err.is_transport());
        assert!(err.to_string().contains("already being fetched"));
    }

    #[test]
    fn test_decode_is_distinct_from_transport() {
        let decode = FetchError::decode("http://x/a.json", "json", "expected value");
        let network = FetchError::network("http://x/a.json", "connection refused");

        assert!(decode.is_decode());
        assert!(!decode.is_transport());
        assert!(network.is_transport());
        assert!(!network.is_decode());
        assert_ne!(decode.to_string(), network.to_string());
    }

    #[test]
    fn test_status_accessor() {
        let err = FetchError::Status {
            url: "http://x".to_string(),
            status: 404,
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "HTTP 404 from http://x");
        assert_eq!(FetchError::MissingUrl.status(), None);
    }
}
