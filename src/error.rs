//! Error types for peercache

use std::sync::Arc;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, serving or fetching cached values.
///
/// The type is `Clone` so a single load outcome can be handed to every caller
/// coalesced onto it; non-cloneable sources are held behind an [`Arc`].
#[derive(Error, Debug, Clone)]
pub enum Error {
    // =========================================================================
    // Usage Errors
    // =========================================================================
    /// Lookup with an empty key
    #[error("key is required")]
    EmptyKey,

    /// A node picker was registered twice on the same group
    #[error("node picker registered more than once for group: {group}")]
    NodePickerAlreadyRegistered { group: String },

    /// A group with this name already exists in the registry
    #[error("group already registered: {0}")]
    DuplicateGroup(String),

    // =========================================================================
    // Lookup Errors
    // =========================================================================
    /// No group with this name is registered
    #[error("no such group: {0}")]
    GroupNotFound(String),

    /// The backing-store loader failed for a key
    #[error("{reason:#}")]
    Getter {
        key: String,
        reason: Arc<anyhow::Error>,
    },

    // =========================================================================
    // Peer Transport Errors
    // =========================================================================
    /// Peer request could not be sent or completed
    #[error("peer request failed: {0}")]
    PeerRequest(#[source] Arc<reqwest::Error>),

    /// Peer answered with a non-success status
    #[error("peer {url} returned: {status}")]
    PeerStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Peer response body could not be read
    #[error("reading response body: {0}")]
    PeerBody(#[source] Arc<reqwest::Error>),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a loader failure for `key`.
    pub fn getter(key: impl Into<String>, reason: anyhow::Error) -> Self {
        Self::Getter {
            key: key.into(),
            reason: Arc::new(reason),
        }
    }

    /// True for failures talking to a remote peer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::PeerRequest(_) | Self::PeerStatus { .. } | Self::PeerBody(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_getter_error_keeps_loader_message() {
        let err = Error::getter("Tom", anyhow::anyhow!("Tom not exist"));
        assert_eq!(err.to_string(), "Tom not exist");

        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_getter_error_shows_context_chain() {
        let reason = anyhow::anyhow!("connection reset").context("loading scores");
        let err = Error::getter("Sam", reason);
        assert_eq!(err.to_string(), "loading scores: connection reset");
    }

    #[test]
    fn test_transport_classification() {
        let err = Error::PeerStatus {
            url: "http://localhost:8001/_myCache/scores/Tom".to_string(),
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        };
        assert!(err.is_transport());
        assert!(err.to_string().contains("500 Internal Server Error"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "I/O error: taken");
    }
}
