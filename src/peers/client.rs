//! HTTP client side of the peer protocol

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use super::NodeGetter;
use crate::error::{Error, Result};

/// Fetches values from one remote node over HTTP
#[derive(Debug, Clone)]
pub struct HttpGetter {
    /// Node address joined with the pool base path, e.g.
    /// `http://10.0.0.2:8001/_myCache/`
    base_url: String,
    client: Client,
}

impl HttpGetter {
    /// Create a getter for `base_url` sharing `client`'s connection pool
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Base URL requests are built from
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, group: &str, key: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(group),
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl NodeGetter for HttpGetter {
    #[instrument(skip(self), fields(peer = %self.base_url))]
    async fn get(&self, group: &str, key: &str) -> Result<Bytes> {
        let url = self.url_for(group, key);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::PeerRequest(Arc::new(e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::PeerStatus { url, status });
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::PeerBody(Arc::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_url_escapes_group_and_key() {
        let getter = HttpGetter::new(Client::new(), "http://localhost:8001/_myCache/");

        assert_eq!(
            getter.url_for("scores", "Tom"),
            "http://localhost:8001/_myCache/scores/Tom"
        );
        assert_eq!(
            getter.url_for("my group", "a/b?c"),
            "http://localhost:8001/_myCache/my%20group/a%2Fb%3Fc"
        );
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_request_error() {
        // Port 1 on loopback refuses connections.
        let getter = HttpGetter::new(Client::new(), "http://127.0.0.1:1/_myCache/");

        let err = getter.get("scores", "Tom").await.unwrap_err();
        assert_matches!(err, Error::PeerRequest(_));
        assert!(err.is_transport());
    }
}
