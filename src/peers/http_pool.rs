//! HTTP peer pool
//!
//! [`HttpPool`] plays both sides of the peer protocol for one node: it routes
//! keys to their owner over a consistent hash ring, and it answers requests
//! that other nodes route to this one.
//!
//! # Wire Protocol
//!
//! ```text
//! GET <base_path><group>/<key>      (both segments percent-encoded)
//!
//! 200  application/octet-stream     raw value bytes
//! 400  text/plain                   path outside base path, or not <group>/<key>
//! 404  text/plain                   no such group
//! 500  text/plain                   lookup failed
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode};
use parking_lot::Mutex;
use reqwest::Client;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::client::HttpGetter;
use super::{NodeGetter, NodePicker};
use crate::error::{Error, Result};
use crate::group::GroupRegistry;
use crate::hashring::HashRing;
use crate::server;

/// Default URL prefix for peer requests
pub const DEFAULT_BASE_PATH: &str = "/_myCache/";

/// Default virtual nodes per peer on the hash ring
pub const DEFAULT_REPLICAS: usize = 50;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the peer pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// URL prefix for peer requests; must start and end with `/`
    pub base_path: String,

    /// Virtual nodes per peer on the hash ring
    pub replicas: usize,

    /// Timeout for one request to a peer
    pub request_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    fn validate(&self) -> Result<()> {
        if !self.base_path.starts_with('/') || !self.base_path.ends_with('/') {
            return Err(Error::Config(format!(
                "base path must start and end with '/': {:?}",
                self.base_path
            )));
        }
        if self.replicas == 0 {
            return Err(Error::Config("replicas must be at least 1".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Pool
// =============================================================================

/// Peer set derived from the current node list. Replaced as a whole.
#[derive(Default)]
struct PeerState {
    nodes: Vec<String>,
    ring: Option<HashRing>,
    getters: HashMap<String, Arc<HttpGetter>>,
}

/// Peer picker and peer-request server for one node
pub struct HttpPool {
    /// This node's own address, as it appears in the node list
    self_addr: String,
    config: PoolConfig,
    client: Client,
    registry: Arc<GroupRegistry>,
    state: Mutex<PeerState>,
}

impl HttpPool {
    /// Create a pool for the node reachable at `self_addr`, e.g.
    /// `http://10.0.0.1:8001`, with default settings
    pub fn new(self_addr: impl Into<String>, registry: Arc<GroupRegistry>) -> Result<Arc<Self>> {
        Self::with_config(self_addr, registry, PoolConfig::default())
    }

    /// Create a pool with explicit settings
    pub fn with_config(
        self_addr: impl Into<String>,
        registry: Arc<GroupRegistry>,
        config: PoolConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Arc::new(Self {
            self_addr: self_addr.into(),
            config,
            client,
            registry,
            state: Mutex::new(PeerState::default()),
        }))
    }

    /// This node's address
    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Pool settings
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Replace the node set. The list should include this node's own address.
    pub fn set_nodes<I, S>(&self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let nodes: Vec<String> = nodes.into_iter().map(Into::into).collect();

        let mut ring = HashRing::new(self.config.replicas, None);
        ring.add_nodes(&nodes);

        let getters = nodes
            .iter()
            .map(|node| {
                let base_url = format!("{}{}", node, self.config.base_path);
                (node.clone(), Arc::new(HttpGetter::new(self.client.clone(), base_url)))
            })
            .collect();

        info!(node = %self.self_addr, peers = ?nodes, "peer set updated");
        *self.state.lock() = PeerState {
            nodes,
            ring: Some(ring),
            getters,
        };
    }

    /// Current node set
    pub fn nodes(&self) -> Vec<String> {
        self.state.lock().nodes.clone()
    }

    /// Answer one peer request
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let path = req.uri().path().to_string();
        debug!(node = %self.self_addr, method = %req.method(), path = %path, "peer request");

        let Some(rest) = path.strip_prefix(self.config.base_path.as_str()) else {
            warn!(node = %self.self_addr, path = %path, "request outside base path");
            return server::text_response(
                StatusCode::BAD_REQUEST,
                format!("unexpected path: {}", path),
            );
        };

        let Some((group_name, key)) = rest
            .split_once('/')
            .and_then(|(group, key)| Some((decode(group)?, decode(key)?)))
        else {
            return server::text_response(StatusCode::BAD_REQUEST, "bad request");
        };

        let Some(group) = self.registry.get(&group_name) else {
            return server::text_response(
                StatusCode::NOT_FOUND,
                Error::GroupNotFound(group_name).to_string(),
            );
        };

        match group.get_for_peer(&key).await {
            Ok(view) => server::with_body(
                StatusCode::OK,
                "application/octet-stream",
                view.to_bytes(),
            ),
            Err(e) => server::text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    /// Serve peer requests on `listener` until accepting fails
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        server::serve(listener, "peer", move |req| {
            let pool = Arc::clone(&self);
            async move { pool.handle(req).await }
        })
        .await
    }

    /// Bind `addr` and serve peer requests on it
    pub async fn listen(self: Arc<Self>, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind peer server on {}: {}", addr, e)))?;
        self.serve(listener).await
    }
}

fn decode(segment: &str) -> Option<String> {
    urlencoding::decode(segment).ok().map(|s| s.into_owned())
}

impl NodePicker for HttpPool {
    fn pick_node(&self, key: &str) -> Option<Arc<dyn NodeGetter>> {
        let state = self.state.lock();
        let owner = state.ring.as_ref()?.get_node(key)?;
        if owner == self.self_addr {
            return None;
        }

        let getter = state.getters.get(owner)?;
        debug!(node = %self.self_addr, peer = getter.base_url(), key, "picked peer");
        Some(Arc::clone(getter) as Arc<dyn NodeGetter>)
    }
}

impl fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_addr", &self.self_addr)
            .field("config", &self.config)
            .field("nodes", &self.state.lock().nodes)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GetterFn;
    use assert_matches::assert_matches;
    use http_body_util::BodyExt;
    use hyper::header::CONTENT_TYPE;

    fn scores_registry() -> Arc<GroupRegistry> {
        let registry = Arc::new(GroupRegistry::new());
        registry
            .new_group(
                "scores",
                2 << 10,
                GetterFn(|key: &str| -> anyhow::Result<Vec<u8>> {
                    match key {
                        "Tom" => Ok(b"630".to_vec()),
                        "Jack" => Ok(b"589".to_vec()),
                        "Sam" => Ok(b"567".to_vec()),
                        "a/b c" => Ok(b"escaped".to_vec()),
                        _ => anyhow::bail!("{} not exist", key),
                    }
                }),
            )
            .unwrap();
        registry
    }

    async fn call(pool: &HttpPool, uri: &str) -> (StatusCode, Option<String>, Bytes) {
        let req = Request::builder().uri(uri).body(()).unwrap();
        let response = pool.handle(req).await;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, body)
    }

    // =========================================================================
    // Server side
    // =========================================================================

    #[tokio::test]
    async fn test_handle_returns_value_bytes() {
        let pool = HttpPool::new("http://localhost:8001", scores_registry()).unwrap();

        let (status, content_type, body) = call(&pool, "/_myCache/scores/Tom").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(&body[..], b"630");
    }

    #[tokio::test]
    async fn test_handle_decodes_segments() {
        let pool = HttpPool::new("http://localhost:8001", scores_registry()).unwrap();

        let (status, _, body) = call(&pool, "/_myCache/scores/a%2Fb%20c").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"escaped");
    }

    #[tokio::test]
    async fn test_handle_rejects_malformed_paths() {
        let pool = HttpPool::new("http://localhost:8001", scores_registry()).unwrap();

        let (status, _, _) = call(&pool, "/_myCache/scores").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, body) = call(&pool, "/other/scores/Tom").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(&body[..], b"unexpected path: /other/scores/Tom");
    }

    #[tokio::test]
    async fn test_handle_unknown_group_is_not_found() {
        let pool = HttpPool::new("http://localhost:8001", scores_registry()).unwrap();

        let (status, content_type, body) = call(&pool, "/_myCache/nope/Tom").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
        assert_eq!(&body[..], b"no such group: nope");
    }

    #[tokio::test]
    async fn test_handle_loader_failure_is_server_error() {
        let pool = HttpPool::new("http://localhost:8001", scores_registry()).unwrap();

        let (status, _, body) = call(&pool, "/_myCache/scores/kkk").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&body[..], b"kkk not exist");

        let (status, _, body) = call(&pool, "/_myCache/scores/").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&body[..], b"key is required");
    }

    #[tokio::test]
    async fn test_handle_counts_server_requests() {
        let registry = scores_registry();
        let pool = HttpPool::new("http://localhost:8001", Arc::clone(&registry)).unwrap();

        call(&pool, "/_myCache/scores/Jack").await;
        call(&pool, "/_myCache/scores/Jack").await;

        let stats = registry.get("scores").unwrap().stats();
        assert_eq!(stats.server_requests, 2);
        assert_eq!(stats.local_loads, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_custom_base_path() {
        let config = PoolConfig {
            base_path: "/cache/".to_string(),
            ..Default::default()
        };
        let pool =
            HttpPool::with_config("http://localhost:8001", scores_registry(), config).unwrap();

        let (status, _, body) = call(&pool, "/cache/scores/Sam").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"567");

        let (status, _, _) = call(&pool, "/_myCache/scores/Sam").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.base_path, "/_myCache/");
        assert_eq!(config.replicas, 50);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PoolConfig {
            base_path: "no-slashes".to_string(),
            ..Default::default()
        };
        assert_matches!(
            HttpPool::with_config("http://localhost:8001", scores_registry(), config),
            Err(Error::Config(_))
        );

        let config = PoolConfig {
            replicas: 0,
            ..Default::default()
        };
        assert_matches!(
            HttpPool::with_config("http://localhost:8001", scores_registry(), config),
            Err(Error::Config(_))
        );
    }

    // =========================================================================
    // Picker side
    // =========================================================================

    #[test]
    fn test_pick_with_no_nodes_is_local() {
        let pool = HttpPool::new("http://localhost:8001", scores_registry()).unwrap();
        assert!(pool.pick_node("Tom").is_none());
    }

    #[test]
    fn test_pick_never_returns_self() {
        let pool = HttpPool::new("http://localhost:8001", scores_registry()).unwrap();
        pool.set_nodes(["http://localhost:8001"]);

        for i in 0..100 {
            assert!(pool.pick_node(&format!("key-{}", i)).is_none());
        }
    }

    #[test]
    fn test_pick_routes_to_ring_owner() {
        let nodes = ["http://localhost:8001", "http://localhost:8002", "http://localhost:8003"];
        let pool = HttpPool::new(nodes[0], scores_registry()).unwrap();
        pool.set_nodes(nodes);
        assert_eq!(pool.nodes(), nodes);

        let mut ring = HashRing::new(DEFAULT_REPLICAS, None);
        ring.add_nodes(nodes);

        let mut remote = 0;
        for i in 0..300 {
            let key = format!("key-{}", i);
            let owner = ring.get_node(&key).unwrap();
            let picked = pool.pick_node(&key);
            if owner == nodes[0] {
                assert!(picked.is_none(), "self-owned key {} routed remotely", key);
            } else {
                assert!(picked.is_some(), "key {} owned by {} was not routed", key, owner);
                remote += 1;
            }
        }
        assert!(remote > 0);
    }

    #[test]
    fn test_set_nodes_replaces_previous_set() {
        let pool = HttpPool::new("http://localhost:8001", scores_registry()).unwrap();
        pool.set_nodes(["http://localhost:8001", "http://localhost:8002"]);
        pool.set_nodes(["http://localhost:8001"]);

        assert_eq!(pool.nodes(), vec!["http://localhost:8001"]);
        for i in 0..100 {
            assert!(pool.pick_node(&format!("key-{}", i)).is_none());
        }
    }
}
