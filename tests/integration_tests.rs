//! peercache Integration Tests
//!
//! Runs real peer servers on loopback ports:
//! - Peer protocol status codes and payloads
//! - HttpGetter against a live node
//! - Two-node routing and local fallback when a peer is down

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use peercache::{
    Error, GetterFn, Group, GroupRegistry, HttpGetter, HttpPool, NodeGetter, NodePicker,
};
use tokio::net::TcpListener;

/// A running node: its registry, group, pool and load counter
struct Node {
    addr: String,
    group: Arc<Group>,
    pool: Arc<HttpPool>,
    loads: Arc<AtomicUsize>,
}

/// Start a node serving group `scores` whose loader answers any key except
/// `missing`.
async fn start_node() -> (Node, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let registry = Arc::new(GroupRegistry::new());
    let group = registry
        .new_group(
            "scores",
            2 << 10,
            GetterFn(move |key: &str| -> anyhow::Result<Vec<u8>> {
                counter.fetch_add(1, Ordering::SeqCst);
                match key {
                    "Tom" => Ok(b"630".to_vec()),
                    "missing" => anyhow::bail!("{} not exist", key),
                    _ => Ok(format!("value-{}", key).into_bytes()),
                }
            }),
        )
        .unwrap();

    let pool = HttpPool::new(addr.clone(), registry).unwrap();
    group
        .register_node_picker(Arc::clone(&pool) as Arc<dyn NodePicker>)
        .unwrap();

    (
        Node {
            addr,
            group,
            pool,
            loads,
        },
        listener,
    )
}

fn serve(node: &Node, listener: TcpListener) {
    let pool = Arc::clone(&node.pool);
    tokio::spawn(async move { pool.serve(listener).await });
}

/// First generated key that `node` routes to a remote peer
fn remote_key(node: &Node) -> String {
    (0..1_000)
        .map(|i| format!("key-{}", i))
        .find(|key| node.pool.pick_node(key).is_some())
        .expect("no key routed to a peer")
}

// =============================================================================
// Peer Protocol
// =============================================================================

mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn test_status_codes_and_payloads() {
        let (node, listener) = start_node().await;
        serve(&node, listener);
        let client = reqwest::Client::new();

        let response = client
            .get(format!("{}/_myCache/scores/Tom", node.addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(&response.bytes().await.unwrap()[..], b"630");

        let response = client
            .get(format!("{}/_myCache/unknown/Tom", node.addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        assert_eq!(response.text().await.unwrap(), "no such group: unknown");

        let response = client
            .get(format!("{}/_myCache/scores", node.addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        let response = client
            .get(format!("{}/_myCache/scores/missing", node.addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text().await.unwrap(), "missing not exist");
    }

    #[tokio::test]
    async fn test_http_getter_against_live_node() {
        let (node, listener) = start_node().await;
        serve(&node, listener);

        let getter = HttpGetter::new(reqwest::Client::new(), format!("{}/_myCache/", node.addr));
        let value = getter.get("scores", "a key/with spaces").await.unwrap();
        assert_eq!(&value[..], b"value-a key/with spaces");

        let err = getter.get("unknown", "Tom").await.unwrap_err();
        assert_matches!(
            err,
            Error::PeerStatus { status, .. } if status == reqwest::StatusCode::NOT_FOUND
        );

        // Served requests are counted and never forwarded.
        assert_eq!(node.group.stats().server_requests, 1);
        assert_eq!(node.group.stats().peer_loads, 0);
    }
}

// =============================================================================
// Cluster Routing
// =============================================================================

mod cluster_tests {
    use super::*;

    #[tokio::test]
    async fn test_key_is_loaded_by_its_owner() {
        let (a, listener_a) = start_node().await;
        let (b, listener_b) = start_node().await;
        serve(&a, listener_a);
        serve(&b, listener_b);

        let nodes = [a.addr.clone(), b.addr.clone()];
        a.pool.set_nodes(nodes.clone());
        b.pool.set_nodes(nodes);

        let key = remote_key(&a);
        let expected = format!("value-{}", key);

        let first = a.group.get(&key).await.unwrap();
        let second = a.group.get(&key).await.unwrap();
        assert_eq!(first.to_string(), expected);
        assert_eq!(second.to_string(), expected);

        // B loaded once and served the repeat from its cache.
        assert_eq!(a.loads.load(Ordering::SeqCst), 0);
        assert_eq!(b.loads.load(Ordering::SeqCst), 1);
        assert_eq!(b.group.stats().server_requests, 2);
        assert_eq!(b.group.stats().cache_hits, 1);

        // Peer values are not cached on A.
        assert_eq!(a.group.stats().peer_loads, 2);
        assert_eq!(a.group.cache_stats().items, 0);

        // Asking B directly never leaves B.
        let direct = b.group.get(&key).await.unwrap();
        assert_eq!(direct.to_string(), expected);
        assert_eq!(b.group.stats().peer_loads, 0);
    }

    #[tokio::test]
    async fn test_unreachable_peer_falls_back_to_loader() {
        let (a, listener_a) = start_node().await;
        serve(&a, listener_a);

        // Port 1 on loopback refuses connections.
        a.pool.set_nodes([a.addr.clone(), "http://127.0.0.1:1".to_string()]);

        let key = remote_key(&a);
        let value = a.group.get(&key).await.unwrap();
        assert_eq!(value.to_string(), format!("value-{}", key));

        let stats = a.group.stats();
        assert_eq!(stats.peer_errors, 1);
        assert_eq!(stats.local_loads, 1);
        assert_eq!(a.loads.load(Ordering::SeqCst), 1);

        // The fallback populated the local cache.
        let again = a.group.get(&key).await.unwrap();
        assert_eq!(again, value);
        assert_eq!(a.group.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_loader_error_reaches_remote_caller() {
        let (a, listener_a) = start_node().await;
        let (b, listener_b) = start_node().await;
        serve(&a, listener_a);
        serve(&b, listener_b);

        let nodes = [a.addr.clone(), b.addr.clone()];
        a.pool.set_nodes(nodes.clone());
        b.pool.set_nodes(nodes);

        // Whichever node owns "missing", the lookup fails: a remote 500 falls
        // back to A's own loader, which fails the same way.
        let err = a.group.get("missing").await.unwrap_err();
        assert_matches!(err, Error::Getter { ref key, .. } if key == "missing");
        assert_eq!(err.to_string(), "missing not exist");
    }
}
