//! peercache node
//!
//! Runs one cache node serving the `scores` group from a small in-memory
//! table. Start several nodes with the same `--peers` list to form a cluster;
//! pass `--api` on one of them to expose a front-end for clients.
//!
//! # Architecture
//!
//! ```text
//!   client ──▶ API server (--api) ──▶ Group "scores" ──▶ SlowDB
//!                                          │
//!                                          ▼
//!                                       HttpPool ◀──▶ other nodes
//! ```

use std::sync::Arc;

use clap::Parser;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use peercache::{server, GetterFn, GroupRegistry, HttpPool, NodePicker};

// =============================================================================
// CLI Arguments
// =============================================================================

/// peercache node - distributed read-through cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port the peer server listens on
    #[arg(long, env = "PEERCACHE_PORT", default_value = "8001")]
    port: u16,

    /// Address other nodes reach this one at (defaults to http://localhost:<port>)
    #[arg(long, env = "PEERCACHE_SELF_ADDR")]
    self_addr: Option<String>,

    /// Comma-separated addresses of every node in the cluster, this one included
    #[arg(
        long,
        env = "PEERCACHE_PEERS",
        value_delimiter = ',',
        default_value = "http://localhost:8001,http://localhost:8002,http://localhost:8003"
    )]
    peers: Vec<String>,

    /// Start the client-facing API server
    #[arg(long, env = "PEERCACHE_API")]
    api: bool,

    /// API server bind address
    #[arg(long, env = "PEERCACHE_API_ADDR", default_value = "0.0.0.0:9999")]
    api_addr: String,

    /// Byte budget of the scores cache (0 = unbounded)
    #[arg(long, env = "PEERCACHE_CACHE_BYTES", default_value = "2048")]
    cache_bytes: i64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let self_addr = args
        .self_addr
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", args.port));

    info!("Starting peercache node");
    info!("  Self address: {}", self_addr);
    info!("  Peers: {:?}", args.peers);
    info!("  Cache bytes: {}", args.cache_bytes);

    let registry = Arc::new(GroupRegistry::new());
    let scores = registry.new_group("scores", args.cache_bytes, GetterFn(slow_db))?;

    let pool = HttpPool::new(self_addr, Arc::clone(&registry))?;
    pool.set_nodes(args.peers.iter().map(|p| p.trim()).filter(|p| !p.is_empty()));
    scores.register_node_picker(Arc::clone(&pool) as Arc<dyn NodePicker>)?;

    // Start API server
    if args.api {
        let api_addr = args.api_addr.clone();
        let registry = Arc::clone(&registry);
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            if let Err(e) = run_api_server(&api_addr, registry, pool).await {
                error!("API server error: {}", e);
            }
        });
    }

    let peer_addr = format!("0.0.0.0:{}", args.port);
    tokio::select! {
        result = Arc::clone(&pool).listen(&peer_addr) => result?,
        _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
    }

    info!("Node shutdown complete");
    Ok(())
}

/// Stand-in backing store
fn slow_db(key: &str) -> anyhow::Result<Vec<u8>> {
    info!("[SlowDB] search key {}", key);
    match key {
        "Tom" => Ok(b"630".to_vec()),
        "Jack" => Ok(b"589".to_vec()),
        "Sam" => Ok(b"567".to_vec()),
        _ => anyhow::bail!("{} not exist", key),
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// API Server
// =============================================================================

async fn run_api_server(
    addr: &str,
    registry: Arc<GroupRegistry>,
    pool: Arc<HttpPool>,
) -> peercache::Result<()> {
    server::listen(addr, "api", move |req| {
        let registry = Arc::clone(&registry);
        let pool = Arc::clone(&pool);
        async move { api_handler(req, &registry, &pool).await }
    })
    .await
}

async fn api_handler(
    req: Request<Incoming>,
    registry: &GroupRegistry,
    pool: &HttpPool,
) -> Response<Full<Bytes>> {
    let path = req.uri().path().to_string();
    match path.as_str() {
        "/api" => {
            let key = query_param(req.uri().query().unwrap_or_default(), "key").unwrap_or_default();
            let Some(group) = registry.get("scores") else {
                return server::text_response(StatusCode::NOT_FOUND, "no such group: scores");
            };
            match group.get(&key).await {
                Ok(view) => server::with_body(
                    StatusCode::OK,
                    "application/octet-stream",
                    view.to_bytes(),
                ),
                Err(e) => server::text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        }
        "/healthz" | "/livez" | "/readyz" => server::text_response(StatusCode::OK, "ok"),
        "/metrics" => match peercache::metrics::render(registry) {
            Ok(text) => server::with_body(StatusCode::OK, "text/plain; version=0.0.4", text),
            Err(e) => server::text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        "/stats" => match serde_json::to_vec(&stats_json(registry, pool)) {
            Ok(body) => server::with_body(StatusCode::OK, "application/json", body),
            Err(e) => server::text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        _ => server::text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

/// Node settings plus per-group counters
fn stats_json(registry: &GroupRegistry, pool: &HttpPool) -> serde_json::Value {
    let groups: serde_json::Map<String, serde_json::Value> = registry
        .groups()
        .iter()
        .map(|group| {
            let cache = group.cache_stats();
            let hit_ratio = cache.hit_ratio();
            let entry = serde_json::json!({
                "group": group.stats(),
                "cache": cache,
                "hit_ratio": hit_ratio,
            });
            (group.name().to_string(), entry)
        })
        .collect();

    let config = pool.config();
    serde_json::json!({
        "node": {
            "self_addr": pool.self_addr(),
            "base_path": config.base_path,
            "replicas": config.replicas,
            "request_timeout_ms": config.request_timeout.as_millis() as u64,
            "peers": pool.nodes(),
        },
        "groups": groups,
    })
}

/// First value of `name` in a form-encoded query string
fn query_param(query: &str, name: &str) -> Option<String> {
    let mut url = reqwest::Url::parse("http://localhost/").ok()?;
    url.set_query(Some(query));
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
