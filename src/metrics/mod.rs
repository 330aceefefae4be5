//! Prometheus Exposition
//!
//! Renders group and cache counters in the Prometheus text format. Each
//! render builds a private registry from fresh snapshots, so nothing is
//! registered globally and groups added later show up on the next scrape.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};
use crate::group::GroupRegistry;

const NAMESPACE: &str = "peercache";

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), &["group"])
        .map_err(|e| Error::Internal(format!("Failed to create metric {}: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| Error::Internal(format!("Failed to register metric {}: {}", name, e)))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGaugeVec> {
    let gauge = IntGaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), &["group"])
        .map_err(|e| Error::Internal(format!("Failed to create metric {}: {}", name, e)))?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|e| Error::Internal(format!("Failed to register metric {}: {}", name, e)))?;
    Ok(gauge)
}

/// Render every group's counters as Prometheus text
pub fn render(groups: &GroupRegistry) -> Result<String> {
    let registry = Registry::new();

    let gets = counter(&registry, "gets_total", "Lookups, including cache hits")?;
    let cache_hits = counter(&registry, "cache_hits_total", "Lookups answered by the local cache")?;
    let peer_loads = counter(&registry, "peer_loads_total", "Values fetched from a remote peer")?;
    let peer_errors = counter(&registry, "peer_errors_total", "Failed remote fetches")?;
    let loads = counter(&registry, "loads_total", "Lookups that missed the cache")?;
    let loads_deduped = counter(
        &registry,
        "loads_deduped_total",
        "Misses that shared an in-flight load",
    )?;
    let local_loads = counter(&registry, "local_loads_total", "Successful loader calls")?;
    let local_load_errs = counter(&registry, "local_load_errors_total", "Failed loader calls")?;
    let server_requests = counter(
        &registry,
        "server_requests_total",
        "Lookups received from remote peers",
    )?;
    let evictions = counter(&registry, "cache_evictions_total", "Entries evicted from the local cache")?;
    let cache_bytes = gauge(&registry, "cache_bytes", "Bytes held by the local cache")?;
    let cache_items = gauge(&registry, "cache_items", "Entries held by the local cache")?;

    for group in groups.groups() {
        let labels = [group.name()];
        let stats = group.stats();
        let cache = group.cache_stats();

        gets.with_label_values(&labels).inc_by(stats.gets);
        cache_hits.with_label_values(&labels).inc_by(stats.cache_hits);
        peer_loads.with_label_values(&labels).inc_by(stats.peer_loads);
        peer_errors.with_label_values(&labels).inc_by(stats.peer_errors);
        loads.with_label_values(&labels).inc_by(stats.loads);
        loads_deduped.with_label_values(&labels).inc_by(stats.loads_deduped);
        local_loads.with_label_values(&labels).inc_by(stats.local_loads);
        local_load_errs.with_label_values(&labels).inc_by(stats.local_load_errs);
        server_requests.with_label_values(&labels).inc_by(stats.server_requests);
        evictions.with_label_values(&labels).inc_by(cache.evictions);
        cache_bytes.with_label_values(&labels).set(cache.bytes);
        cache_items
            .with_label_values(&labels)
            .set(i64::try_from(cache.items).unwrap_or(i64::MAX));
    }

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| Error::Internal(format!("Metrics are not valid UTF-8: {}", e)))
}
