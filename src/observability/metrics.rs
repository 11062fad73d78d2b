use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Process-wide metrics, created on first use.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            // every name and label set below is a constant
            Arc::new(Metrics::new().expect("static metric definitions are valid"))
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Management API
    pub management_requests: IntCounterVec,
    pub management_failures: IntCounterVec,
    pub management_duration: HistogramVec,

    // Cache
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub cache_evictions: IntCounter,
    pub cached_logsets: IntGauge,

    // Resolution
    pub resolutions: IntCounterVec,
    pub resolution_duration: Histogram,

    // Delivery
    pub lines_delivered: IntCounterVec,
    pub delivery_failures: IntCounterVec,
    pub reconnects: IntCounter,
    pub message_splits: IntCounter,

    // Routing
    pub events_skipped: IntCounterVec,

    // Config/runtime
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("logentries_router".into()), None)?;

        let metrics = Self {
            management_requests: IntCounterVec::new(Opts::new("management_requests_total", "Management API calls by operation"), &["operation"])?,
            management_failures: IntCounterVec::new(Opts::new("management_failures_total", "Failed management API calls"), &["operation", "reason"])?,
            management_duration: HistogramVec::new(HistogramOpts::new("management_duration_seconds", "Management API call duration").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]), &["operation"])?,

            cache_hits: IntCounter::new("cache_hits_total", "Logset cache hits")?,
            cache_misses: IntCounter::new("cache_misses_total", "Logset cache misses, expired entries included")?,
            cache_evictions: IntCounter::new("cache_evictions_total", "Logsets evicted to stay within capacity")?,
            cached_logsets: IntGauge::new("cached_logsets", "Logsets currently cached")?,

            resolutions: IntCounterVec::new(Opts::new("resolutions_total", "Token resolutions by path taken"), &["path"])?,
            resolution_duration: Histogram::with_opts(HistogramOpts::new("resolution_duration_seconds", "Time to resolve one token").buckets(vec![0.0001, 0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]))?,

            lines_delivered: IntCounterVec::new(Opts::new("lines_delivered_total", "Messages accepted for delivery"), &["mode"])?,
            delivery_failures: IntCounterVec::new(Opts::new("delivery_failures_total", "Messages that could not be delivered"), &["mode", "reason"])?,
            reconnects: IntCounter::new("reconnects_total", "Ingestion socket reconnect attempts")?,
            message_splits: IntCounter::new("message_splits_total", "Oversized lines split in two")?,

            events_skipped: IntCounterVec::new(Opts::new("events_skipped_total", "Events dropped before resolution"), &["reason"])?,

            config_validation_errors: IntCounter::new("config_validation_errors_total", "Validation errors during startup")?,
            up: IntGauge::new("up", "1 if service is healthy")?,

            registry,
        };

        let reg = &metrics.registry;
        reg.register(Box::new(metrics.management_requests.clone()))?;
        reg.register(Box::new(metrics.management_failures.clone()))?;
        reg.register(Box::new(metrics.management_duration.clone()))?;
        reg.register(Box::new(metrics.cache_hits.clone()))?;
        reg.register(Box::new(metrics.cache_misses.clone()))?;
        reg.register(Box::new(metrics.cache_evictions.clone()))?;
        reg.register(Box::new(metrics.cached_logsets.clone()))?;
        reg.register(Box::new(metrics.resolutions.clone()))?;
        reg.register(Box::new(metrics.resolution_duration.clone()))?;
        reg.register(Box::new(metrics.lines_delivered.clone()))?;
        reg.register(Box::new(metrics.delivery_failures.clone()))?;
        reg.register(Box::new(metrics.reconnects.clone()))?;
        reg.register(Box::new(metrics.message_splits.clone()))?;
        reg.register(Box::new(metrics.events_skipped.clone()))?;
        reg.register(Box::new(metrics.config_validation_errors.clone()))?;
        reg.register(Box::new(metrics.up.clone()))?;

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[tokio::test]
    async fn registry_exposes_prefixed_families() {
        let metrics = get_metrics().await;
        metrics.reconnects.inc();
        metrics.lines_delivered.with_label_values(&["tcp"]).inc();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metrics.registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("logentries_router_reconnects_total"));
        assert!(text.contains("logentries_router_lines_delivered_total{mode=\"tcp\"}"));
    }
}
