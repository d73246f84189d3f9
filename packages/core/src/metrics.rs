//! Prometheus metrics registry for the Ayyamul Bidh tracker.
//!
//! [`CoreMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and hand it to
//! the request queue and the conversion services.
//!
//! There is no HTTP endpoint; the binary prints [`CoreMetrics::render`] on
//! exit when started with `--metrics`.

use prometheus::{Counter, CounterVec, Gauge, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct CoreMetrics {
    /// Requests the queue handed to the network (first attempts only).
    pub requests_dispatched_total: Counter,
    /// Re-invocations caused by a rate-limit response.
    pub rate_limit_retries_total: Counter,
    /// Tasks waiting in the queue.
    pub queue_depth: Gauge,
    /// Resolved lookups, labelled by operation and winning strategy.
    pub resolutions_total: CounterVec,
    /// Lookups where every strategy missed or failed, labelled by operation.
    pub resolution_failures_total: CounterVec,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl CoreMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_dispatched_total = Counter::with_opts(Opts::new(
            "ayyamul_bidh_requests_dispatched_total",
            "Requests dispatched by the request queue",
        ))?;

        let rate_limit_retries_total = Counter::with_opts(Opts::new(
            "ayyamul_bidh_rate_limit_retries_total",
            "Retries triggered by rate-limit responses",
        ))?;

        let queue_depth = Gauge::with_opts(Opts::new(
            "ayyamul_bidh_queue_depth",
            "Tasks pending in the request queue",
        ))?;

        let resolutions_total = CounterVec::new(
            Opts::new(
                "ayyamul_bidh_resolutions_total",
                "Resolved lookups by operation and strategy",
            ),
            &["operation", "strategy"],
        )?;

        let resolution_failures_total = CounterVec::new(
            Opts::new(
                "ayyamul_bidh_resolution_failures_total",
                "Lookups no strategy could satisfy",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(requests_dispatched_total.clone()))?;
        registry.register(Box::new(rate_limit_retries_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(resolutions_total.clone()))?;
        registry.register(Box::new(resolution_failures_total.clone()))?;

        Ok(Self {
            requests_dispatched_total,
            rate_limit_retries_total,
            queue_depth,
            resolutions_total,
            resolution_failures_total,
            registry,
        })
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
