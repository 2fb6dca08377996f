use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

const NAMESPACE: &str = "statrelay";

/// Prometheus counters for the relay, gated behind `enabled`.
///
/// When `enabled = false` no registry exists and every `record_*` call
/// returns immediately.
pub struct MetricsCollector {
    enabled: bool,
    registry: Option<Registry>,
    pub requests_total: Option<IntCounterVec>,
    pub request_duration: Option<HistogramVec>,
    pub token_acquisitions_total: Option<IntCounterVec>,
    pub in_flight: Option<IntGauge>,
}

impl MetricsCollector {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Relayed statistics requests").namespace(NAMESPACE),
            &["outcome", "status"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "End-to-end relay latency")
                .namespace(NAMESPACE)
                .buckets(vec![
                    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ]),
            &["outcome"],
        )?;

        let token_acquisitions_total = IntCounterVec::new(
            Opts::new("token_acquisitions_total", "Access token acquisitions")
                .namespace(NAMESPACE),
            &["result"],
        )?;

        let in_flight = IntGauge::with_opts(
            Opts::new("requests_in_flight", "Requests currently being relayed").namespace(NAMESPACE),
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(token_acquisitions_total.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            requests_total: Some(requests_total),
            request_duration: Some(request_duration),
            token_acquisitions_total: Some(token_acquisitions_total),
            in_flight: Some(in_flight),
        })
    }

    /// No-op collector.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            registry: None,
            requests_total: None,
            request_duration: None,
            token_acquisitions_total: None,
            in_flight: None,
        }
    }

    /// Record a finished relay request (no-op when disabled).
    #[inline]
    pub fn record_request(&self, outcome: &str, status: u16, duration_secs: f64) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.requests_total {
            let mut buf = itoa::Buffer::new();
            let status_str = buf.format(status);
            counter.with_label_values(&[outcome, status_str]).inc();
        }
        if let Some(ref hist) = self.request_duration {
            hist.with_label_values(&[outcome]).observe(duration_secs);
        }
    }

    #[inline]
    pub fn record_token_acquisition(&self, ok: bool) {
        if let Some(ref counter) = self.token_acquisitions_total {
            counter
                .with_label_values(&[if ok { "ok" } else { "error" }])
                .inc();
        }
    }

    /// Track a request entering the relay. Dropping the guard marks it done.
    pub fn start_request(&self) -> InFlightGuard {
        if let Some(ref gauge) = self.in_flight {
            gauge.inc();
        }
        InFlightGuard(self.in_flight.clone())
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        if let Some(ref registry) = self.registry {
            let encoder = TextEncoder::new();
            let metric_families = registry.gather();
            let mut buffer = Vec::new();
            encoder.encode(&metric_families, &mut buffer).unwrap_or(());
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Decrements the in-flight gauge on drop, including when the caller disconnects.
pub struct InFlightGuard(Option<IntGauge>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(ref gauge) = self.0 {
            gauge.dec();
        }
    }
}
