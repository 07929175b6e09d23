use cadence::prelude::*;
use cadence::{QueuingMetricSink, StatsdClient, UdpMetricSink};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use prometheus::{Encoder, Gauge, IntCounter, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Counter incremented for every response received, whatever its status.
pub const ENDPOINT_SUCCESS: &str = "endpoint.success";

/// Counter incremented when a request could not be built or delivered.
pub const ENDPOINT_FAILURE: &str = "endpoint.failure";

/// Gauge recording the last HTTP status code.
pub const ENDPOINT_RESPONSE: &str = "endpoint.response";

/// Errors constructing a metrics sink.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to open StatsD socket: {0}")]
    Socket(#[from] std::io::Error),

    #[error("Failed to create StatsD sink: {0}")]
    Statsd(#[from] cadence::MetricError),

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Destination for counters and gauges emitted by workers.
///
/// Shared by every worker. Failures are handled inside the sink and never
/// reach the caller.
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &str);
    fn record_gauge(&self, name: &str, value: f64);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn incr_counter(&self, _name: &str) {}
    fn record_gauge(&self, _name: &str, _value: f64) {}
}

/// StatsD sink. Metrics are queued and flushed over UDP from a background
/// thread, so a slow or absent collector never stalls a worker.
pub struct StatsdSink {
    client: StatsdClient,
}

impl StatsdSink {
    pub fn new(host: &str, port: u16, prefix: &str) -> Result<Self, MetricsError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;

        let udp_sink = UdpMetricSink::from((host, port), socket)?;
        let queuing_sink = QueuingMetricSink::from(udp_sink);

        let client = StatsdClient::builder(prefix, queuing_sink)
            .with_error_handler(|e| warn!(error = %e, "StatsD metric dropped"))
            .build();

        info!(host = %host, port = port, prefix = %prefix, "StatsD client created");
        Ok(Self { client })
    }
}

impl MetricsSink for StatsdSink {
    fn incr_counter(&self, name: &str) {
        if let Err(e) = self.client.count(name, 1i64) {
            debug!(metric = %name, error = %e, "Failed to send counter");
        }
    }

    fn record_gauge(&self, name: &str, value: f64) {
        if let Err(e) = self.client.gauge(name, value) {
            debug!(metric = %name, error = %e, "Failed to send gauge");
        }
    }
}

/// Prometheus sink. Metrics are created on first use in a private registry and
/// named `<prefix>_<name>` with dots turned into underscores.
pub struct PrometheusSink {
    prefix: String,
    registry: Registry,
    counters: Mutex<HashMap<String, IntCounter>>,
    gauges: Mutex<HashMap<String, Gauge>>,
}

impl PrometheusSink {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: sanitize_metric_name(prefix),
            registry: Registry::new(),
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, sanitize_metric_name(name))
    }

    fn counter(&self, name: &str) -> Result<IntCounter, MetricsError> {
        let mut counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(counter) = counters.get(name) {
            return Ok(counter.clone());
        }
        let counter = IntCounter::with_opts(Opts::new(
            self.full_name(name),
            format!("Total {} events", name),
        ))?;
        self.registry.register(Box::new(counter.clone()))?;
        counters.insert(name.to_string(), counter.clone());
        Ok(counter)
    }

    fn gauge(&self, name: &str) -> Result<Gauge, MetricsError> {
        let mut gauges = self.gauges.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(gauge) = gauges.get(name) {
            return Ok(gauge.clone());
        }
        let gauge = Gauge::with_opts(Opts::new(
            self.full_name(name),
            format!("Last observed {}", name),
        ))?;
        self.registry.register(Box::new(gauge.clone()))?;
        gauges.insert(name.to_string(), gauge.clone());
        Ok(gauge)
    }

    /// Encodes the registry in the Prometheus text format.
    pub fn gather_string(&self) -> String {
        encode_registry(&self.registry)
    }
}

impl MetricsSink for PrometheusSink {
    fn incr_counter(&self, name: &str) {
        match self.counter(name) {
            Ok(counter) => counter.inc(),
            Err(e) => warn!(metric = %name, error = %e, "Failed to register counter"),
        }
    }

    fn record_gauge(&self, name: &str, value: f64) {
        match self.gauge(name) {
            Ok(gauge) => gauge.set(value),
            Err(e) => warn!(metric = %name, error = %e, "Failed to register gauge"),
        }
    }
}

fn sanitize_metric_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn encode_registry(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::from("# ERROR ENCODING METRICS");
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!(error = %e, "Metrics output is not valid UTF-8");
        String::from("# ERROR ENCODING METRICS TO UTF-8")
    })
}

/// HTTP handler for the Prometheus metrics endpoint.
pub async fn metrics_handler(
    _req: Request<Body>,
    sink: Arc<PrometheusSink>,
) -> Result<Response<Body>, hyper::Error> {
    let body = sink.gather_string();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::OK;
    if let Ok(content_type) = TextEncoder::new()
        .format_type()
        .parse::<hyper::header::HeaderValue>()
    {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }

    Ok(response)
}

/// Serves `sink`'s registry over HTTP until the task is dropped.
pub async fn start_metrics_server(port: u16, sink: Arc<PrometheusSink>) {
    let addr = ([0, 0, 0, 0], port).into();

    let make_svc = make_service_fn(move |_conn| {
        let sink = sink.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let sink = sink.clone();
                async move { metrics_handler(req, sink).await }
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Failed to bind metrics server");
            return;
        }
    };
    info!(port = port, addr = %addr, "Metrics server listening");

    if let Err(e) = server.await {
        error!(error = %e, "Metrics server error");
    }
}

/// Records every metric in memory. Used to observe workers in tests.
#[derive(Debug, Default)]
pub struct InMemorySink {
    counters: Mutex<HashMap<String, u64>>,
    gauges: Mutex<HashMap<String, Vec<f64>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        counters.get(name).copied().unwrap_or(0)
    }

    /// Every observation recorded for gauge `name`, oldest first.
    pub fn gauge_observations(&self, name: &str) -> Vec<f64> {
        let gauges = self.gauges.lock().unwrap_or_else(|p| p.into_inner());
        gauges.get(name).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        let counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        let gauges = self.gauges.lock().unwrap_or_else(|p| p.into_inner());
        counters.is_empty() && gauges.is_empty()
    }
}

impl MetricsSink for InMemorySink {
    fn incr_counter(&self, name: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        *counters.entry(name.to_string()).or_insert(0) += 1;
    }

    fn record_gauge(&self, name: &str, value: f64) {
        let mut gauges = self.gauges.lock().unwrap_or_else(|p| p.into_inner());
        gauges.entry(name.to_string()).or_default().push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_counts_and_records() {
        let sink = InMemorySink::new();
        assert!(sink.is_empty());

        sink.incr_counter(ENDPOINT_SUCCESS);
        sink.incr_counter(ENDPOINT_SUCCESS);
        sink.record_gauge(ENDPOINT_RESPONSE, 200.0);
        sink.record_gauge(ENDPOINT_RESPONSE, 503.0);

        assert_eq!(sink.counter(ENDPOINT_SUCCESS), 2);
        assert_eq!(sink.counter(ENDPOINT_FAILURE), 0);
        assert_eq!(sink.gauge_observations(ENDPOINT_RESPONSE), vec![200.0, 503.0]);
        assert!(!sink.is_empty());
    }

    #[test]
    fn in_memory_sink_handles_concurrent_writers() {
        let sink = Arc::new(InMemorySink::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        sink.incr_counter(ENDPOINT_SUCCESS);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.counter(ENDPOINT_SUCCESS), 800);
    }

    #[test]
    fn prometheus_sink_exports_prefixed_names() {
        let sink = PrometheusSink::new("trickler");
        sink.incr_counter(ENDPOINT_SUCCESS);
        sink.incr_counter(ENDPOINT_SUCCESS);
        sink.record_gauge(ENDPOINT_RESPONSE, 404.0);

        let output = sink.gather_string();
        assert!(output.contains("trickler_endpoint_success 2"), "{}", output);
        assert!(output.contains("trickler_endpoint_response 404"), "{}", output);
    }

    #[test]
    fn prometheus_gauge_keeps_last_value() {
        let sink = PrometheusSink::new("trickler");
        sink.record_gauge(ENDPOINT_RESPONSE, 200.0);
        sink.record_gauge(ENDPOINT_RESPONSE, 500.0);

        let output = sink.gather_string();
        assert!(output.contains("trickler_endpoint_response 500"), "{}", output);
    }

    #[test]
    fn statsd_sink_tolerates_missing_collector() {
        // Nothing listens on this port; sends must still succeed silently.
        let sink = StatsdSink::new("127.0.0.1", 9, "trickler").unwrap();
        sink.incr_counter(ENDPOINT_FAILURE);
        sink.record_gauge(ENDPOINT_RESPONSE, 200.0);
    }

    #[test]
    fn metric_names_are_sanitized() {
        assert_eq!(sanitize_metric_name("endpoint.success"), "endpoint_success");
        assert_eq!(sanitize_metric_name("my-app"), "my_app");
    }
}
