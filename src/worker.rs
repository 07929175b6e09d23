use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::errors::ErrorCategory;
use crate::fake_data::FakeDataSource;
use crate::headers::{to_header_map, HeaderError};
use crate::metrics::{MetricsSink, ENDPOINT_FAILURE, ENDPOINT_RESPONSE, ENDPOINT_SUCCESS};
use crate::template::PayloadRenderer;
use crate::yaml_config::EndpointDescriptor;

/// Response bytes read before the rest of the body is discarded.
const MAX_DRAIN_BYTES: usize = 64 * 1024;

/// Errors building the outbound request for a tick.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("Failed to build request: {0}")]
    Build(#[source] reqwest::Error),
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The body template could not be rendered; nothing was sent.
    RenderFailed,
    /// The request could not be built from the descriptor.
    ConstructionFailed,
    /// The request was sent but no response came back.
    TransportFailed,
    /// A response arrived, whatever its status code.
    Delivered { status: u16 },
}

/// Drives one endpoint on its own schedule.
pub struct EndpointWorker {
    endpoint: EndpointDescriptor,
    client: reqwest::Client,
    renderer: PayloadRenderer,
    data_source: Arc<dyn FakeDataSource>,
    metrics: Arc<dyn MetricsSink>,
    count_transport_failures: bool,
}

impl EndpointWorker {
    pub fn new(
        endpoint: EndpointDescriptor,
        client: reqwest::Client,
        renderer: PayloadRenderer,
        data_source: Arc<dyn FakeDataSource>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            endpoint,
            client,
            renderer,
            data_source,
            metrics,
            count_transport_failures: true,
        }
    }

    /// Whether transport errors increment `endpoint.failure`. Request
    /// construction errors are always counted.
    pub fn count_transport_failures(mut self, enabled: bool) -> Self {
        self.count_transport_failures = enabled;
        self
    }

    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.endpoint
    }

    /// Ticks every `frequency` seconds until `shutdown` flips to `true` or its
    /// sender is dropped.
    ///
    /// Ticks never overlap. A cycle that overruns its interval is followed by
    /// at most one immediate tick, after which the schedule realigns. Disabled
    /// endpoints return at once without sending anything.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Some(period) = self.endpoint.interval() else {
            if self.endpoint.url.is_empty() {
                warn!("Endpoint has no URL; it will not run");
            } else {
                warn!(
                    url = %self.endpoint.url,
                    frequency_secs = self.endpoint.frequency_seconds,
                    "Invalid frequency for endpoint; must be greater than zero"
                );
            }
            return;
        };

        if *shutdown.borrow() {
            return;
        }

        let Some(first_tick) = Instant::now().checked_add(period) else {
            warn!(
                url = %self.endpoint.url,
                frequency_secs = self.endpoint.frequency_seconds,
                "Frequency is too large to schedule; endpoint will not run"
            );
            return;
        };

        let mut ticker = time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            url = %self.endpoint.url,
            method = %self.endpoint.method,
            period = ?period,
            "Endpoint worker starting"
        );

        loop {
            // Shutdown wins over a tick that is already due.
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!(url = %self.endpoint.url, "Endpoint worker stopped");
    }

    /// Runs one send cycle: render, build, send, record.
    ///
    /// Every failure is handled here; the worker keeps ticking afterwards.
    pub async fn tick(&self) -> TickOutcome {
        let url = &self.endpoint.url;

        let record = self.data_source.next_record();
        let payload = match self.renderer.render(&self.endpoint.body_template, &record) {
            Ok(payload) => payload,
            Err(e) => {
                error!(url = %url, error = %e, "Failed to generate payload");
                return TickOutcome::RenderFailed;
            }
        };

        debug!(url = %url, payload = %payload, "Sending payload");

        let request = match self.build_request(payload) {
            Ok(request) => request,
            Err(e) => {
                error!(url = %url, error = %e, "Failed to create request");
                self.metrics.incr_counter(ENDPOINT_FAILURE);
                return TickOutcome::ConstructionFailed;
            }
        };

        match self.client.execute(request).await {
            Ok(mut response) => {
                let status = response.status();
                info!(url = %url, status = %status, "Response received");

                self.metrics.incr_counter(ENDPOINT_SUCCESS);
                self.metrics
                    .record_gauge(ENDPOINT_RESPONSE, f64::from(status.as_u16()));

                drain_body(&mut response).await;

                TickOutcome::Delivered {
                    status: status.as_u16(),
                }
            }
            Err(e) => {
                let category = ErrorCategory::from_reqwest_error(&e);
                error!(
                    url = %url,
                    error = %crate::errors::full_message(&e),
                    error_category = %category.label(),
                    "Request failed"
                );
                if self.count_transport_failures {
                    self.metrics.incr_counter(ENDPOINT_FAILURE);
                }
                TickOutcome::TransportFailed
            }
        }
    }

    /// Builds the request for one tick. Headers are applied verbatim.
    pub fn build_request(&self, payload: String) -> Result<reqwest::Request, DispatchError> {
        let method = parse_method(&self.endpoint.method)?;
        let url = reqwest::Url::parse(&self.endpoint.url).map_err(|e| DispatchError::InvalidUrl {
            url: self.endpoint.url.clone(),
            reason: e.to_string(),
        })?;
        let headers = to_header_map(&self.endpoint.headers)?;

        self.client
            .request(method, url)
            .headers(headers)
            .body(payload)
            .build()
            .map_err(DispatchError::Build)
    }
}

/// Reads and discards up to [`MAX_DRAIN_BYTES`] of a response body so a short
/// body can return its connection to the pool. Longer bodies are dropped
/// unread. Returns the number of bytes read.
async fn drain_body(response: &mut reqwest::Response) -> usize {
    let mut drained = 0;
    while drained < MAX_DRAIN_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => drained += chunk.len(),
            _ => break,
        }
    }
    drained
}

/// An empty method means GET; anything else must be a valid HTTP token.
fn parse_method(method: &str) -> Result<reqwest::Method, DispatchError> {
    if method.is_empty() {
        return Ok(reqwest::Method::GET);
    }
    reqwest::Method::from_bytes(method.as_bytes())
        .map_err(|_| DispatchError::InvalidMethod(method.to_string()))
}
