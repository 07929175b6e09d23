//! Launches one independent worker per endpoint.
//!
//! Workers share the HTTP client, the fake data source and the metrics sink,
//! but nothing else: a slow endpoint never delays another one.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::fake_data::FakeDataSource;
use crate::metrics::MetricsSink;
use crate::template::PayloadRenderer;
use crate::worker::EndpointWorker;
use crate::yaml_config::EndpointDescriptor;

pub struct Scheduler {
    client: reqwest::Client,
    renderer: PayloadRenderer,
    data_source: Arc<dyn FakeDataSource>,
    metrics: Arc<dyn MetricsSink>,
    count_transport_failures: bool,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        client: reqwest::Client,
        data_source: Arc<dyn FakeDataSource>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            client,
            renderer: PayloadRenderer::new(),
            data_source,
            metrics,
            count_transport_failures: true,
            shutdown_tx,
        }
    }

    pub fn with_renderer(mut self, renderer: PayloadRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn count_transport_failures(mut self, enabled: bool) -> Self {
        self.count_transport_failures = enabled;
        self
    }

    /// Spawns one task per endpoint and returns their handles.
    ///
    /// Disabled endpoints get a task too; it logs a warning and ends at once.
    pub fn spawn(&self, endpoints: Vec<EndpointDescriptor>) -> Vec<JoinHandle<()>> {
        let enabled = endpoints.iter().filter(|e| e.is_enabled()).count();
        info!(
            endpoints = endpoints.len(),
            enabled = enabled,
            "Starting endpoint workers"
        );

        endpoints
            .into_iter()
            .map(|endpoint| {
                let worker = EndpointWorker::new(
                    endpoint,
                    self.client.clone(),
                    self.renderer.clone(),
                    self.data_source.clone(),
                    self.metrics.clone(),
                )
                .count_transport_failures(self.count_transport_failures);
                let shutdown_rx = self.shutdown_tx.subscribe();

                tokio::spawn(worker.run(shutdown_rx))
            })
            .collect()
    }

    /// Tells every worker to stop after its current tick.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Runs all endpoints until `signal` completes, then stops the workers and
    /// waits for them to finish.
    pub async fn run_until<F>(self, endpoints: Vec<EndpointDescriptor>, signal: F)
    where
        F: Future<Output = ()>,
    {
        let handles = self.spawn(endpoints);

        signal.await;
        info!("Shutdown requested; stopping endpoint workers");
        self.shutdown();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Endpoint worker ended abnormally");
            }
        }
        info!("All endpoint workers stopped");
    }
}
