use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use trickler::client::build_client;
use trickler::config::{MetricsBackend, Settings};
use trickler::fake_data::{FakeDataSource, FakerSource};
use trickler::health::perform_health_checks;
use trickler::logging;
use trickler::metrics::{start_metrics_server, MetricsSink, NoopSink, PrometheusSink, StatsdSink};
use trickler::scheduler::Scheduler;
use trickler::template::PayloadRenderer;
use trickler::yaml_config::{load_endpoints, DEFAULT_CONFIG_PATH};

/// Sends templated synthetic traffic to HTTP endpoints on a fixed schedule.
#[derive(Parser, Debug)]
#[command(name = "trickler", version)]
struct Cli {
    /// Check that the config and templates load, then exit 0 (pass) or 1 (fail)
    #[arg(long)]
    health: bool,

    /// Path of the endpoint document
    #[arg(long, env = "TRICKLER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// Builds the metrics sink for the configured backend. A StatsD client that
/// cannot be created only disables metrics.
fn build_metrics_sink(settings: &Settings) -> Arc<dyn MetricsSink> {
    match settings.metrics_backend {
        MetricsBackend::Statsd => {
            match StatsdSink::new(
                &settings.statsd_host,
                settings.statsd_port,
                &settings.metric_prefix,
            ) {
                Ok(sink) => Arc::new(sink),
                Err(e) => {
                    warn!(error = %e, "Failed to create StatsD client; metrics disabled");
                    Arc::new(NoopSink)
                }
            }
        }
        MetricsBackend::Prometheus => {
            let sink = Arc::new(PrometheusSink::new(&settings.metric_prefix));
            tokio::spawn(start_metrics_server(settings.prometheus_port, sink.clone()));
            sink
        }
        MetricsBackend::None => {
            info!("Metrics disabled");
            Arc::new(NoopSink)
        }
    }
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(settings.log_level.as_deref(), settings.log_format);

    let data_source: Arc<dyn FakeDataSource> = Arc::new(FakerSource::new());
    let renderer = PayloadRenderer::new();

    if cli.health {
        if perform_health_checks(&cli.config, &renderer, data_source.as_ref()) {
            println!("Health check passed");
            std::process::exit(0);
        } else {
            println!("Health check failed");
            std::process::exit(1);
        }
    }

    settings.log_summary();
    let metrics = build_metrics_sink(&settings);

    let endpoints = match load_endpoints(&cli.config) {
        Ok(endpoints) => endpoints,
        Err(e) => {
            error!(path = ?cli.config, error = %e, "Error loading config");
            std::process::exit(1);
        }
    };

    let client = build_client(&settings.to_client_config())?;

    Scheduler::new(client, data_source, metrics)
        .with_renderer(renderer)
        .count_transport_failures(settings.count_transport_failures)
        .run_until(endpoints, shutdown_signal())
        .await;

    Ok(())
}
