use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::time::Duration;
use tracing::info;

use crate::client::ClientConfig;
use crate::utils::{parse_bool_flag, parse_duration_string};

pub const DEFAULT_STATSD_HOST: &str = "127.0.0.1";
pub const DEFAULT_STATSD_PORT: u16 = 8125;
pub const DEFAULT_METRIC_PREFIX: &str = "trickler";
pub const DEFAULT_PROMETHEUS_PORT: u16 = 9090;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors reading process settings from the environment.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl SettingsError {
    fn invalid(var: &'static str, value: &str, reason: impl fmt::Display) -> Self {
        SettingsError::InvalidValue {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Where counters and gauges are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsBackend {
    Statsd,
    Prometheus,
    None,
}

impl FromStr for MetricsBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "statsd" => Ok(MetricsBackend::Statsd),
            "prometheus" => Ok(MetricsBackend::Prometheus),
            "none" | "off" => Ok(MetricsBackend::None),
            other => Err(format!(
                "unknown backend '{}', expected statsd, prometheus or none",
                other
            )),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}', expected text or json", other)),
        }
    }
}

/// Process settings read from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub log_level: Option<String>,
    pub log_format: LogFormat,
    pub metrics_backend: MetricsBackend,
    pub statsd_host: String,
    pub statsd_port: u16,
    pub metric_prefix: String,
    pub prometheus_port: u16,
    pub request_timeout: Duration,
    pub skip_tls_verify: bool,
    pub count_transport_failures: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: None,
            log_format: LogFormat::Text,
            metrics_backend: MetricsBackend::Statsd,
            statsd_host: DEFAULT_STATSD_HOST.to_string(),
            statsd_port: DEFAULT_STATSD_PORT,
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            prometheus_port: DEFAULT_PROMETHEUS_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            skip_tls_verify: false,
            count_transport_failures: true,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T, E, F>(name: &'static str, parse: F) -> Result<Option<T>, SettingsError>
where
    F: Fn(&str) -> Result<T, E>,
    E: fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => parse(&raw)
            .map(Some)
            .map_err(|e| SettingsError::invalid(name, &raw, e)),
        None => Ok(None),
    }
}

impl Settings {
    /// Loads settings from environment variables, applying defaults.
    ///
    /// Runs before logging is set up, so it does not log. `LOG_LEVEL` is kept
    /// raw; an unparseable level falls back to `info` when logging is
    /// initialised rather than failing here.
    pub fn from_env() -> Result<Self, SettingsError> {
        let defaults = Settings::default();

        Ok(Settings {
            log_level: non_empty_var("LOG_LEVEL"),
            log_format: parse_var("LOG_FORMAT", LogFormat::from_str)?
                .unwrap_or(defaults.log_format),
            metrics_backend: parse_var("METRICS_BACKEND", MetricsBackend::from_str)?
                .unwrap_or(defaults.metrics_backend),
            statsd_host: non_empty_var("STATSD_HOST").unwrap_or(defaults.statsd_host),
            statsd_port: parse_var("STATSD_PORT", u16::from_str)?.unwrap_or(defaults.statsd_port),
            metric_prefix: non_empty_var("METRIC_PREFIX").unwrap_or(defaults.metric_prefix),
            prometheus_port: parse_var("PROMETHEUS_PORT", u16::from_str)?
                .unwrap_or(defaults.prometheus_port),
            request_timeout: parse_var("REQUEST_TIMEOUT", parse_duration_string)?
                .unwrap_or(defaults.request_timeout),
            skip_tls_verify: parse_var("SKIP_TLS_VERIFY", parse_bool_flag)?
                .unwrap_or(defaults.skip_tls_verify),
            count_transport_failures: parse_var("COUNT_TRANSPORT_FAILURES", parse_bool_flag)?
                .unwrap_or(defaults.count_transport_failures),
        })
    }

    /// Creates a ClientConfig from these settings.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: self.request_timeout,
            skip_tls_verify: self.skip_tls_verify,
        }
    }

    /// Logs the settings summary.
    pub fn log_summary(&self) {
        if self.metrics_backend == MetricsBackend::Statsd {
            info!(
                statsd_host = %self.statsd_host,
                statsd_port = self.statsd_port,
                "StatsD target"
            );
        }
        info!(
            metrics_backend = ?self.metrics_backend,
            metric_prefix = %self.metric_prefix,
            request_timeout = ?self.request_timeout,
            skip_tls_verify = self.skip_tls_verify,
            count_transport_failures = self.count_transport_failures,
            "Settings loaded"
        );
        if !self.count_transport_failures {
            info!("Transport errors will be logged but not counted as endpoint.failure");
        }
    }
}
