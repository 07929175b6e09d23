use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

const DEFAULT_LEVEL: &str = "info";

/// Builds the filter from `LOG_LEVEL`, falling back to `info` when the value
/// is missing or cannot be parsed.
///
/// A bare value must name a level (`warning`, `fatal` and `panic` are accepted
/// as aliases). Values containing `=` are taken as full filter directives.
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    let Some(level) = level.map(str::trim).filter(|l| !l.is_empty()) else {
        return EnvFilter::new(DEFAULT_LEVEL);
    };

    if level.contains('=') {
        return EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
    }

    match parse_level(level) {
        Some(filter) => EnvFilter::new(filter.to_string()),
        None => EnvFilter::new(DEFAULT_LEVEL),
    }
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_ascii_lowercase().as_str() {
        "warning" => Some(LevelFilter::WARN),
        "fatal" | "panic" => Some(LevelFilter::ERROR),
        other => LevelFilter::from_str(other).ok(),
    }
}

/// Installs the global tracing subscriber.
pub fn init(level: Option<&str>, format: LogFormat) {
    let filter = env_filter(level);
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}
