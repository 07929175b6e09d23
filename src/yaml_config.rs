//! YAML endpoint document.
//!
//! The document lists the endpoints to exercise. Each entry names a target
//! URL, the HTTP method, headers, a body template and a tick frequency in
//! seconds:
//!
//! ```yaml
//! endpoints:
//!   - url: https://example.com/leads
//!     method: POST
//!     headers:
//!       Authorization: "Bearer {API_KEY}"
//!     body: templates/partner.json
//!     frequency: 10
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::headers::resolve_env_placeholders;

/// Default location of the endpoint document.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Errors that can occur when loading or parsing the endpoint document.
#[derive(Error, Debug)]
pub enum YamlConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

/// Static description of one destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointDescriptor {
    pub url: String,

    #[serde(default)]
    pub method: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Path of the template rendered into the request body.
    #[serde(rename = "body", default)]
    pub body_template: String,

    /// Tick interval in seconds. Non-positive values disable the endpoint.
    #[serde(rename = "frequency", default)]
    pub frequency_seconds: i64,
}

impl EndpointDescriptor {
    /// Tick interval, or `None` when the endpoint must not run.
    pub fn interval(&self) -> Option<Duration> {
        if self.url.is_empty() || self.frequency_seconds <= 0 {
            return None;
        }
        Some(Duration::from_secs(self.frequency_seconds as u64))
    }

    pub fn is_enabled(&self) -> bool {
        self.interval().is_some()
    }
}

/// Root of the endpoint document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct YamlConfig {
    #[serde(default)]
    pub endpoints: Vec<EndpointDescriptor>,
}

impl YamlConfig {
    /// Parses an endpoint document from a YAML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(yaml: &str) -> Result<Self, YamlConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses an endpoint document from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, YamlConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_str(&content)
    }

    /// Resolves `{NAME}` header placeholders in every endpoint.
    pub fn resolve_headers(&mut self) {
        for endpoint in &mut self.endpoints {
            resolve_env_placeholders(&mut endpoint.headers);
        }
    }
}

/// Loads the endpoint document, resolves header placeholders once and logs
/// every endpoint that was found.
pub fn load_endpoints<P: AsRef<Path>>(path: P) -> Result<Vec<EndpointDescriptor>, YamlConfigError> {
    let path = path.as_ref();
    let mut config = YamlConfig::from_file(path)?;
    config.resolve_headers();

    for endpoint in &config.endpoints {
        info!(
            url = %endpoint.url,
            method = %endpoint.method,
            frequency_secs = endpoint.frequency_seconds,
            "Loaded endpoint"
        );
    }
    info!(
        path = ?path,
        endpoints = config.endpoints.len(),
        "Endpoint configuration loaded"
    );

    Ok(config.endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_endpoint() {
        let yaml = r#"
endpoints:
  - url: "https://api.example.com/leads"
    method: "POST"
    headers:
      Authorization: "Bearer token"
      Content-Type: "application/json"
    body: "templates/partner.json"
    frequency: 5
"#;
        let config = YamlConfig::from_str(yaml).unwrap();
        assert_eq!(config.endpoints.len(), 1);

        let endpoint = &config.endpoints[0];
        assert_eq!(endpoint.url, "https://api.example.com/leads");
        assert_eq!(endpoint.method, "POST");
        assert_eq!(endpoint.headers.len(), 2);
        assert_eq!(endpoint.body_template, "templates/partner.json");
        assert_eq!(endpoint.frequency_seconds, 5);
        assert_eq!(endpoint.interval(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn optional_fields_default() {
        let yaml = r#"
endpoints:
  - url: "http://localhost/ping"
    method: "GET"
"#;
        let endpoint = &YamlConfig::from_str(yaml).unwrap().endpoints[0];
        assert!(endpoint.headers.is_empty());
        assert!(endpoint.body_template.is_empty());
        assert_eq!(endpoint.frequency_seconds, 0);
        assert!(!endpoint.is_enabled());
    }

    #[test]
    fn negative_frequency_disables_endpoint() {
        let yaml = r#"
endpoints:
  - url: "http://localhost/ping"
    method: "GET"
    frequency: -3
"#;
        let endpoint = &YamlConfig::from_str(yaml).unwrap().endpoints[0];
        assert_eq!(endpoint.interval(), None);
    }

    #[test]
    fn empty_url_disables_endpoint() {
        let endpoint = EndpointDescriptor {
            url: String::new(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body_template: String::new(),
            frequency_seconds: 1,
        };
        assert!(!endpoint.is_enabled());
    }

    #[test]
    fn preserves_endpoint_order() {
        let yaml = r#"
endpoints:
  - url: "http://a"
    frequency: 1
  - url: "http://b"
    frequency: 2
  - url: "http://c"
    frequency: 3
"#;
        let urls: Vec<_> = YamlConfig::from_str(yaml)
            .unwrap()
            .endpoints
            .into_iter()
            .map(|e| e.url)
            .collect();
        assert_eq!(urls, vec!["http://a", "http://b", "http://c"]);
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let err = YamlConfig::from_str("endpoints: [url: ").unwrap_err();
        assert!(matches!(err, YamlConfigError::YamlParse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = YamlConfig::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, YamlConfigError::FileRead(_)));
    }
}
