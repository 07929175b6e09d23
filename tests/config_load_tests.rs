//! Integration tests for loading the endpoint document and resolving header
//! placeholders from the environment.

use serial_test::serial;
use std::env;
use std::fs;
use std::sync::Arc;
use tempfile::NamedTempFile;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trickler::fake_data::FakerSource;
use trickler::metrics::{InMemorySink, ENDPOINT_FAILURE, ENDPOINT_RESPONSE, ENDPOINT_SUCCESS};
use trickler::template::PayloadRenderer;
use trickler::worker::{EndpointWorker, TickOutcome};
use trickler::yaml_config::{load_endpoints, YamlConfigError};

const API_KEY_VAR: &str = "TRICKLER_TEST_API_KEY";

fn write_config(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    fs::write(file.path(), yaml).unwrap();
    file
}

#[test]
#[serial]
fn placeholder_is_resolved_from_environment() {
    env::set_var(API_KEY_VAR, "abc123");
    let file = write_config(
        r#"
endpoints:
  - url: "http://x/ok"
    method: "GET"
    headers:
      Authorization: "Bearer {TRICKLER_TEST_API_KEY}"
      Accept: "application/json"
    frequency: 1
"#,
    );

    let endpoints = load_endpoints(file.path()).unwrap();
    env::remove_var(API_KEY_VAR);

    assert_eq!(endpoints[0].headers["Authorization"], "Bearer abc123");
    assert_eq!(endpoints[0].headers["Accept"], "application/json");
}

#[test]
#[serial]
fn unset_placeholder_becomes_empty_and_loading_continues() {
    env::remove_var(API_KEY_VAR);
    let file = write_config(
        r#"
endpoints:
  - url: "http://x/ok"
    method: "GET"
    headers:
      Authorization: "Bearer {TRICKLER_TEST_API_KEY}"
    frequency: 1
  - url: "http://y/ok"
    method: "GET"
    frequency: 2
"#,
    );

    let endpoints = load_endpoints(file.path()).unwrap();

    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].headers["Authorization"], "Bearer ");
    assert!(endpoints[1].is_enabled());
}

#[test]
fn unreadable_config_is_an_error() {
    let err = load_endpoints("/definitely/missing/config.yaml").unwrap_err();
    assert!(matches!(err, YamlConfigError::FileRead(_)));
}

#[test]
fn undecodable_config_is_an_error() {
    let file = write_config("endpoints:\n  - url: [unterminated\n");
    let err = load_endpoints(file.path()).unwrap_err();
    assert!(matches!(err, YamlConfigError::YamlParse(_)));
}

#[test]
fn bundled_config_and_template_load() {
    let root = env!("CARGO_MANIFEST_DIR");
    let endpoints = load_endpoints(format!("{}/config/config.yaml", root)).unwrap();
    assert!(!endpoints.is_empty(), "no endpoints in bundled config");
    assert!(!endpoints[0].url.is_empty());
    assert!(!endpoints[0].method.is_empty());

    let renderer = PayloadRenderer::with_base_dir(root);
    let record = trickler::fake_data::FakeDataSource::next_record(&FakerSource);
    let body = renderer.render(&endpoints[0].body_template, &record).unwrap();
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["email"], record.email.as_str());
}

#[tokio::test]
#[serial]
async fn resolved_header_reaches_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .and(header("Authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    env::set_var(API_KEY_VAR, "abc123");
    let file = write_config(&format!(
        r#"
endpoints:
  - url: "{}/ok"
    method: "GET"
    headers:
      Authorization: "Bearer {{TRICKLER_TEST_API_KEY}}"
    frequency: 1
"#,
        server.uri()
    ));
    let mut endpoints = load_endpoints(file.path()).unwrap();
    env::remove_var(API_KEY_VAR);

    let sink = Arc::new(InMemorySink::new());
    let worker = EndpointWorker::new(
        endpoints.remove(0),
        reqwest::Client::new(),
        PayloadRenderer::new(),
        Arc::new(FakerSource),
        sink.clone(),
    );

    assert_eq!(worker.tick().await, TickOutcome::Delivered { status: 200 });
    assert_eq!(sink.counter(ENDPOINT_SUCCESS), 1);
    assert_eq!(sink.gauge_observations(ENDPOINT_RESPONSE), vec![200.0]);
    assert_eq!(sink.counter(ENDPOINT_FAILURE), 0);
}
