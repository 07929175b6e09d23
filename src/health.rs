//! Readiness predicate for `--health`.
//!
//! Passes when the endpoint document loads and every enabled endpoint's body
//! template renders against a fabricated record. Nothing is sent.

use std::path::Path;
use tracing::error;

use crate::fake_data::FakeDataSource;
use crate::template::PayloadRenderer;
use crate::yaml_config::YamlConfig;

pub fn perform_health_checks<P: AsRef<Path>>(
    config_path: P,
    renderer: &PayloadRenderer,
    data_source: &dyn FakeDataSource,
) -> bool {
    let config = match YamlConfig::from_file(config_path.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!(path = ?config_path.as_ref(), error = %e, "Health check: config did not load");
            return false;
        }
    };

    let record = data_source.next_record();
    let mut healthy = true;
    for endpoint in config.endpoints.iter().filter(|e| e.is_enabled()) {
        if let Err(e) = renderer.render(&endpoint.body_template, &record) {
            error!(url = %endpoint.url, error = %e, "Health check: template did not render");
            healthy = false;
        }
    }
    healthy
}
