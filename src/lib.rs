pub mod client;
pub mod config;
pub mod errors;
pub mod fake_data;
pub mod headers;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod scheduler;
pub mod template;
pub mod utils;
pub mod worker;
pub mod yaml_config;
