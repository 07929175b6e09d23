//! Header placeholder resolution.
//!
//! Header values in the endpoint document may carry a single `{NAME}`
//! placeholder which is replaced with the value of the environment variable
//! `NAME`. Resolution happens once, when the configuration is loaded, so
//! workers only ever see final header values.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Errors converting resolved headers into a typed header map.
#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid header name '{name}': {source}")]
    InvalidName {
        name: String,
        #[source]
        source: reqwest::header::InvalidHeaderName,
    },

    #[error("Invalid header value for '{name}': {source}")]
    InvalidValue {
        name: String,
        #[source]
        source: reqwest::header::InvalidHeaderValue,
    },
}

/// Location of a `{NAME}` placeholder inside a header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placeholder<'a> {
    open: usize,
    close: usize,
    name: &'a str,
}

/// Finds the first `{` and the first `}` after it.
///
/// Returns `None` when there is no closing brace after the opening one, or
/// when the enclosed name is empty or itself contains a `{`.
fn find_placeholder(value: &str) -> Option<Placeholder<'_>> {
    let open = value.find('{')?;
    let close = open + 1 + value[open + 1..].find('}')?;
    let name = &value[open + 1..close];

    if name.is_empty() || name.contains('{') {
        return None;
    }

    Some(Placeholder { open, close, name })
}

/// Resolves the placeholder in a single header value.
///
/// Values without a brace pair come back unchanged. A variable that is unset
/// or empty is substituted with the empty string and a warning is logged.
pub fn resolve_value<F>(header: &str, value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !(value.contains('{') && value.contains('}')) {
        return value.to_string();
    }

    let Some(placeholder) = find_placeholder(value) else {
        warn!(
            header = %header,
            "Malformed placeholder in header value; leaving it untouched"
        );
        return value.to_string();
    };

    let replacement = match lookup(placeholder.name) {
        Some(v) if !v.is_empty() => v,
        _ => {
            warn!(
                header = %header,
                variable = %placeholder.name,
                "Environment variable not set; substituting empty string"
            );
            String::new()
        }
    };

    format!(
        "{}{}{}",
        &value[..placeholder.open],
        replacement,
        &value[placeholder.close + 1..]
    )
}

/// Resolves placeholders in every header value using `lookup`.
pub fn resolve_placeholders_with<F>(headers: &mut BTreeMap<String, String>, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (name, value) in headers.iter_mut() {
        let resolved = resolve_value(name, value, &lookup);
        *value = resolved;
    }
}

/// Resolves placeholders in every header value against the process environment.
pub fn resolve_env_placeholders(headers: &mut BTreeMap<String, String>) {
    resolve_placeholders_with(headers, |name| env::var(name).ok());
}

/// Converts resolved headers into a [`HeaderMap`], applying them verbatim.
pub fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, HeaderError> {
    let mut map = HeaderMap::with_capacity(headers.len());

    for (name, value) in headers {
        let header_name = HeaderName::from_str(name).map_err(|source| HeaderError::InvalidName {
            name: name.clone(),
            source,
        })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|source| HeaderError::InvalidValue {
                name: name.clone(),
                source,
            })?;
        if map.insert(header_name, header_value).is_some() {
            warn!(
                header = %name,
                "Header configured more than once with different casing; keeping the last value"
            );
        }
    }

    Ok(map)
}
