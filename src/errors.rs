//! Classification of failed deliveries.
//!
//! Transport failures are tagged with a category in the error log so an
//! operator can tell a refused connection from a timeout or a TLS problem.

/// Categories of transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network connectivity errors (DNS, connection refused, etc.)
    NetworkError,

    /// Request timeout errors
    TimeoutError,

    /// TLS/SSL certificate errors
    TlsError,

    /// Too many redirects or a redirect loop
    RedirectError,

    /// Other/unknown errors
    OtherError,
}

impl ErrorCategory {
    /// Categorize a reqwest error raised while sending a request.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return ErrorCategory::TimeoutError;
        }
        if error.is_redirect() {
            return ErrorCategory::RedirectError;
        }

        let error_msg = full_message(error).to_lowercase();
        if error_msg.contains("certificate") || error_msg.contains("tls") {
            ErrorCategory::TlsError
        } else if error.is_connect() || error.is_request() || error.is_body() {
            ErrorCategory::NetworkError
        } else {
            Self::from_message(&error_msg)
        }
    }

    /// Falls back to common patterns in the error text.
    fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("certificate") || message.contains("tls") || message.contains("ssl") {
            ErrorCategory::TlsError
        } else if message.contains("timeout") || message.contains("timed out") {
            ErrorCategory::TimeoutError
        } else if message.contains("dns")
            || message.contains("resolve")
            || message.contains("connect")
            || message.contains("connection")
        {
            ErrorCategory::NetworkError
        } else {
            ErrorCategory::OtherError
        }
    }

    /// Label attached to log lines for this category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::RedirectError => "redirect_error",
            ErrorCategory::OtherError => "other_error",
        }
    }
}

/// Joins an error with all of its sources. reqwest keeps the interesting
/// part (e.g. "connection refused") in the source chain.
pub fn full_message(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
