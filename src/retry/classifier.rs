//! Error surface classification.
//!
//! Errors arrive as loosely-structured surfaces (message text, an HTTP
//! status, sometimes a well-known exception name). The classifier maps that
//! surface onto an [`ErrorCategory`]; anything unrecognized lands in
//! `Default` and gets the conservative middle-of-the-road policy.

use serde::{Deserialize, Serialize};

use super::policy::ErrorCategory;

/// What is observable about a failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorSurface {
    pub message: String,
    pub status: Option<u16>,
    pub exception_name: Option<String>,
}

impl ErrorSurface {
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            exception_name: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_exception(mut self, name: impl Into<String>) -> Self {
        self.exception_name = Some(name.into());
        self
    }
}

impl std::fmt::Display for ErrorSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        Ok(())
    }
}

/// Stateless surface-to-category mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    #[must_use]
    pub fn classify(&self, surface: &ErrorSurface) -> ErrorCategory {
        if let Some(status) = surface.status {
            match status {
                429 => return ErrorCategory::RateLimit,
                401 | 403 => return ErrorCategory::Permission,
                404 => return ErrorCategory::NotFound,
                500..=599 => return ErrorCategory::Server,
                _ => {}
            }
        }

        if let Some(name) = &surface.exception_name {
            match name.as_str() {
                "AbortError" | "TimeoutError" => return ErrorCategory::Timeout,
                "QuotaExceededError" | "RangeError" => return ErrorCategory::Memory,
                "SecurityError" => return ErrorCategory::Permission,
                _ => {}
            }
        }

        let msg = surface.message.to_lowercase();
        if msg.contains("cors") || msg.contains("cross-origin") {
            return ErrorCategory::Cors;
        }
        if msg.contains("rate limit") || msg.contains("too many requests") || msg.contains("429") {
            return ErrorCategory::RateLimit;
        }
        if msg.contains("timeout") || msg.contains("timed out") {
            return ErrorCategory::Timeout;
        }
        if msg.contains("dns")
            || msg.contains("connection")
            || msg.contains("network")
            || msg.contains("reset")
            || msg.contains("refused")
            || msg.contains("unreachable")
            || msg.contains("tls")
            || msg.contains("eof")
        {
            return ErrorCategory::Network;
        }
        if msg.contains("permission") || msg.contains("denied") || msg.contains("forbidden") {
            return ErrorCategory::Permission;
        }
        if msg.contains("not found") {
            return ErrorCategory::NotFound;
        }
        if msg.contains("memory") || msg.contains("allocation") {
            return ErrorCategory::Memory;
        }
        if msg.contains("invalid")
            || msg.contains("validation")
            || msg.contains("malformed")
            || msg.contains("selector")
        {
            return ErrorCategory::Validation;
        }
        if msg.contains("extension") {
            return ErrorCategory::Extension;
        }
        ErrorCategory::Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_takes_precedence() {
        let classifier = ErrorClassifier;
        let surface = ErrorSurface::from_message("something").with_status(429);
        assert_eq!(classifier.classify(&surface), ErrorCategory::RateLimit);
        let surface = ErrorSurface::from_message("x").with_status(503);
        assert_eq!(classifier.classify(&surface), ErrorCategory::Server);
        let surface = ErrorSurface::from_message("x").with_status(403);
        assert_eq!(classifier.classify(&surface), ErrorCategory::Permission);
        let surface = ErrorSurface::from_message("x").with_status(404);
        assert_eq!(classifier.classify(&surface), ErrorCategory::NotFound);
    }

    #[test]
    fn test_message_patterns() {
        let classifier = ErrorClassifier;
        for (message, expected) in [
            ("connection reset by peer", ErrorCategory::Network),
            ("DNS lookup failed", ErrorCategory::Network),
            ("request timed out", ErrorCategory::Timeout),
            ("blocked by CORS policy", ErrorCategory::Cors),
            ("invalid selector syntax", ErrorCategory::Validation),
            ("out of memory", ErrorCategory::Memory),
            ("some new failure mode", ErrorCategory::Default),
        ] {
            assert_eq!(
                classifier.classify(&ErrorSurface::from_message(message)),
                expected,
                "{message}"
            );
        }
    }

    #[test]
    fn test_exception_names() {
        let classifier = ErrorClassifier;
        let surface = ErrorSurface::from_message("aborted").with_exception("AbortError");
        assert_eq!(classifier.classify(&surface), ErrorCategory::Timeout);
    }
}
