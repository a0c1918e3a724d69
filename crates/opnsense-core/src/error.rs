//! Error types for appliance operations.
//!
//! This module provides the error taxonomy shared by every OPNsense client crate,
//! separating transport failures from failures the appliance reports inside a
//! successful HTTP response.

use thiserror::Error;

/// Main error type for appliance operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The appliance could not be reached (DNS, refused, reset, TLS)
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// A single HTTP call exceeded its timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Non-2xx HTTP status
    #[error("HTTP {status}: {message}")]
    HttpFailure {
        /// HTTP status code returned by the appliance
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response body was not valid or expected JSON
    #[error("Failed to parse appliance response: {0}")]
    ResponseParseFailure(String),

    /// 2xx response whose payload reports a logical failure
    #[error("Appliance reported failure: {0}")]
    ApplicationFailure(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid endpoint or path
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Invalid UUID format
    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Specialized result type for appliance operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailure(_) => "CONNECTION_FAILURE",
            Self::Timeout(_) => "TIMEOUT",
            Self::HttpFailure { .. } => "HTTP_FAILURE",
            Self::ResponseParseFailure(_) => "RESPONSE_PARSE_FAILURE",
            Self::ApplicationFailure(_) => "APPLICATION_FAILURE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::InvalidUuid(_) => "INVALID_UUID",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Returns true if a retry of the same request may succeed.
    ///
    /// Only transport-level conditions qualify: connection failures, timeouts,
    /// 429 and 5xx responses. Everything else surfaces on the first attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailure(_) | Self::Timeout(_) => true,
            Self::HttpFailure { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::ResponseParseFailure(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else if let Some(status) = err.status() {
            Self::HttpFailure {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::ConnectionFailure(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ResponseParseFailure(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Self::InvalidUuid(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> Error {
        Error::HttpFailure {
            status,
            message: "body".to_string(),
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::ConnectionFailure("test".to_string()).error_code(),
            "CONNECTION_FAILURE"
        );
        assert_eq!(Error::Timeout("test".to_string()).error_code(), "TIMEOUT");
        assert_eq!(http(500).error_code(), "HTTP_FAILURE");
        assert_eq!(
            Error::ResponseParseFailure("test".to_string()).error_code(),
            "RESPONSE_PARSE_FAILURE"
        );
        assert_eq!(
            Error::ApplicationFailure("test".to_string()).error_code(),
            "APPLICATION_FAILURE"
        );
        assert_eq!(
            Error::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(
            Error::InvalidEndpoint("test".to_string()).error_code(),
            "INVALID_ENDPOINT"
        );
        assert_eq!(
            Error::InvalidUuid("test".to_string()).error_code(),
            "INVALID_UUID"
        );
        assert_eq!(
            Error::InvalidRequest("test".to_string()).error_code(),
            "INVALID_REQUEST"
        );
        assert_eq!(
            Error::ValidationError("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(http(503).to_string(), "HTTP 503: body");
        assert_eq!(
            Error::ApplicationFailure("rule exists".to_string()).to_string(),
            "Appliance reported failure: rule exists"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::ConnectionFailure("reset".to_string()).is_transient());
        assert!(Error::Timeout("slow".to_string()).is_transient());
        assert!(http(500).is_transient());
        assert!(http(503).is_transient());
        assert!(http(429).is_transient());

        assert!(!http(400).is_transient());
        assert!(!http(401).is_transient());
        assert!(!http(404).is_transient());
        assert!(!Error::ApplicationFailure("failed".to_string()).is_transient());
        assert!(!Error::ResponseParseFailure("bad".to_string()).is_transient());
        assert!(!Error::InvalidRequest("bug".to_string()).is_transient());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::InvalidEndpoint(_)));
    }

    #[test]
    fn test_from_uuid_error() {
        let err = uuid::Uuid::parse_str("not-a-uuid").unwrap_err();
        let converted: Error = err.into();
        assert_eq!(converted.error_code(), "INVALID_UUID");
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ResponseParseFailure(_)));
    }
}
