//! Error types and handling for Landau
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Landau operations
pub type Result<T> = std::result::Result<T, LandauError>;

/// Main error type for Landau
#[derive(Debug, Error)]
pub enum LandauError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Login response missing customer id or token
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Non-2xx response from the vendor cloud
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Network/transport errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Malformed response body
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Vendor API contract errors (unexpected payload shape)
    #[error("API error: {message}")]
    Api { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl LandauError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        LandauError::Config {
            message: message.into(),
        }
    }

    /// Create a new authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        LandauError::Auth {
            message: message.into(),
        }
    }

    /// Create a new HTTP status error
    pub fn http<S: Into<String>>(status: u16, message: S) -> Self {
        LandauError::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        LandauError::Network {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        LandauError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        LandauError::Decode {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        LandauError::Io {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        LandauError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        LandauError::Api {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        LandauError::Generic {
            message: message.into(),
        }
    }

    /// True when this error is an HTTP 401 from the vendor cloud
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, LandauError::Http { status: 401, .. })
    }
}

impl From<std::io::Error> for LandauError {
    fn from(err: std::io::Error) -> Self {
        LandauError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for LandauError {
    fn from(err: serde_yaml::Error) -> Self {
        LandauError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LandauError {
    fn from(err: serde_json::Error) -> Self {
        LandauError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for LandauError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LandauError::timeout(err.to_string())
        } else if err.is_decode() {
            LandauError::decode(err.to_string())
        } else {
            LandauError::network(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for LandauError {
    fn from(err: chrono::ParseError) -> Self {
        LandauError::validation("datetime", &err.to_string())
    }
}
