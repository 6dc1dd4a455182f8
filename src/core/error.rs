//! Typed error handling for the numismatics API
//!
//! Every failure a handler can produce is an [`ApiError`]. Each variant wraps a
//! category enum so callers (and tests) can match specific cases instead of
//! inspecting strings.
//!
//! # Error Categories
//!
//! - [`EntityError`]: missing rows or unknown resources
//! - [`ConfigError`]: process and resource configuration problems
//! - [`ValidationError`]: rejected `order_by` or filter input
//! - [`StorageError`]: data access failures
//! - [`RequestError`]: authentication, authorization and malformed paths
//!
//! # Example
//!
//! ```rust,ignore
//! match parse_order_by("bogus", &resource) {
//!     Err(ValidationError::UnknownField { field }) => println!("rejected {}", field),
//!     Err(e) => eprintln!("other: {}", e),
//!     Ok(spec) => println!("{} keys", spec.len()),
//! }
//! ```

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Realm advertised in `WWW-Authenticate` challenges.
pub const AUTH_REALM: &str = "numismatics";

/// The main error type for the API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Row or resource lookup errors
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Storage backend errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// HTTP/Request errors
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Entity(e) => e.status_code(),
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Request(e) => e.status_code(),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Entity(e) => e.error_code(),
            ApiError::Config(_) => "CONFIG_ERROR",
            ApiError::Validation(e) => e.error_code(),
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::Request(e) => e.error_code(),
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    ///
    /// Storage and internal failures are reported with a generic message;
    /// the underlying cause only goes to the log.
    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            ApiError::Storage(_) => "Data access failed".to_string(),
            ApiError::Internal(_) | ApiError::Config(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        ErrorResponse {
            code: self.error_code().to_string(),
            message,
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Validation(ValidationError::UnknownField { field }) => {
                Some(serde_json::json!({ "field": field }))
            }
            ApiError::Validation(ValidationError::InvalidValue { field, value, .. }) => {
                Some(serde_json::json!({ "field": field, "value": value }))
            }
            ApiError::Entity(EntityError::NotFound { resource, id }) => {
                Some(serde_json::json!({ "resource": resource, "id": id }))
            }
            ApiError::Entity(EntityError::UnknownResource { resource }) => {
                Some(serde_json::json!({ "resource": resource }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut response = (status, Json(self.to_response())).into_response();
        if status == StatusCode::UNAUTHORIZED {
            let challenge = format!("Basic realm=\"{}\"", AUTH_REALM);
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

// =============================================================================
// Entity Errors
// =============================================================================

/// Errors related to row lookups
#[derive(Debug, Error)]
pub enum EntityError {
    /// Row was not found
    #[error("{resource} with id '{id}' not found")]
    NotFound { resource: String, id: i64 },

    /// Resource is not configured
    #[error("Unknown resource: {resource}")]
    UnknownResource { resource: String },
}

impl EntityError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EntityError::NotFound { .. } => StatusCode::NOT_FOUND,
            EntityError::UnknownResource { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            EntityError::NotFound { .. } => "ENTITY_NOT_FOUND",
            EntityError::UnknownResource { .. } => "UNKNOWN_RESOURCE",
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse a configuration file
    #[error("Failed to parse config '{}': {message}", .file.as_deref().unwrap_or("<inline>"))]
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Required environment variable is absent
    #[error("Missing required environment variable '{name}'")]
    MissingVar { name: String },

    /// Invalid value in configuration
    #[error("Invalid value '{value}' for '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// IO error while reading configuration
    #[error("IO error: {message}")]
    IoError { message: String },
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to request input validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A sort key or filter names a field outside the resource allow-list
    #[error("Unknown field '{field}'")]
    UnknownField { field: String },

    /// A filter value cannot be parsed for its field kind
    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::UnknownField { .. } => "UNKNOWN_FIELD",
            ValidationError::InvalidValue { .. } => "INVALID_VALUE",
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection error
    #[error("Failed to connect to {backend}: {message}")]
    ConnectionError { backend: String, message: String },

    /// Query execution error
    #[error("{backend} query error: {message}")]
    QueryError { backend: String, message: String },

    /// A column could not be decoded into its configured kind
    #[error("Failed to decode field '{field}': {message}")]
    DecodeError { field: String, message: String },

    /// The row producer stopped without signalling completion
    #[error("Row stream interrupted: {message}")]
    Interrupted { message: String },
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to HTTP requests
#[derive(Debug, Error)]
pub enum RequestError {
    /// Invalid path format
    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// Missing or rejected credentials
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Authenticated but not allowed
    #[error("Forbidden: {message}")]
    Forbidden { message: String },
}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            RequestError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden { .. } => StatusCode::FORBIDDEN,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidPath { .. } => "INVALID_PATH",
            RequestError::Unauthorized { .. } => "UNAUTHORIZED",
            RequestError::Forbidden { .. } => "FORBIDDEN",
        }
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<csv::Error> for ApiError {
    fn from(err: csv::Error) -> Self {
        ApiError::Internal(format!("CSV encoding failed: {}", err))
    }
}

/// A specialized Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Tests
// =============================================================================
