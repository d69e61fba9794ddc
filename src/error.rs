//! Error types for the swarm gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error types that can occur while serving swarm content over HTTP
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Invalid content identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed range header: {0}")]
    MalformedRange(String),

    #[error("Unsatisfiable range: {0}")]
    UnsatisfiableRange(String),

    #[error("Multiple ranges are not supported: {0}")]
    UnsupportedMultiRange(String),

    #[error("Acquisition failed for {id}: {message}")]
    AcquisitionFailed { id: String, message: String },

    #[error("Acquisition of {id} timed out after {seconds}s")]
    AcquisitionTimeout { id: String, seconds: u64 },

    #[error("Manifest error: {0}")]
    ManifestError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::IoError(err.to_string())
    }
}

impl From<serde_bencode::Error> for GatewayError {
    fn from(err: serde_bencode::Error) -> Self {
        GatewayError::ManifestError(err.to_string())
    }
}

impl From<http::Error> for GatewayError {
    fn from(err: http::Error) -> Self {
        GatewayError::HttpError(err.to_string())
    }
}

impl GatewayError {
    /// Convert error to HTTP status code
    ///
    /// Validation failures resolve to 4xx codes before any byte is written:
    /// - Bad identifier or index/filename: 404
    /// - Unparseable range: 400
    /// - Unsatisfiable, non-byte or multiple ranges: 416
    ///
    /// Swarm-side failures become 502/504, everything else 500.
    pub fn to_http_status(&self) -> u16 {
        match self {
            GatewayError::InvalidIdentifier(_) => 404,
            GatewayError::NotFound(_) => 404,

            GatewayError::MalformedRange(_) => 400,
            GatewayError::UnsatisfiableRange(_) => 416,
            GatewayError::UnsupportedMultiRange(_) => 416,

            GatewayError::AcquisitionFailed { .. } => 502,
            GatewayError::ManifestError(_) => 502,
            GatewayError::AcquisitionTimeout { .. } => 504,

            GatewayError::ConfigError(_) => 500,
            GatewayError::IoError(_) => 500,
            GatewayError::HttpError(_) => 500,
            GatewayError::InternalError(_) => 500,
        }
    }

    /// Whether the error was caused by the request rather than the gateway
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.to_http_status())
    }

    /// Create an AcquisitionFailed error for an identifier
    pub fn acquisition_failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::AcquisitionFailed {
            id: id.into(),
            message: message.into(),
        }
    }
}
