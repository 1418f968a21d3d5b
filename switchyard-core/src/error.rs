// Error types for the switchyard dispatch engine

use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Dispatch errors
    #[error("No handler found for {method} {path}")]
    NoHandlerFound { method: String, path: String },

    #[error("No adapter for handler [{0}]: the dispatcher needs an adapter that supports this handler")]
    NoAdapter(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Could not resolve view: {0}")]
    ViewResolution(String),

    #[error("Multipart resolution failed: {0}")]
    Multipart(String),

    #[error("Asynchronous handling aborted: {0}")]
    AsyncAborted(String),

    // Handler errors
    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // 4xx Client Errors
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    // 5xx Server Errors
    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        let status = match self {
            Error::NoHandlerFound { .. } | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Multipart(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::ServiceUnavailable(_) | Error::AsyncAborted(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // Default to 500 for unmapped errors
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.as_u16()
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Whether the error aborts dispatch without consulting exception resolvers.
    ///
    /// Missing adapters, broken configuration and unresolvable views are
    /// programming errors; no resolver can turn them into a useful response.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NoAdapter(_) | Error::Configuration(_) | Error::ViewResolution(_)
        )
    }

    /// Stable identifier for the variant, used by kind-based exception mappings.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NoHandlerFound { .. } => "NoHandlerFound",
            Error::NoAdapter(_) => "NoAdapter",
            Error::Configuration(_) => "Configuration",
            Error::ViewResolution(_) => "ViewResolution",
            Error::Multipart(_) => "Multipart",
            Error::AsyncAborted(_) => "AsyncAborted",
            Error::Handler(_) => "Handler",
            Error::Serialization(_) => "Serialization",
            Error::Internal(_) => "Internal",
            Error::Io(_) => "Io",
            Error::BadRequest(_) => "BadRequest",
            Error::Unauthorized(_) => "Unauthorized",
            Error::Forbidden(_) => "Forbidden",
            Error::NotFound(_) => "NotFound",
            Error::MethodNotAllowed(_) => "MethodNotAllowed",
            Error::Conflict(_) => "Conflict",
            Error::UnsupportedMediaType(_) => "UnsupportedMediaType",
            Error::PayloadTooLarge(_) => "PayloadTooLarge",
            Error::ServiceUnavailable(_) => "ServiceUnavailable",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
