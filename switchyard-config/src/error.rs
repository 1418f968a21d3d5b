// Error types for configuration loading

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Unknown interceptor '{0}' in route manifest")]
    UnknownInterceptor(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvError(#[from] std::env::VarError),

    #[error(transparent)]
    Dispatch(#[from] switchyard_core::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
