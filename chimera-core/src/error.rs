//! 核心错误类型

use thiserror::Error;

/// chimera-core 的错误
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config '{name}': {source}")]
    ConfigParse {
        name: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to bind properties under '{prefix}': {message}")]
    Bind { prefix: String, message: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
