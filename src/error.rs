use std::io;
use thiserror::Error;

/// Unified error type for the rewrite proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rule file could not be read or parsed
    #[error("Rule file error: {0}")]
    RuleFile(String),

    /// Event framing or decode error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A single event exceeded the configured size limit
    #[error("Event too large: {size} bytes (limit {limit})")]
    EventTooLarge { size: usize, limit: usize },

    /// Upstream connection could not be established
    #[error("Upstream connect error: {0}")]
    UpstreamConnect(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<anyhow::Error> for ProxyError {
    fn from(err: anyhow::Error) -> Self {
        ProxyError::Other(err.to_string())
    }
}

impl From<serde_yaml::Error> for ProxyError {
    fn from(err: serde_yaml::Error) -> Self {
        ProxyError::RuleFile(format!("YAML parse error: {}", err))
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Protocol(format!("JSON error: {}", err))
    }
}
