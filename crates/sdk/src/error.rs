use thiserror::Error;

/// Error types for the tunnel signaling SDK
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Missing required configuration value: {0}")]
    Config(&'static str),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Broker call failed: {code} - {message}")]
    Broker { code: i64, message: String },

    #[error("Auth call failed: {code} - {message}")]
    Auth { code: i64, message: String },

    #[error("Signature verification failed")]
    Signature,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;
