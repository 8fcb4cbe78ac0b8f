use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Transport Errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection closed")]
    ConnectionClosed,

    // Fallback Errors
    #[error("Fallback fetch failed: {0}")]
    FallbackError(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // System Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
