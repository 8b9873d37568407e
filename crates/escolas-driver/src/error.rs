//! Driver error types.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("session i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("no chromium binary found (set ESCOLAS_CHROMIUM to override)")]
    BinaryNotFound,

    #[error("browser did not expose a DevTools endpoint within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("DevTools websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("DevTools endpoint discovery failed: {0}")]
    Endpoint(#[from] reqwest::Error),

    #[error("protocol error on {method}: {message}")]
    Protocol { method: String, message: String },

    #[error("command {method} timed out after {timeout:?}")]
    CommandTimeout { method: String, timeout: Duration },

    #[error("page evaluation failed: {0}")]
    Evaluate(String),

    #[error("navigation did not complete within {0:?}")]
    NavigationTimeout(Duration),

    #[error("no download event arrived within {0:?}")]
    DownloadTimeout(Duration),

    #[error("session is closed")]
    Closed,
}

pub type DriverResult<T> = Result<T, DriverError>;
