use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "http")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "realtime")]
    #[error("realtime socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The trigger endpoint refused the request; `message` is shown to the user as-is.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("change feed for {0} is closed")]
    FeedClosed(String),

    #[error("{0}")]
    Other(String),
}
