use thiserror::Error;

use crate::FrameError;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("server sent ERROR frame: {0}")]
    Server(String),

    #[error("connection closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for PushError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        PushError::Transport(e.to_string())
    }
}
