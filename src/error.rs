//! Error types for the wisp orchestration core.

/// Top-level error type for the assistant session.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Language-model transport or streaming error.
    #[error("chat error: {0}")]
    Chat(String),

    /// Speech capture error.
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech playback error.
    #[error("playback error: {0}")]
    Playback(String),

    /// Game session error.
    #[error("game error: {0}")]
    Game(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
