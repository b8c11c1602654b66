//! Protocol error types

use thiserror::Error;

/// Errors that can occur while framing or parsing WMTP messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A buffered segment grew past the frame size limit without closing
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Segment was not valid JSON (or not the expected shape)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Object parsed but carried no command name
    #[error("Message has an empty cmd field")]
    MissingCommand,

    /// I/O error (required by the codec traits)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
