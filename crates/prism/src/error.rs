use prism_core::prelude::VideoMode;

/// Errors returned by [`Source`](crate::source::Source) configuration calls.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source kind has no such control.
    #[error("{0} is not supported by this source")]
    Unsupported(&'static str),
    /// The requested mode cannot be produced.
    #[error("invalid video mode {}x{} {} @ {} fps", .0.width, .0.height, .0.pixel_format, .0.fps)]
    InvalidMode(VideoMode),
    /// Settings document is not a JSON object.
    #[error("invalid settings json: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Errors returned by sinks when no image could be delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("no source connected")]
    NoSource,
    #[error("source is disconnected")]
    Disconnected,
    #[error("sink is stopped")]
    Disabled,
    /// The source published an error frame (including timeouts).
    #[error("{0}")]
    Frame(String),
    /// The frame carried no image or could not be converted.
    #[error("frame could not be converted")]
    Conversion,
    #[error("stream write failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err.to_string())
    }
}
