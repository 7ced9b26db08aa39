use crate::SingerId;

/// Result alias that carries the custom [`SyncError`] type.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The song's tempo cannot be turned into a beat duration.
    #[error("cannot sync lyrics: invalid bpm {0}")]
    InvalidBpm(f64),
    /// The playback element does not expose a position to sample.
    #[error("cannot sync lyrics: no playback source")]
    NoPlaybackSource,
    /// Song-level data that the engine refuses to work with.
    #[error("invalid song data: {0}")]
    InvalidSong(String),
    /// A single singer's timeline is malformed. Only that channel is affected.
    #[error("invalid timeline for {singer}: {reason}")]
    InvalidTimeline { singer: SingerId, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Malformed row in an UltraStar text file.
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn parse<T: Into<String>>(line: usize, message: T) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
