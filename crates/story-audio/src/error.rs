//! Error types for the playback coordinator.

use story_audio_types::{InvalidPlaybackRate, PlaybackStatus};
use thiserror::Error;

/// Failures reported by a media primitive control call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The primitive is no longer accepting commands.
    #[error("media primitive offline")]
    Offline,

    /// The primitive accepted the command but could not carry it out.
    #[error("media primitive failed: {0}")]
    Failed(String),
}

/// Reasons the session store refuses a patch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("non-finite value for {field}")]
    NonFinite { field: &'static str },

    #[error("status {status:?} requires a bound story and audio url")]
    Unbound { status: PlaybackStatus },
}

/// Errors returned from coordinator commands.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    /// Rejected input; the store is unchanged.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The media primitive failed to carry out a control call.
    #[error(transparent)]
    Media(#[from] MediaError),

    /// The store refused the resulting mutation.
    #[error("session mutation rejected: {0}")]
    Rejected(#[from] MutationError),
}

impl From<InvalidPlaybackRate> for CoordinatorError {
    fn from(err: InvalidPlaybackRate) -> Self {
        CoordinatorError::InvalidParameter(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
