//! Contract with the external media primitive.
//!
//! The coordinator drives the primitive through [`MediaPrimitive`]; the
//! primitive answers asynchronously with [`MediaEvent`]s tagged by the
//! [`SessionToken`] of the load they belong to.

use std::fmt;

use crossbeam_channel::{Receiver, Sender};

use crate::error::MediaError;

/// Monotonic tag identifying one load attempt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionToken(u64);

impl SessionToken {
    pub(crate) fn next(self) -> Self {
        SessionToken(self.0.saturating_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionToken {
    fn from(value: u64) -> Self {
        SessionToken(value)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Control surface of the thing that actually fetches and decodes audio.
///
/// `load` only starts the load; readiness or failure is reported later as a
/// [`MediaEvent`] carrying the same token. Calls are made while the playback
/// slot is held, so implementations must not call back into the coordinator.
pub trait MediaPrimitive: Send + Sync {
    fn load(&self, url: &str, token: SessionToken) -> Result<(), MediaError>;
    fn play(&self) -> Result<(), MediaError>;
    fn pause(&self) -> Result<(), MediaError>;
    fn seek_to(&self, seconds: f64) -> Result<(), MediaError>;
    fn set_volume(&self, volume: f32) -> Result<(), MediaError>;
    fn set_playback_rate(&self, rate: f32) -> Result<(), MediaError>;
    /// Halt playback and release the loaded resource.
    fn unload(&self) -> Result<(), MediaError>;
}

/// Commands forwarded by [`ChannelPrimitive`].
#[derive(Debug, Clone, PartialEq)]
pub enum MediaCommand {
    Load { url: String, token: SessionToken },
    Play,
    Pause,
    SeekTo { seconds: f64 },
    SetVolume { volume: f32 },
    SetPlaybackRate { rate: f32 },
    Unload,
}

/// Primitive that forwards every call to a worker over a channel.
#[derive(Clone)]
pub struct ChannelPrimitive {
    cmd_tx: Sender<MediaCommand>,
}

impl ChannelPrimitive {
    pub fn new(cmd_tx: Sender<MediaCommand>) -> Self {
        Self { cmd_tx }
    }

    fn send(&self, cmd: MediaCommand) -> Result<(), MediaError> {
        self.cmd_tx.send(cmd).map_err(|_| MediaError::Offline)
    }
}

impl MediaPrimitive for ChannelPrimitive {
    fn load(&self, url: &str, token: SessionToken) -> Result<(), MediaError> {
        self.send(MediaCommand::Load {
            url: url.to_string(),
            token,
        })
    }

    fn play(&self) -> Result<(), MediaError> {
        self.send(MediaCommand::Play)
    }

    fn pause(&self) -> Result<(), MediaError> {
        self.send(MediaCommand::Pause)
    }

    fn seek_to(&self, seconds: f64) -> Result<(), MediaError> {
        self.send(MediaCommand::SeekTo { seconds })
    }

    fn set_volume(&self, volume: f32) -> Result<(), MediaError> {
        self.send(MediaCommand::SetVolume { volume })
    }

    fn set_playback_rate(&self, rate: f32) -> Result<(), MediaError> {
        self.send(MediaCommand::SetPlaybackRate { rate })
    }

    fn unload(&self) -> Result<(), MediaError> {
        self.send(MediaCommand::Unload)
    }
}

/// Asynchronous notification from the media primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    /// Load attempt this event belongs to.
    pub token: SessionToken,
    pub kind: MediaEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEventKind {
    /// The resource is loaded and can start playing.
    Ready,
    /// The resource could not be fetched or decoded.
    LoadFailed { message: String },
    TimeUpdate { seconds: f64 },
    DurationKnown { seconds: f64 },
    /// Natural end of the resource.
    Ended,
    /// Playback failed after the load succeeded.
    Error { message: String },
}

/// Sending half handed to a media primitive implementation.
#[derive(Clone)]
pub struct MediaEventSender {
    tx: Sender<MediaEvent>,
}

impl MediaEventSender {
    /// Send an event; returns `false` once the adapter side is gone.
    pub fn send(&self, token: SessionToken, kind: MediaEventKind) -> bool {
        self.tx.send(MediaEvent { token, kind }).is_ok()
    }

    pub fn ready(&self, token: SessionToken) -> bool {
        self.send(token, MediaEventKind::Ready)
    }

    pub fn load_failed(&self, token: SessionToken, message: impl Into<String>) -> bool {
        self.send(
            token,
            MediaEventKind::LoadFailed {
                message: message.into(),
            },
        )
    }

    pub fn time_update(&self, token: SessionToken, seconds: f64) -> bool {
        self.send(token, MediaEventKind::TimeUpdate { seconds })
    }

    pub fn duration_known(&self, token: SessionToken, seconds: f64) -> bool {
        self.send(token, MediaEventKind::DurationKnown { seconds })
    }

    pub fn ended(&self, token: SessionToken) -> bool {
        self.send(token, MediaEventKind::Ended)
    }

    pub fn error(&self, token: SessionToken, message: impl Into<String>) -> bool {
        self.send(
            token,
            MediaEventKind::Error {
                message: message.into(),
            },
        )
    }
}

/// Create the event channel between a media primitive and the adapter.
pub fn media_event_channel() -> (MediaEventSender, Receiver<MediaEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (MediaEventSender { tx }, rx)
}
