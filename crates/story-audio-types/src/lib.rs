//! Shared data model for story narration playback.
//!
//! These types cross the boundary between the playback coordinator and the
//! surfaces that render it, so they are plain serde structs with no behavior
//! beyond derived values.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle stage of the playback slot.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// Nothing bound to the slot.
    #[default]
    Idle,
    /// A load was requested and the media primitive has not confirmed readiness.
    Loading,
    Playing,
    Paused,
    /// Natural end of the track; the story stays bound.
    Ended,
    /// Load or playback failed; see `last_error`.
    Error,
}

/// Reason the last session left its active stages.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of the audio resource.
    Eof,
    /// The media primitive reported a load or playback failure.
    Error,
    /// Playback was explicitly stopped by a command.
    Stopped,
}

/// Playback speed multiplier, restricted to the preset set.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "f32", into = "f32")]
pub enum PlaybackRate {
    Half,
    ThreeQuarters,
    #[default]
    Normal,
    OneAndQuarter,
    OneAndHalf,
    Double,
}

impl PlaybackRate {
    /// All presets in ascending order, for selection UIs.
    pub const PRESETS: [PlaybackRate; 6] = [
        PlaybackRate::Half,
        PlaybackRate::ThreeQuarters,
        PlaybackRate::Normal,
        PlaybackRate::OneAndQuarter,
        PlaybackRate::OneAndHalf,
        PlaybackRate::Double,
    ];

    /// Speed multiplier applied by the media primitive.
    pub fn multiplier(self) -> f32 {
        match self {
            PlaybackRate::Half => 0.5,
            PlaybackRate::ThreeQuarters => 0.75,
            PlaybackRate::Normal => 1.0,
            PlaybackRate::OneAndQuarter => 1.25,
            PlaybackRate::OneAndHalf => 1.5,
            PlaybackRate::Double => 2.0,
        }
    }
}

impl fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.multiplier())
    }
}

/// A requested rate that is not one of [`PlaybackRate::PRESETS`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InvalidPlaybackRate(pub f32);

impl fmt::Display for InvalidPlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "playback rate {} is not one of 0.5, 0.75, 1, 1.25, 1.5, 2",
            self.0
        )
    }
}

impl std::error::Error for InvalidPlaybackRate {}

impl TryFrom<f32> for PlaybackRate {
    type Error = InvalidPlaybackRate;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        PlaybackRate::PRESETS
            .into_iter()
            .find(|preset| (preset.multiplier() - value).abs() < 1e-6)
            .ok_or(InvalidPlaybackRate(value))
    }
}

impl From<PlaybackRate> for f32 {
    fn from(rate: PlaybackRate) -> Self {
        rate.multiplier()
    }
}

/// The single process-wide record of what is loaded in the playback slot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlaybackSession {
    /// Story currently bound to the playback slot.
    pub active_story_id: Option<String>,
    /// Audio resource currently loaded.
    pub audio_url: Option<String>,
    pub status: PlaybackStatus,
    /// Playback position in seconds.
    pub current_time_sec: f64,
    /// Track length in seconds, `0` while unknown.
    pub duration_sec: f64,
    /// Output gain in `[0, 1]`, independent of `is_muted`.
    pub volume: f32,
    pub is_muted: bool,
    pub playback_rate: PlaybackRate,
    /// Description of the last load or playback failure.
    pub last_error: Option<String>,
    /// Why the last session stopped, if it did.
    pub end_reason: Option<PlaybackEndReason>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            active_story_id: None,
            audio_url: None,
            status: PlaybackStatus::Idle,
            current_time_sec: 0.0,
            duration_sec: 0.0,
            volume: 1.0,
            is_muted: false,
            playback_rate: PlaybackRate::Normal,
            last_error: None,
            end_reason: None,
        }
    }
}

impl PlaybackSession {
    /// Position as a percentage of the duration, in `[0, 100]`.
    ///
    /// Unknown durations report `0`, or `100` once the session has ended.
    pub fn progress_percent(&self) -> f64 {
        if self.duration_sec > 0.0 {
            (self.current_time_sec / self.duration_sec * 100.0).clamp(0.0, 100.0)
        } else if self.status == PlaybackStatus::Ended {
            100.0
        } else {
            0.0
        }
    }

    /// Gain the media primitive should actually output.
    pub fn effective_volume(&self) -> f32 {
        if self.is_muted { 0.0 } else { self.volume }
    }

    pub fn is_bound(&self) -> bool {
        self.active_story_id.is_some() || self.audio_url.is_some()
    }

    /// Build the read surface handed to presentation code.
    pub fn view(&self) -> PlaybackView {
        PlaybackView {
            status: self.status,
            is_playing: self.status == PlaybackStatus::Playing,
            is_paused: self.status == PlaybackStatus::Paused,
            progress_percent: self.progress_percent(),
            current_time_sec: self.current_time_sec,
            duration_sec: self.duration_sec,
            volume: self.volume,
            is_muted: self.is_muted,
            playback_rate: self.playback_rate,
            active_story_id: self.active_story_id.clone(),
        }
    }
}

/// Read surface shared by every story-bearing surface.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlaybackView {
    pub status: PlaybackStatus,
    pub is_playing: bool,
    pub is_paused: bool,
    /// Position in percent of the known duration.
    pub progress_percent: f64,
    pub current_time_sec: f64,
    pub duration_sec: f64,
    pub volume: f32,
    pub is_muted: bool,
    pub playback_rate: PlaybackRate,
    pub active_story_id: Option<String>,
}

/// Canonical `(story, audio)` pair extracted from a story payload.
///
/// Story payloads from different surfaces spell their fields differently;
/// this accepts the known spellings so the coordinator only sees one shape.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct StoryAudio {
    #[serde(alias = "storyId", alias = "id", deserialize_with = "story_id")]
    pub story_id: String,
    #[serde(
        alias = "audioUrl",
        alias = "audio_file",
        alias = "audioFile",
        alias = "url"
    )]
    pub audio_url: String,
}

fn story_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_zero_when_duration_unknown() {
        let session = PlaybackSession {
            current_time_sec: 12.0,
            ..PlaybackSession::default()
        };
        assert_eq!(session.progress_percent(), 0.0);
    }

    #[test]
    fn progress_is_clamped_to_hundred() {
        let session = PlaybackSession {
            status: PlaybackStatus::Playing,
            current_time_sec: 130.0,
            duration_sec: 120.0,
            ..PlaybackSession::default()
        };
        assert_eq!(session.progress_percent(), 100.0);
    }

    #[test]
    fn ended_session_reports_full_progress() {
        let session = PlaybackSession {
            status: PlaybackStatus::Ended,
            ..PlaybackSession::default()
        };
        assert_eq!(session.progress_percent(), 100.0);

        let rewound = PlaybackSession {
            status: PlaybackStatus::Ended,
            current_time_sec: 30.0,
            duration_sec: 120.0,
            ..PlaybackSession::default()
        };
        assert_eq!(rewound.progress_percent(), 25.0);
    }

    #[test]
    fn effective_volume_respects_mute_without_touching_volume() {
        let mut session = PlaybackSession {
            volume: 0.8,
            ..PlaybackSession::default()
        };
        session.is_muted = true;
        assert_eq!(session.effective_volume(), 0.0);
        assert_eq!(session.volume, 0.8);
    }

    #[test]
    fn rate_accepts_presets_only() {
        assert_eq!(PlaybackRate::try_from(1.25_f32), Ok(PlaybackRate::OneAndQuarter));
        assert_eq!(PlaybackRate::try_from(2.0_f32), Ok(PlaybackRate::Double));
        assert_eq!(PlaybackRate::try_from(1.1_f32), Err(InvalidPlaybackRate(1.1)));
        assert!(PlaybackRate::try_from(f32::NAN).is_err());
    }

    #[test]
    fn rate_serializes_as_multiplier() {
        let json = serde_json::to_string(&PlaybackRate::ThreeQuarters).unwrap();
        assert_eq!(json, "0.75");
        assert!(serde_json::from_str::<PlaybackRate>("1.3").is_err());
    }

    #[test]
    fn view_reflects_status_flags() {
        let session = PlaybackSession {
            active_story_id: Some("s1".to_string()),
            audio_url: Some("a.mp3".to_string()),
            status: PlaybackStatus::Paused,
            current_time_sec: 30.0,
            duration_sec: 120.0,
            ..PlaybackSession::default()
        };
        let view = session.view();
        assert!(view.is_paused);
        assert!(!view.is_playing);
        assert_eq!(view.progress_percent, 25.0);
        assert_eq!(view.active_story_id.as_deref(), Some("s1"));
    }

    #[test]
    fn story_audio_accepts_alternate_field_names() {
        let a: StoryAudio =
            serde_json::from_str(r#"{"storyId":"s1","audioUrl":"a.mp3","title":"x"}"#).unwrap();
        let b: StoryAudio = serde_json::from_str(r#"{"id":42,"audio_file":"b.mp3"}"#).unwrap();
        let c: StoryAudio =
            serde_json::from_str(r#"{"story_id":"s3","url":"c.mp3"}"#).unwrap();

        assert_eq!(a.story_id, "s1");
        assert_eq!(a.audio_url, "a.mp3");
        assert_eq!(b.story_id, "42");
        assert_eq!(b.audio_url, "b.mp3");
        assert_eq!(c.story_id, "s3");
    }

    #[test]
    fn story_audio_requires_audio_field() {
        assert!(serde_json::from_str::<StoryAudio>(r#"{"id":"s1"}"#).is_err());
    }
}
