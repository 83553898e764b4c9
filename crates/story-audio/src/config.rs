//! Coordinator configuration.
//!
//! Loaded from TOML; every key is optional and falls back to [`Default`].

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use story_audio_types::{PlaybackRate, PlaybackSession};

/// Transport defaults applied when the playback store is created.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Output gain for the first session, clamped to `[0, 1]`.
    pub initial_volume: f32,
    /// Speed multiplier for the first session; must be a preset.
    pub initial_rate: PlaybackRate,
    /// Start with output muted.
    pub start_muted: bool,
    /// Snapshots buffered per `watch()` receiver before old ones are dropped.
    pub watch_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            initial_volume: 1.0,
            initial_rate: PlaybackRate::Normal,
            start_muted: false,
            watch_capacity: 64,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let cfg = toml::from_str::<CoordinatorConfig>(raw)?;
        Ok(cfg)
    }

    /// Session the store starts from.
    pub fn initial_session(&self) -> PlaybackSession {
        let volume = if self.initial_volume.is_finite() {
            self.initial_volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        PlaybackSession {
            volume,
            is_muted: self.start_muted,
            playback_rate: self.initial_rate,
            ..PlaybackSession::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = CoordinatorConfig::parse("").unwrap();
        assert_eq!(cfg, CoordinatorConfig::default());
    }

    #[test]
    fn parses_all_keys() {
        let cfg = CoordinatorConfig::parse(
            "initial_volume = 0.6\ninitial_rate = 1.25\nstart_muted = true\nwatch_capacity = 8\n",
        )
        .unwrap();
        assert_eq!(cfg.initial_volume, 0.6);
        assert_eq!(cfg.initial_rate, PlaybackRate::OneAndQuarter);
        assert!(cfg.start_muted);
        assert_eq!(cfg.watch_capacity, 8);
    }

    #[test]
    fn integer_rate_is_accepted() {
        let cfg = CoordinatorConfig::parse("initial_rate = 2").unwrap();
        assert_eq!(cfg.initial_rate, PlaybackRate::Double);
    }

    #[test]
    fn non_preset_rate_is_rejected() {
        assert!(CoordinatorConfig::parse("initial_rate = 1.1").is_err());
    }

    #[test]
    fn initial_session_clamps_volume() {
        let cfg = CoordinatorConfig {
            initial_volume: 3.0,
            start_muted: true,
            ..CoordinatorConfig::default()
        };
        let session = cfg.initial_session();
        assert_eq!(session.volume, 1.0);
        assert!(session.is_muted);
        assert_eq!(session.effective_volume(), 0.0);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = CoordinatorConfig::load(Path::new("/nonexistent/story-audio.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("read config"));
    }
}
