//! Simulated media primitive.
//!
//! Stands in for the real audio element: it honours the command contract,
//! reports readiness after a delay and emits progress scaled by the rate.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use story_audio::{MediaCommand, MediaEventSender, SessionToken};

const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "wav", "ogg", "m4a", "aac", "flac", "opus"];

#[derive(Clone, Debug)]
pub struct SimConfig {
    pub load_delay: Duration,
    pub track_secs: f64,
    pub tick: Duration,
}

struct Track {
    token: SessionToken,
    url: String,
    ready_at: Instant,
    loaded: bool,
    playing: bool,
    position: f64,
}

struct Worker {
    cfg: SimConfig,
    events: MediaEventSender,
    track: Option<Track>,
    rate: f64,
    last_tick: Instant,
}

/// Spawn the simulated primitive; it exits once the command channel closes.
pub fn spawn_simulated_primitive(
    cmd_rx: Receiver<MediaCommand>,
    events: MediaEventSender,
    cfg: SimConfig,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut worker = Worker {
            cfg,
            events,
            track: None,
            rate: 1.0,
            last_tick: Instant::now(),
        };
        loop {
            match cmd_rx.recv_timeout(worker.cfg.tick) {
                Ok(cmd) => worker.apply(cmd),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            worker.advance(Instant::now());
        }
        tracing::debug!("simulated primitive stopped");
    })
}

impl Worker {
    fn apply(&mut self, cmd: MediaCommand) {
        tracing::debug!(?cmd, "sim command");
        match cmd {
            MediaCommand::Load { url, token } => {
                self.track = Some(Track {
                    token,
                    url,
                    ready_at: Instant::now() + self.cfg.load_delay,
                    loaded: false,
                    playing: false,
                    position: 0.0,
                });
            }
            MediaCommand::Play => {
                if let Some(track) = self.track.as_mut().filter(|t| t.loaded) {
                    track.playing = true;
                }
            }
            MediaCommand::Pause => {
                if let Some(track) = self.track.as_mut() {
                    track.playing = false;
                }
            }
            MediaCommand::SeekTo { seconds } => {
                let length = self.cfg.track_secs;
                if let Some(track) = self.track.as_mut().filter(|t| t.loaded) {
                    track.position = seconds.clamp(0.0, length);
                    self.events.time_update(track.token, track.position);
                }
            }
            MediaCommand::SetVolume { volume } => {
                tracing::debug!(volume, "sim output gain");
            }
            MediaCommand::SetPlaybackRate { rate } => {
                self.rate = f64::from(rate);
            }
            MediaCommand::Unload => {
                self.track = None;
            }
        }
    }

    fn advance(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;
        let Some(track) = self.track.as_mut() else {
            return;
        };

        if !track.loaded {
            if now < track.ready_at {
                return;
            }
            if !is_playable(&track.url) {
                self.events
                    .load_failed(track.token, format!("unsupported or unreachable audio: {}", track.url));
                self.track = None;
                return;
            }
            track.loaded = true;
            self.events.duration_known(track.token, self.cfg.track_secs);
            self.events.ready(track.token);
            return;
        }

        if !track.playing {
            return;
        }
        track.position = (track.position + elapsed * self.rate).min(self.cfg.track_secs);
        self.events.time_update(track.token, track.position);
        if track.position >= self.cfg.track_secs {
            track.playing = false;
            self.events.ended(track.token);
        }
    }
}

/// Urls mentioning `fail`, or without a known audio extension, never load.
fn is_playable(url: &str) -> bool {
    if url.contains("fail") {
        return false;
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit_once('.')
        .map(|(_, ext)| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use story_audio::{MediaEventKind, media_event_channel};

    fn cfg() -> SimConfig {
        SimConfig {
            load_delay: Duration::ZERO,
            track_secs: 10.0,
            tick: Duration::from_millis(10),
        }
    }

    fn worker() -> (Worker, Receiver<story_audio::MediaEvent>) {
        let (events, rx) = media_event_channel();
        let worker = Worker {
            cfg: cfg(),
            events,
            track: None,
            rate: 1.0,
            last_tick: Instant::now(),
        };
        (worker, rx)
    }

    #[test]
    fn playable_urls_need_audio_extension() {
        assert!(is_playable("https://cdn.example/story.mp3"));
        assert!(is_playable("story.MP3?sig=abc"));
        assert!(!is_playable("https://cdn.example/story"));
        assert!(!is_playable("fail.mp3"));
    }

    #[test]
    fn load_reports_duration_then_ready() {
        let (mut worker, rx) = worker();
        let token = SessionToken::from(1);
        worker.apply(MediaCommand::Load {
            url: "a.mp3".to_string(),
            token,
        });
        worker.advance(Instant::now() + Duration::from_millis(1));

        let kinds: Vec<MediaEventKind> = rx.try_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MediaEventKind::DurationKnown { seconds: 10.0 },
                MediaEventKind::Ready
            ]
        );
    }

    #[test]
    fn unplayable_url_reports_load_failure() {
        let (mut worker, rx) = worker();
        worker.apply(MediaCommand::Load {
            url: "broken".to_string(),
            token: SessionToken::from(2),
        });
        worker.advance(Instant::now() + Duration::from_millis(1));

        let event = rx.try_recv().unwrap();
        assert!(matches!(event.kind, MediaEventKind::LoadFailed { .. }));
        assert!(worker.track.is_none());
    }

    #[test]
    fn playing_track_reaches_end() {
        let (mut worker, rx) = worker();
        let token = SessionToken::from(3);
        worker.apply(MediaCommand::Load {
            url: "a.mp3".to_string(),
            token,
        });
        let start = Instant::now() + Duration::from_millis(1);
        worker.advance(start);
        worker.apply(MediaCommand::SetPlaybackRate { rate: 2.0 });
        worker.apply(MediaCommand::Play);
        worker.advance(start + Duration::from_secs(6));

        let kinds: Vec<MediaEventKind> = rx.try_iter().map(|e| e.kind).collect();
        assert_eq!(kinds.last(), Some(&MediaEventKind::Ended));
        assert!(kinds.contains(&MediaEventKind::TimeUpdate { seconds: 10.0 }));
    }
}
