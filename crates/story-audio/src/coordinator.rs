//! Playback coordination for the single narration slot.
//!
//! Every story-bearing surface sends its intents here; the coordinator turns
//! them into validated store mutations and media primitive calls.

use std::sync::Arc;

use story_audio_types::{PlaybackRate, PlaybackSession, PlaybackStatus, PlaybackView};
use tokio::sync::broadcast;

use crate::adapter::MediaEventAdapter;
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, MediaError, MutationError, Result};
use crate::media::{MediaPrimitive, SessionToken};
use crate::store::{Committed, Control, SessionPatch, SessionStore, Subscription};

/// What `play` did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The paused session for the same story continued in place.
    Resumed,
    /// A new load was started; readiness arrives as a media event.
    Loading(SessionToken),
}

/// Command surface shared by every consumer of the playback slot.
#[derive(Clone)]
pub struct PlaybackCoordinator {
    store: SessionStore,
    primitive: Arc<dyn MediaPrimitive>,
}

impl PlaybackCoordinator {
    /// Create the coordinator and its store from configuration.
    pub fn new(primitive: Arc<dyn MediaPrimitive>, config: &CoordinatorConfig) -> Self {
        let store = SessionStore::new(config.initial_session(), config.watch_capacity);
        Self::with_store(store, primitive)
    }

    pub fn with_store(store: SessionStore, primitive: Arc<dyn MediaPrimitive>) -> Self {
        Self { store, primitive }
    }

    /// Access the shared session store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Adapter that feeds media primitive events into this coordinator's store.
    pub fn event_adapter(&self) -> MediaEventAdapter {
        MediaEventAdapter::new(self.store.clone(), self.primitive.clone())
    }

    pub fn snapshot(&self) -> PlaybackSession {
        self.store.snapshot()
    }

    pub fn view(&self) -> PlaybackView {
        self.store.snapshot().view()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PlaybackSession) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn watch(&self) -> broadcast::Receiver<PlaybackSession> {
        self.store.watch()
    }

    /// Playback rates offered by selection UIs.
    pub fn presets(&self) -> &'static [PlaybackRate] {
        &PlaybackRate::PRESETS
    }

    /// Whether `story_id` currently owns the playback slot.
    pub fn is_active(&self, story_id: &str) -> bool {
        self.store.snapshot().active_story_id.as_deref() == Some(story_id)
    }

    /// Play `audio_url` for `story_id`.
    ///
    /// A paused session for the same story resumes in place. Anything else
    /// evicts the current session and starts a new load.
    pub fn play(&self, audio_url: &str, story_id: &str) -> Result<PlayOutcome> {
        let audio_url = audio_url.trim();
        let story_id = story_id.trim();
        if audio_url.is_empty() {
            return Err(CoordinatorError::InvalidParameter(
                "audio url is empty".to_string(),
            ));
        }
        if story_id.is_empty() {
            return Err(CoordinatorError::InvalidParameter(
                "story id is empty".to_string(),
            ));
        }

        let control = self.store.control();
        let resumed = control.update(|s, _| {
            let same_story = s.active_story_id.as_deref() == Some(story_id);
            (same_story && s.status == PlaybackStatus::Paused)
                .then(|| SessionPatch::default().status(PlaybackStatus::Playing))
        })?;
        if let Some(committed) = resumed {
            tracing::info!(story_id, position_sec = committed.session.current_time_sec, "resuming story audio");
            self.start_or_fail(&control, committed.token, self.primitive.play())?;
            return Ok(PlayOutcome::Resumed);
        }

        let previous = control.snapshot();
        if previous.is_bound() {
            if let Err(err) = self.primitive.unload() {
                tracing::warn!(error = %err, "failed to unload previous audio");
            }
        }
        let committed = control.mutate(SessionPatch::load(story_id, audio_url))?;
        let token = committed.token;
        tracing::info!(
            story_id,
            audio_url,
            token = %token,
            evicted = ?previous.active_story_id,
            "loading story audio"
        );
        self.start_or_fail(&control, token, self.primitive.load(audio_url, token))?;
        Ok(PlayOutcome::Loading(token))
    }

    /// Pause when `story_id` is playing, otherwise `play` it.
    ///
    /// Returns the status after the command.
    pub fn toggle(&self, audio_url: &str, story_id: &str) -> Result<PlaybackStatus> {
        let current = self.store.snapshot();
        let playing_this = current.status == PlaybackStatus::Playing
            && current.active_story_id.as_deref() == Some(story_id.trim());
        if playing_this {
            self.pause()?;
        } else {
            self.play(audio_url, story_id)?;
        }
        Ok(self.store.snapshot().status)
    }

    /// Pause the playing session; a no-op in any other state.
    pub fn pause(&self) -> Result<()> {
        let control = self.store.control();
        let committed = control.update(|s, _| {
            (s.status == PlaybackStatus::Playing)
                .then(|| SessionPatch::default().status(PlaybackStatus::Paused))
        })?;
        if committed.is_none() {
            tracing::debug!("pause ignored; nothing playing");
            return Ok(());
        }
        self.forward(self.primitive.pause(), "pause")
    }

    /// Halt playback, release the resource and return to idle.
    ///
    /// Also supersedes an in-flight load.
    pub fn stop(&self) -> Result<()> {
        let control = self.store.control();
        let committed = control.update(|s, _| {
            let idle = s.status == PlaybackStatus::Idle && !s.is_bound();
            (!idle).then(|| SessionPatch::stopped(s.is_bound()))
        })?;
        let Some(Committed { previous, .. }) = committed else {
            return Ok(());
        };
        tracing::info!(story_id = ?previous.active_story_id, status = ?previous.status, "stopping playback");
        if previous.is_bound() {
            self.forward(self.primitive.unload(), "unload")?;
        }
        Ok(())
    }

    /// Seek to `percent` of the known duration.
    ///
    /// Returns the new position in seconds, or `None` when there is no
    /// active session or the duration is still unknown. An ended session
    /// stays ended; only its position moves.
    pub fn seek(&self, percent: f64) -> Result<Option<f64>> {
        if percent.is_nan() {
            return Err(CoordinatorError::InvalidParameter(
                "seek percent is not a number".to_string(),
            ));
        }
        let percent = percent.clamp(0.0, 100.0);
        let control = self.store.control();
        let committed = control.update(|s, _| {
            (s.active_story_id.is_some() && s.duration_sec > 0.0)
                .then(|| SessionPatch::default().current_time(percent / 100.0 * s.duration_sec))
        })?;
        let Some(committed) = committed else {
            tracing::debug!(percent, "seek ignored; no active session or unknown duration");
            return Ok(None);
        };
        let position = committed.session.current_time_sec;
        self.forward(self.primitive.seek_to(position), "seek")?;
        Ok(Some(position))
    }

    /// Set the output gain, clamped to `[0, 1]`. Mute is left alone.
    pub fn set_volume(&self, volume: f32) -> Result<f32> {
        if volume.is_nan() {
            return Err(CoordinatorError::InvalidParameter(
                "volume is not a number".to_string(),
            ));
        }
        let control = self.store.control();
        let session = control.mutate(SessionPatch::default().volume(volume))?.session;
        self.forward(self.primitive.set_volume(session.effective_volume()), "set_volume")?;
        Ok(session.volume)
    }

    /// Flip mute; returns the new flag. The stored volume never changes.
    pub fn toggle_mute(&self) -> Result<bool> {
        let control = self.store.control();
        let muted = !control.snapshot().is_muted;
        let session = control.mutate(SessionPatch::default().muted(muted))?.session;
        self.forward(self.primitive.set_volume(session.effective_volume()), "set_volume")?;
        Ok(session.is_muted)
    }

    /// Change the speed multiplier; only presets are accepted.
    pub fn set_playback_rate(&self, rate: f32) -> Result<PlaybackRate> {
        let rate = PlaybackRate::try_from(rate).map_err(|err| {
            tracing::warn!(error = %err, "rejected playback rate");
            CoordinatorError::from(err)
        })?;
        let control = self.store.control();
        control.mutate(SessionPatch::default().rate(rate))?;
        self.forward(
            self.primitive.set_playback_rate(rate.multiplier()),
            "set_playback_rate",
        )?;
        Ok(rate)
    }

    /// A failed start leaves the slot in `Error` rather than half bound.
    fn start_or_fail(
        &self,
        control: &Control<'_>,
        token: SessionToken,
        result: std::result::Result<(), MediaError>,
    ) -> Result<()> {
        if let Err(err) = result {
            fail_session(control, self.primitive.as_ref(), token, &err.to_string())?;
            return Err(CoordinatorError::Media(err));
        }
        Ok(())
    }

    fn forward(&self, result: std::result::Result<(), MediaError>, op: &'static str) -> Result<()> {
        result.map_err(|err| {
            tracing::warn!(error = %err, op, "media primitive command failed");
            CoordinatorError::Media(err)
        })
    }
}

/// Move the session for `token` to `Error` and release the resource.
///
/// Returns `Ok(false)` when the token is stale or nothing is active.
pub(crate) fn fail_session(
    control: &Control<'_>,
    primitive: &dyn MediaPrimitive,
    token: SessionToken,
    message: &str,
) -> std::result::Result<bool, MutationError> {
    let committed = control.update(|s, current| {
        let active = matches!(
            s.status,
            PlaybackStatus::Loading
                | PlaybackStatus::Playing
                | PlaybackStatus::Paused
                | PlaybackStatus::Ended
        );
        (current == token && active).then(|| SessionPatch::failed(message))
    })?;
    let Some(committed) = committed else {
        return Ok(false);
    };
    tracing::warn!(
        story_id = ?committed.previous.active_story_id,
        audio_url = ?committed.previous.audio_url,
        error = message,
        "story audio failed"
    );
    if let Err(err) = primitive.unload() {
        tracing::warn!(error = %err, "failed to unload after playback error");
    }
    Ok(true)
}
