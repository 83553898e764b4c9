//! Media primitive event adapter.
//!
//! The only consumer of the primitive's asynchronous notifications. Each
//! accepted event becomes exactly one store mutation; events tagged with a
//! superseded session token are dropped.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use story_audio_types::{PlaybackEndReason, PlaybackStatus};

use crate::coordinator::fail_session;
use crate::error::MutationError;
use crate::media::{MediaEvent, MediaEventKind, MediaPrimitive, SessionToken};
use crate::store::{Committed, SessionPatch, SessionStore};

/// What happened to a handled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event changed the session.
    Applied,
    /// The event belongs to a superseded load.
    Stale,
    /// The event does not apply to the current status.
    Ignored,
    /// The store refused the resulting mutation.
    Rejected,
}

#[derive(Clone)]
pub struct MediaEventAdapter {
    store: SessionStore,
    primitive: Arc<dyn MediaPrimitive>,
}

impl MediaEventAdapter {
    pub fn new(store: SessionStore, primitive: Arc<dyn MediaPrimitive>) -> Self {
        Self { store, primitive }
    }

    /// Translate one event into a store mutation.
    pub fn handle(&self, event: MediaEvent) -> EventOutcome {
        let MediaEvent { token, kind } = event;
        let current = self.store.token();
        if token != current {
            tracing::debug!(token = %token, current = %current, event = ?kind, "discarding stale media event");
            return EventOutcome::Stale;
        }

        let result = match kind {
            MediaEventKind::Ready => self.on_ready(token),
            MediaEventKind::LoadFailed { message } | MediaEventKind::Error { message } => {
                let control = self.store.control();
                fail_session(&control, self.primitive.as_ref(), token, &message)
                    .map(|applied| applied.then_some(()))
            }
            MediaEventKind::TimeUpdate { seconds } => self.guarded(token, |status| {
                matches!(status, PlaybackStatus::Playing | PlaybackStatus::Paused)
                    .then(|| SessionPatch::default().current_time(seconds))
            }),
            MediaEventKind::DurationKnown { seconds } => self.guarded(token, |status| {
                matches!(
                    status,
                    PlaybackStatus::Loading | PlaybackStatus::Playing | PlaybackStatus::Paused
                )
                .then(|| SessionPatch::default().duration(seconds))
            }),
            MediaEventKind::Ended => self.on_ended(token),
        };

        match result {
            Ok(Some(())) => EventOutcome::Applied,
            Ok(None) => EventOutcome::Ignored,
            Err(_) => EventOutcome::Rejected,
        }
    }

    /// Handle everything already queued on `rx`; returns how many events were seen.
    pub fn drain(&self, rx: &Receiver<MediaEvent>) -> usize {
        rx.try_iter().map(|event| self.handle(event)).count()
    }

    /// Handle events until every sender is dropped.
    pub fn run(self, rx: Receiver<MediaEvent>) {
        for event in rx.iter() {
            self.handle(event);
        }
        tracing::debug!("media event channel closed");
    }

    fn guarded<F>(&self, token: SessionToken, plan: F) -> Result<Option<()>, MutationError>
    where
        F: FnOnce(PlaybackStatus) -> Option<SessionPatch>,
    {
        self.store
            .update(|s, current| {
                if current != token {
                    return None;
                }
                plan(s.status)
            })
            .map(|committed| committed.map(|_| ()))
    }

    /// The slot stays under control until the start calls are issued, so a
    /// listener reacting to `Playing` acts on a primitive that already plays.
    fn on_ready(&self, token: SessionToken) -> Result<Option<()>, MutationError> {
        let control = self.store.control();
        let committed = control.update(|s, current| {
            (current == token && s.status == PlaybackStatus::Loading)
                .then(|| SessionPatch::default().status(PlaybackStatus::Playing))
        })?;
        let Some(Committed { session, .. }) = committed else {
            return Ok(None);
        };
        tracing::info!(story_id = ?session.active_story_id, token = %token, "story audio ready");
        let started = self
            .primitive
            .set_volume(session.effective_volume())
            .and_then(|_| {
                self.primitive
                    .set_playback_rate(session.playback_rate.multiplier())
            })
            .and_then(|_| self.primitive.play());
        if let Err(err) = started {
            fail_session(&control, self.primitive.as_ref(), token, &err.to_string())?;
        }
        Ok(Some(()))
    }

    /// Park the session at its end; the story stays bound.
    fn on_ended(&self, token: SessionToken) -> Result<Option<()>, MutationError> {
        let committed = self.store.update(|s, current| {
            if current != token || s.status != PlaybackStatus::Playing {
                return None;
            }
            let end = if s.duration_sec > 0.0 {
                s.duration_sec
            } else {
                s.current_time_sec
            };
            Some(
                SessionPatch::default()
                    .status(PlaybackStatus::Ended)
                    .duration(end)
                    .current_time(end)
                    .end_reason(PlaybackEndReason::Eof),
            )
        })?;
        if let Some(Committed { session, .. }) = committed.as_ref() {
            tracing::info!(story_id = ?session.active_story_id, duration_sec = session.duration_sec, "story audio ended");
        }
        Ok(committed.map(|_| ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    use crate::config::CoordinatorConfig;
    use crate::coordinator::{PlayOutcome, PlaybackCoordinator};
    use crate::media::{ChannelPrimitive, MediaCommand, media_event_channel};

    fn loading() -> (
        PlaybackCoordinator,
        MediaEventAdapter,
        SessionToken,
        Receiver<MediaCommand>,
    ) {
        let (cmd_tx, cmd_rx) = unbounded();
        let coordinator = PlaybackCoordinator::new(
            Arc::new(ChannelPrimitive::new(cmd_tx)),
            &CoordinatorConfig::default(),
        );
        let PlayOutcome::Loading(token) = coordinator.play("a.mp3", "s1").unwrap() else {
            panic!("expected load");
        };
        let adapter = coordinator.event_adapter();
        (coordinator, adapter, token, cmd_rx)
    }

    fn ev(token: SessionToken, kind: MediaEventKind) -> MediaEvent {
        MediaEvent { token, kind }
    }

    #[test]
    fn ended_parks_session_at_full_progress() {
        let (coordinator, adapter, token, _cmd_rx) = loading();
        adapter.handle(ev(token, MediaEventKind::Ready));
        adapter.handle(ev(token, MediaEventKind::DurationKnown { seconds: 90.0 }));
        adapter.handle(ev(token, MediaEventKind::TimeUpdate { seconds: 89.6 }));

        assert_eq!(adapter.handle(ev(token, MediaEventKind::Ended)), EventOutcome::Applied);

        let snap = coordinator.snapshot();
        assert_eq!(snap.status, PlaybackStatus::Ended);
        assert_eq!(snap.active_story_id.as_deref(), Some("s1"));
        assert_eq!(snap.current_time_sec, 90.0);
        assert_eq!(snap.progress_percent(), 100.0);
        assert_eq!(snap.end_reason, Some(PlaybackEndReason::Eof));
    }

    #[test]
    fn ended_without_known_duration_adopts_position() {
        let (coordinator, adapter, token, _cmd_rx) = loading();
        adapter.handle(ev(token, MediaEventKind::Ready));
        adapter.handle(ev(token, MediaEventKind::TimeUpdate { seconds: 33.0 }));

        adapter.handle(ev(token, MediaEventKind::Ended));

        let snap = coordinator.snapshot();
        assert_eq!(snap.duration_sec, 33.0);
        assert_eq!(snap.view().progress_percent, 100.0);
    }

    #[test]
    fn load_failure_clears_story_and_unloads() {
        let (coordinator, adapter, token, cmd_rx) = loading();
        cmd_rx.try_iter().for_each(drop);

        let outcome = adapter.handle(ev(
            token,
            MediaEventKind::LoadFailed {
                message: "404 not found".to_string(),
            },
        ));

        assert_eq!(outcome, EventOutcome::Applied);
        let snap = coordinator.snapshot();
        assert_eq!(snap.status, PlaybackStatus::Error);
        assert!(snap.active_story_id.is_none());
        assert!(snap.audio_url.is_none());
        assert_eq!(snap.last_error.as_deref(), Some("404 not found"));
        assert_eq!(cmd_rx.try_recv(), Ok(MediaCommand::Unload));
    }

    #[test]
    fn retry_after_error_loads_again() {
        let (coordinator, adapter, token, _cmd_rx) = loading();
        adapter.handle(ev(
            token,
            MediaEventKind::LoadFailed {
                message: "timeout".to_string(),
            },
        ));

        let outcome = coordinator.play("a.mp3", "s1").unwrap();

        let PlayOutcome::Loading(retry) = outcome else {
            panic!("expected load");
        };
        assert!(retry > token);
        let snap = coordinator.snapshot();
        assert_eq!(snap.status, PlaybackStatus::Loading);
        assert!(snap.last_error.is_none());
    }

    #[test]
    fn stale_events_are_discarded() {
        let (coordinator, adapter, old, _cmd_rx) = loading();
        let PlayOutcome::Loading(new) = coordinator.play("b.mp3", "s2").unwrap() else {
            panic!("expected load");
        };
        adapter.handle(ev(new, MediaEventKind::Ready));

        for kind in [
            MediaEventKind::Ready,
            MediaEventKind::TimeUpdate { seconds: 10.0 },
            MediaEventKind::DurationKnown { seconds: 50.0 },
            MediaEventKind::Ended,
            MediaEventKind::Error {
                message: "decoder".to_string(),
            },
        ] {
            assert_eq!(adapter.handle(ev(old, kind)), EventOutcome::Stale);
        }

        let snap = coordinator.snapshot();
        assert_eq!(snap.status, PlaybackStatus::Playing);
        assert_eq!(snap.active_story_id.as_deref(), Some("s2"));
        assert_eq!(snap.duration_sec, 0.0);
    }

    #[test]
    fn duplicate_ready_is_ignored() {
        let (_coordinator, adapter, token, _cmd_rx) = loading();
        assert_eq!(adapter.handle(ev(token, MediaEventKind::Ready)), EventOutcome::Applied);
        assert_eq!(adapter.handle(ev(token, MediaEventKind::Ready)), EventOutcome::Ignored);
    }

    #[test]
    fn time_updates_while_loading_are_ignored() {
        let (coordinator, adapter, token, _cmd_rx) = loading();
        let outcome = adapter.handle(ev(token, MediaEventKind::TimeUpdate { seconds: 4.0 }));
        assert_eq!(outcome, EventOutcome::Ignored);
        assert_eq!(coordinator.snapshot().current_time_sec, 0.0);
    }

    #[test]
    fn non_finite_duration_is_rejected() {
        let (coordinator, adapter, token, _cmd_rx) = loading();
        let outcome = adapter.handle(ev(
            token,
            MediaEventKind::DurationKnown {
                seconds: f64::INFINITY,
            },
        ));
        assert_eq!(outcome, EventOutcome::Rejected);
        assert_eq!(coordinator.snapshot().duration_sec, 0.0);
    }

    #[test]
    fn playback_error_while_playing_fails_session() {
        let (coordinator, adapter, token, _cmd_rx) = loading();
        adapter.handle(ev(token, MediaEventKind::Ready));

        adapter.handle(ev(
            token,
            MediaEventKind::Error {
                message: "decode error".to_string(),
            },
        ));

        let snap = coordinator.snapshot();
        assert_eq!(snap.status, PlaybackStatus::Error);
        assert_eq!(snap.end_reason, Some(PlaybackEndReason::Error));
    }

    #[test]
    fn drain_handles_queued_events_in_order() {
        let (coordinator, adapter, token, _cmd_rx) = loading();
        let (events, rx) = media_event_channel();
        events.ready(token);
        events.duration_known(token, 120.0);
        events.time_update(token, 60.0);

        assert_eq!(adapter.drain(&rx), 3);
        assert_eq!(coordinator.view().progress_percent, 50.0);
    }

    #[test]
    fn run_returns_when_senders_are_dropped() {
        let (coordinator, adapter, token, _cmd_rx) = loading();
        let (events, rx) = media_event_channel();
        let worker = std::thread::spawn(move || adapter.run(rx));

        events.ready(token);
        drop(events);
        worker.join().unwrap();

        assert!(coordinator.view().is_playing);
    }
}
