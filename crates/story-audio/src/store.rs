//! Playback session store.
//!
//! Holds the single [`PlaybackSession`], applies validated patches and
//! notifies subscribers after every successful mutation. Only the
//! coordinator and the media event adapter write to it.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use story_audio_types::{PlaybackEndReason, PlaybackRate, PlaybackSession, PlaybackStatus};
use tokio::sync::broadcast;

use crate::error::MutationError;
use crate::media::SessionToken;

type Listener = Arc<dyn Fn(&PlaybackSession) + Send + Sync>;

struct StoreState {
    session: PlaybackSession,
    token: SessionToken,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

struct Shared {
    state: Mutex<StoreState>,
    /// Held across a mutation and the primitive calls that follow it.
    control: Mutex<()>,
    listeners: Mutex<Listeners>,
    /// Snapshots waiting for delivery, in mutation order.
    pending: Mutex<VecDeque<PlaybackSession>>,
    draining: AtomicBool,
    watch: broadcast::Sender<PlaybackSession>,
}

/// Shared handle to the process-wide playback session.
#[derive(Clone)]
pub struct SessionStore {
    shared: Arc<Shared>,
}

/// Result of a committed mutation.
#[derive(Debug, Clone)]
pub(crate) struct Committed {
    pub token: SessionToken,
    pub previous: PlaybackSession,
    pub session: PlaybackSession,
}

impl SessionStore {
    /// Create a store seeded with `initial`.
    ///
    /// `watch_capacity` bounds the broadcast channel used by [`Self::watch`].
    pub fn new(initial: PlaybackSession, watch_capacity: usize) -> Self {
        let (watch, _) = broadcast::channel(watch_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(StoreState {
                    session: initial,
                    token: SessionToken::default(),
                }),
                control: Mutex::new(()),
                listeners: Mutex::new(Listeners::default()),
                pending: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                watch,
            }),
        }
    }

    /// Copy of the current session.
    pub fn snapshot(&self) -> PlaybackSession {
        lock(&self.shared.state).session.clone()
    }

    /// Token of the most recent load attempt.
    pub fn token(&self) -> SessionToken {
        lock(&self.shared.state).token
    }

    /// Register a listener called with every committed snapshot.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PlaybackSession) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let mut listeners = lock(&self.shared.listeners);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, listener));
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Receiver for async consumers; lagging receivers drop old snapshots.
    pub fn watch(&self) -> broadcast::Receiver<PlaybackSession> {
        self.shared.watch.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.listeners).entries.len()
    }

    /// Take exclusive control of the playback slot.
    ///
    /// Mutations made through the guard reach subscribers only after the
    /// guard is dropped, so primitive calls issued while holding it always
    /// precede any command a listener sends in response. Primitive calls
    /// from different threads are issued in commit order.
    pub(crate) fn control(&self) -> Control<'_> {
        Control {
            store: self,
            guard: Some(lock(&self.shared.control)),
        }
    }

    /// Atomically inspect the session and apply the patch `plan` returns,
    /// notifying subscribers straight away.
    ///
    /// Returns `Ok(None)` when `plan` declines. A rejected patch leaves the
    /// session untouched and nobody is notified.
    pub(crate) fn update<F>(&self, plan: F) -> Result<Option<Committed>, MutationError>
    where
        F: FnOnce(&PlaybackSession, SessionToken) -> Option<SessionPatch>,
    {
        let committed = self.commit_plan(plan)?;
        self.drain();
        Ok(committed)
    }

    fn commit_plan<F>(&self, plan: F) -> Result<Option<Committed>, MutationError>
    where
        F: FnOnce(&PlaybackSession, SessionToken) -> Option<SessionPatch>,
    {
        let mut state = lock(&self.shared.state);
        let Some(patch) = plan(&state.session, state.token) else {
            return Ok(None);
        };
        self.commit(&mut state, patch).map(Some)
    }

    fn commit(
        &self,
        state: &mut StoreState,
        patch: SessionPatch,
    ) -> Result<Committed, MutationError> {
        let rebind = patch.rebind;
        let mut next = state.session.clone();
        if let Err(err) = patch.apply(&mut next).and_then(|_| validate(&next)) {
            tracing::warn!(error = %err, status = ?state.session.status, "rejected session mutation");
            return Err(err);
        }
        if rebind {
            state.token = state.token.next();
        }
        let previous = std::mem::replace(&mut state.session, next.clone());
        lock(&self.shared.pending).push_back(next.clone());
        Ok(Committed {
            token: state.token,
            previous,
            session: next,
        })
    }

    /// Deliver queued snapshots unless another caller is already doing so.
    ///
    /// A listener that mutates the store re-enters here and returns at once;
    /// the outer loop delivers its snapshot after the current one.
    fn drain(&self) {
        loop {
            if self
                .shared
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            loop {
                let next = lock(&self.shared.pending).pop_front();
                let Some(session) = next else {
                    break;
                };
                self.deliver(&session);
            }
            self.shared.draining.store(false, Ordering::Release);
            if lock(&self.shared.pending).is_empty() {
                return;
            }
        }
    }

    fn deliver(&self, session: &PlaybackSession) {
        let listeners: Vec<Listener> = lock(&self.shared.listeners)
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(session))).is_err() {
                tracing::warn!("playback listener panicked; continuing with remaining listeners");
            }
        }
        let _ = self.shared.watch.send(session.clone());
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(PlaybackSession::default(), 64)
    }
}

/// Exclusive access to the playback slot, see [`SessionStore::control`].
pub(crate) struct Control<'a> {
    store: &'a SessionStore,
    guard: Option<MutexGuard<'a, ()>>,
}

impl Control<'_> {
    /// Apply `patch` unconditionally.
    pub fn mutate(&self, patch: SessionPatch) -> Result<Committed, MutationError> {
        let mut state = lock(&self.store.shared.state);
        self.store.commit(&mut state, patch)
    }

    /// Like [`SessionStore::update`], with delivery deferred to drop.
    pub fn update<F>(&self, plan: F) -> Result<Option<Committed>, MutationError>
    where
        F: FnOnce(&PlaybackSession, SessionToken) -> Option<SessionPatch>,
    {
        self.store.commit_plan(plan)
    }

    pub fn snapshot(&self) -> PlaybackSession {
        self.store.snapshot()
    }
}

impl Drop for Control<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.store.drain();
    }
}

/// Handle returned by [`SessionStore::subscribe`].
///
/// Dropping the handle unsubscribes the listener.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Remove the listener. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        if let Some(shared) = self.shared.upgrade() {
            lock(&shared.listeners)
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Partial update of a [`PlaybackSession`].
///
/// `None` leaves a field as is. Setting `rebind` starts a new session token,
/// which supersedes every event tagged with an older one.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionPatch {
    pub rebind: bool,
    pub active_story_id: Option<Option<String>>,
    pub audio_url: Option<Option<String>>,
    pub status: Option<PlaybackStatus>,
    pub current_time_sec: Option<f64>,
    pub duration_sec: Option<f64>,
    pub volume: Option<f32>,
    pub is_muted: Option<bool>,
    pub playback_rate: Option<PlaybackRate>,
    pub last_error: Option<Option<String>>,
    pub end_reason: Option<Option<PlaybackEndReason>>,
}

impl SessionPatch {
    /// Bind a new story and start loading it from the beginning.
    pub fn load(story_id: &str, audio_url: &str) -> Self {
        Self {
            rebind: true,
            active_story_id: Some(Some(story_id.to_string())),
            audio_url: Some(Some(audio_url.to_string())),
            status: Some(PlaybackStatus::Loading),
            current_time_sec: Some(0.0),
            duration_sec: Some(0.0),
            last_error: Some(None),
            end_reason: Some(None),
            ..Self::default()
        }
    }

    /// Release the slot and return to idle.
    pub fn stopped(was_bound: bool) -> Self {
        Self {
            rebind: true,
            active_story_id: Some(None),
            audio_url: Some(None),
            status: Some(PlaybackStatus::Idle),
            current_time_sec: Some(0.0),
            duration_sec: Some(0.0),
            end_reason: was_bound.then_some(Some(PlaybackEndReason::Stopped)),
            ..Self::default()
        }
    }

    /// Park the slot in `Error` with nothing bound, ready for a retry.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            active_story_id: Some(None),
            audio_url: Some(None),
            status: Some(PlaybackStatus::Error),
            current_time_sec: Some(0.0),
            duration_sec: Some(0.0),
            last_error: Some(Some(message.into())),
            end_reason: Some(Some(PlaybackEndReason::Error)),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: PlaybackStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn current_time(mut self, seconds: f64) -> Self {
        self.current_time_sec = Some(seconds);
        self
    }

    pub fn duration(mut self, seconds: f64) -> Self {
        self.duration_sec = Some(seconds);
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.is_muted = Some(muted);
        self
    }

    pub fn rate(mut self, rate: PlaybackRate) -> Self {
        self.playback_rate = Some(rate);
        self
    }

    pub fn end_reason(mut self, reason: PlaybackEndReason) -> Self {
        self.end_reason = Some(Some(reason));
        self
    }

    /// Write the patch into `session`, clamping ranged values.
    fn apply(self, session: &mut PlaybackSession) -> Result<(), MutationError> {
        if let Some(story) = self.active_story_id {
            session.active_story_id = story;
        }
        if let Some(url) = self.audio_url {
            session.audio_url = url;
        }
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(duration) = self.duration_sec {
            session.duration_sec = finite(duration, "duration_sec")?.max(0.0);
        }
        if let Some(time) = self.current_time_sec {
            session.current_time_sec = finite(time, "current_time_sec")?.max(0.0);
        }
        if let Some(volume) = self.volume {
            if !volume.is_finite() {
                return Err(MutationError::NonFinite { field: "volume" });
            }
            session.volume = volume.clamp(0.0, 1.0);
        }
        if let Some(muted) = self.is_muted {
            session.is_muted = muted;
        }
        if let Some(rate) = self.playback_rate {
            session.playback_rate = rate;
        }
        if let Some(error) = self.last_error {
            session.last_error = error;
        }
        if let Some(reason) = self.end_reason {
            session.end_reason = reason;
        }
        if session.duration_sec > 0.0 {
            session.current_time_sec = session.current_time_sec.min(session.duration_sec);
        }
        Ok(())
    }
}

fn finite(value: f64, field: &'static str) -> Result<f64, MutationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MutationError::NonFinite { field })
    }
}

fn validate(session: &PlaybackSession) -> Result<(), MutationError> {
    let active = matches!(
        session.status,
        PlaybackStatus::Playing | PlaybackStatus::Paused
    );
    if active && (session.active_story_id.is_none() || session.audio_url.is_none()) {
        return Err(MutationError::Unbound {
            status: session.status,
        });
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
