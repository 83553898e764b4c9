//! Narration playback coordinator for story-bearing surfaces.
//!
//! One [`PlaybackCoordinator`] is built at startup and handed to every
//! surface that can play a story (story card, favorites, search results,
//! shared-story viewer). It owns the single [`SessionStore`], drives the
//! external media primitive and guarantees that at most one story is bound
//! to the playback slot at a time.
//!
//! ## Flow
//! 1. **Commands**: surfaces call `play`/`pause`/`stop`/`seek`/... on the coordinator.
//! 2. **Primitive**: the coordinator forwards control calls through [`MediaPrimitive`].
//! 3. **Events**: the primitive answers with token-tagged [`MediaEvent`]s that the
//!    [`MediaEventAdapter`] turns into store mutations, dropping superseded ones.
//! 4. **Snapshots**: every committed mutation is pushed to subscribers.

pub mod adapter;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod media;
pub mod store;

pub use adapter::{EventOutcome, MediaEventAdapter};
pub use config::CoordinatorConfig;
pub use coordinator::{PlayOutcome, PlaybackCoordinator};
pub use error::{CoordinatorError, MediaError, MutationError};
pub use media::{
    ChannelPrimitive, MediaCommand, MediaEvent, MediaEventKind, MediaEventSender, MediaPrimitive,
    SessionToken, media_event_channel,
};
pub use store::{SessionStore, Subscription};
pub use story_audio_types::{
    PlaybackEndReason, PlaybackRate, PlaybackSession, PlaybackStatus, PlaybackView, StoryAudio,
};
