//! Media sink abstraction.
//!
//! The sink is the one physical audio output.  The playback controller is
//! its exclusive owner: nothing else assigns sources, starts playback, or
//! touches volume.  Sink implementations push [`SinkEvent`]s on the channel
//! handed to them at construction; the controller folds those into its state
//! machine.

pub mod mpv;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink refused to start playback (the play() rejection case).
    #[error("playback rejected: {0}")]
    PlayRejected(String),
    /// The sink's control channel is gone or the process died.
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    /// A control command failed.
    #[error("sink command failed: {0}")]
    Command(String),
}

/// Events a sink reports upward.  These are the only signals the controller
/// reacts to after an attach has settled.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// Audio is flowing.
    Playing,
    /// Attached but starved for data.
    Waiting,
    /// Playback paused (explicitly or by the sink).
    Paused,
    /// Unrecoverable failure of the current source.
    Error(String),
}

/// The platform audio primitive, narrowed to exactly what the controller
/// needs.  All operations are asynchronous and may fail after the caller has
/// moved on; late failures surface as [`SinkEvent::Error`].
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Point the sink at a new source URL and begin loading it.
    async fn set_source(&self, url: &str) -> Result<(), SinkError>;

    /// Start (or resume) playback of the current source.
    async fn play(&self) -> Result<(), SinkError>;

    /// Pause playback, keeping the source attached.
    async fn pause(&self) -> Result<(), SinkError>;

    /// Halt network loading for the current source without detaching the
    /// sink itself.  Used on stop so resume avoids a full reattach.
    async fn stop_load(&self) -> Result<(), SinkError>;

    /// Apply gain in 0.0..=1.0.  Must be re-applied after every
    /// `set_source`, since attachment resets the sink to its default.
    async fn set_volume(&self, volume: f32) -> Result<(), SinkError>;
}
